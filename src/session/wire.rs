//! Outbound helpers.
//!
//! These wrap the dialect builders with the bookkeeping every caller would
//! otherwise repeat: mode letters are checked against the negotiated tables,
//! chat text is chunked, and our own joins/parts/kills are mirrored into
//! the registries.

use super::Services;
use crate::protocol::{BanClass, Introduction};
use crate::state::{Departure, User};
use slsvc_proto::{MESSAGE_CHUNK_SIZE, chunk_text};
use tracing::{info, warn};

impl Services {
    /// PRIVMSG from the service, split to fit the line limit.
    pub fn privmsg(&self, target: &str, text: &str) {
        let me = self.identity();
        for chunk in chunk_text(text, MESSAGE_CHUNK_SIZE) {
            self.send(self.protocol.privmsg(&me.service_uid, target, &chunk));
        }
    }

    /// NOTICE from the service, split to fit the line limit.
    pub fn notice(&self, target: &str, text: &str) {
        let me = self.identity();
        for chunk in chunk_text(text, MESSAGE_CHUNK_SIZE) {
            self.send(self.protocol.notice(&me.service_uid, target, &chunk));
        }
    }

    /// Post an operational event to the log channel.
    pub fn announce(&self, text: &str) {
        info!(target: "slsvcd::announce", "{text}");
        let channel = self.identity().log_channel;
        self.privmsg(&channel, text);
    }

    /// Set user modes. Returns false, sending nothing, when a letter was
    /// never advertised by the uplink.
    pub fn user_mode(&self, target: &str, modes: &str) -> bool {
        if let Some(bad) = self.link.lock().tables.invalid_user_mode(modes) {
            warn!(target = %target, modes = %modes, mode = %bad, "refusing unknown user mode");
            return false;
        }
        let me = self.identity();
        self.send(self.protocol.user_mode(&me, target, modes));
        true
    }

    /// Set channel modes (`+o nick`, `+nt`, ...). Only the mode word is
    /// validated; arguments pass through.
    pub fn channel_mode(&self, channel: &str, modes: &str) -> bool {
        let letters = modes.split_whitespace().next().unwrap_or_default();
        if let Some(bad) = self.link.lock().tables.invalid_channel_mode(letters) {
            warn!(channel = %channel, modes = %modes, mode = %bad, "refusing unknown channel mode");
            return false;
        }
        let me = self.identity();
        self.send(
            self.protocol
                .channel_mode(&me, &me.service_uid, channel, super::now(), modes),
        );
        true
    }

    /// User or channel modes, by target shape.
    pub fn set_mode(&self, target: &str, modes: &str) -> bool {
        if target.starts_with('#') {
            self.channel_mode(target, modes)
        } else {
            self.user_mode(target, modes)
        }
    }

    /// Introduce one of our pseudo-users and track it as a network user.
    pub fn introduce(&self, intro: &Introduction<'_>) -> bool {
        if !self.matrix.lock().users.insert(local_user(intro)) {
            return false;
        }
        let me = self.identity();
        self.send(self.protocol.introduce_user(&me, intro));
        true
    }

    /// (Re)introduce the service pseudo-user.
    pub fn introduce_service(&self) {
        let me = self.identity();
        self.introduce(&Introduction::service(&me, super::now()));
    }

    /// Join one of our pseudo-users to a channel.
    pub fn join(&self, uid: &str, channel: &str, key: Option<&str>) {
        let me = self.identity();
        self.matrix.lock().channels.join(channel, uid);
        self.send(self.protocol.join(&me, uid, channel, key, super::now()));
    }

    pub fn part(&self, uid: &str, channel: &str, reason: Option<&str>) {
        self.matrix.lock().channels.part(channel, uid);
        self.send(self.protocol.part(uid, channel, reason));
    }

    pub fn force_join(&self, target: &str, channel: &str, key: Option<&str>) {
        let me = self.identity();
        self.send(self.protocol.force_join(&me, target, channel, key));
    }

    pub fn force_part(&self, target: &str, channel: &str, reason: Option<&str>) {
        let me = self.identity();
        self.send(self.protocol.force_part(&me, target, channel, reason));
    }

    /// Quit one of our pseudo-users.
    pub fn quit(&self, uid: &str, reason: &str) -> Departure {
        self.send(self.protocol.quit(uid, reason));
        self.matrix.lock().remove_user(uid)
    }

    /// Kill a network user as the service.
    pub fn kill(&self, target: &str, reason: &str) -> Departure {
        let me = self.identity();
        let departure = self.matrix.lock().remove_user(target);
        let uid = departure
            .user
            .as_ref()
            .map(|u| u.uid.as_str())
            .unwrap_or(target);
        self.send(self.protocol.kill(&me.service_uid, uid, reason));
        departure
    }

    pub fn squit(&self, server: &str, reason: &str) {
        let me = self.identity();
        self.send(self.protocol.squit(&me, server, reason));
    }

    pub fn ban_add(&self, class: BanClass, user: &str, host: &str, duration_secs: i64, reason: &str) {
        let me = self.identity();
        self.send(self.protocol.ban_add(
            &me,
            class,
            user,
            host,
            duration_secs,
            &me.service_nick,
            reason,
            super::now(),
        ));
    }

    pub fn ban_remove(&self, class: BanClass, user: &str, host: &str) {
        let me = self.identity();
        self.send(self.protocol.ban_remove(&me, class, user, host, &me.service_nick));
    }

    /// Pass a line through untouched.
    pub fn raw(&self, line: &str) {
        warn!(line = %line, "raw line sent");
        self.send(line);
    }
}

/// Registry record for a pseudo-user we introduce.
pub(super) fn local_user(intro: &Introduction<'_>) -> User {
    User {
        uid: intro.uid.to_string(),
        nick: intro.nick.to_string(),
        username: intro.user.to_string(),
        realname: intro.realname.to_string(),
        hostname: intro.host.to_string(),
        vhost: intro.vhost.to_string(),
        modes: intro.modes.trim_start_matches('+').to_string(),
        ip: intro.ip.to_string(),
        connected_at: intro.ts,
        ..User::default()
    }
}
