//! User lifecycle: introduction, departure, renames, modes, hosts and
//! metadata.

use super::WireHandler;
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::fingerprint_from_ssl_cert;
use crate::session::{Services, now};
use crate::state::{Admin, Registries, User};
use async_trait::async_trait;
use slsvc_proto::Line;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `UID`: a user joined the network.
pub struct UidHandler;

#[async_trait]
impl WireHandler for UidHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let mut user = svc.protocol.parse_uid(line, now())?;
        if let Some(score) = svc.scores.get(&user.ip) {
            user.reputation = *score;
        }

        let uid = user.uid.clone();
        let nick = user.nick.clone();
        let fingerprint = user.fingerprint.clone();
        let resolved = svc.sasl.take_resolved(&uid);

        let inserted = {
            let mut regs = svc.matrix.lock();
            let inserted = regs.users.insert(user);
            if inserted && let Some(login) = &resolved {
                regs.admins.insert(Admin {
                    uid: uid.clone(),
                    nick: nick.clone(),
                    account: login.account.clone(),
                    level: login.level,
                    language: login.language.clone(),
                });
            }
            inserted
        };
        if !inserted {
            return Err(HandlerError::Protocol(format!("duplicate UID {uid}")));
        }
        debug!(uid = %uid, nick = %nick, "user introduced");

        if let Some(login) = resolved {
            info!(uid = %uid, nick = %nick, account = %login.account, "SASL login applied");
            svc.announce(&format!(
                "{nick} authenticated as {} (level {}) via SASL",
                login.account, login.level
            ));
        } else if let Some(fp) = fingerprint {
            login_by_fingerprint(svc, &uid, &fp).await?;
        }
        Ok(())
    }
}

/// Bind an admin session to `uid` when `fp` belongs to a stored admin.
pub(crate) async fn login_by_fingerprint(svc: &Services, uid: &str, fp: &str) -> HandlerResult {
    if svc.matrix.lock().admins.exists(uid) {
        return Ok(());
    }
    let Some(record) = svc.db.admins().find_by_fingerprint(fp).await? else {
        return Ok(());
    };

    let nick = bind_admin(&mut svc.matrix.lock(), uid, &record.name, record.level, &record.language);
    let Some(nick) = nick else {
        return Ok(());
    };
    svc.db
        .logs()
        .audit(&record.name, "auth.fingerprint", Some(&nick))
        .await?;
    info!(uid = %uid, nick = %nick, account = %record.name, "certificate login");
    svc.announce(&format!(
        "{nick} authenticated as {} (level {}) by certificate",
        record.name, record.level
    ));
    Ok(())
}

/// Insert an admin session for a live user. Returns the user's nickname.
pub(crate) fn bind_admin(
    regs: &mut Registries,
    uid: &str,
    account: &str,
    level: u8,
    language: &str,
) -> Option<String> {
    let user = regs.users.get(uid)?;
    let admin = Admin {
        uid: user.uid.clone(),
        nick: user.nick.clone(),
        account: account.to_string(),
        level,
        language: language.to_string(),
    };
    let nick = admin.nick.clone();
    regs.admins.remove(&admin.uid);
    regs.admins.insert(admin);
    Some(nick)
}

/// `QUIT`.
pub struct QuitHandler;

#[async_trait]
impl WireHandler for QuitHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let departure = {
            let mut regs = svc.matrix.lock();
            let (user, reason) = svc
                .protocol
                .parse_quit(line, &regs)
                .ok_or_else(|| HandlerError::unknown_user(line.source_name().unwrap_or("*")))?;
            debug!(uid = %user.uid, nick = %user.nick, reason = %reason, "user quit");
            regs.remove_user(&user.uid)
        };
        if let Some(user) = &departure.user {
            svc.sasl.remove(&user.uid);
            if departure.was_admin {
                info!(uid = %user.uid, nick = %user.nick, "admin session ended by quit");
            }
        }
        Ok(())
    }
}

/// `KILL`: a user was removed by an operator or another service.
pub struct KillHandler;

#[async_trait]
impl WireHandler for KillHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let target = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let reason = line.param(1).unwrap_or_default();
        let killer = line.source_name().unwrap_or("*");

        if svc.is_service(target) {
            warn!(killer = %killer, reason = %reason, "service pseudo-user was killed");
            let me = svc.identity();
            let channels: Vec<String> = {
                let mut regs = svc.matrix.lock();
                let departure = regs.remove_user(&me.service_uid);
                departure.channels
            };
            svc.introduce_service();
            for channel in &channels {
                svc.join(&me.service_uid, channel, None);
            }
            if !channels.iter().any(|c| slsvc_proto::irc_eq(c, &me.log_channel)) {
                svc.join(&me.service_uid, &me.log_channel, None);
            }
            svc.announce(&format!("Killed by {killer} ({reason}), reintroduced"));
            return Ok(());
        }

        let departure = svc.matrix.lock().remove_user(target);
        match departure.user {
            Some(user) => {
                svc.sasl.remove(&user.uid);
                debug!(uid = %user.uid, nick = %user.nick, killer = %killer, "user killed");
                Ok(())
            }
            None => Err(HandlerError::unknown_user(target)),
        }
    }
}

/// `NICK` from a user.
pub struct NickHandler;

#[async_trait]
impl WireHandler for NickHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let mut regs = svc.matrix.lock();
        let (user, nick) = svc
            .protocol
            .parse_nick(line, &regs)
            .ok_or_else(|| HandlerError::unknown_user(line.source_name().unwrap_or("*")))?;
        if regs.rename_user(&user.uid, &nick) {
            debug!(uid = %user.uid, old = %user.nick, new = %nick, "nick change");
            Ok(())
        } else {
            Err(HandlerError::Protocol(format!(
                "nick change of {} to {nick} rejected",
                user.uid
            )))
        }
    }
}

/// `UMODE2` / `SVSMODE` / `SVS2MODE` / user-targeted `MODE`.
pub struct UserModeHandler;

#[async_trait]
impl WireHandler for UserModeHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        // Channel MODE lines carry nothing we track.
        let Some((target, change)) = svc.protocol.parse_user_mode(line) else {
            return Ok(());
        };
        if svc.matrix.lock().update_user_mode(&target, &change) {
            debug!(target = %target, change = %change, "user mode");
            Ok(())
        } else {
            Err(HandlerError::unknown_user(&target))
        }
    }
}

/// `SETHOST` / `CHGHOST` / `FHOST`.
pub struct HostHandler;

#[async_trait]
impl WireHandler for HostHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let (target, host) = svc
            .protocol
            .parse_host(line)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let mut regs = svc.matrix.lock();
        let user = regs
            .users
            .get_mut(&target)
            .ok_or_else(|| HandlerError::unknown_user(&target))?;
        user.vhost = host;
        Ok(())
    }
}

/// `MD client` / `METADATA`.
pub struct MetadataHandler;

#[async_trait]
impl WireHandler for MetadataHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let Some(meta) = svc.protocol.parse_metadata(line) else {
            return Ok(());
        };
        let fingerprint = {
            let mut regs = svc.matrix.lock();
            let user = regs
                .users
                .get_mut(&meta.uid)
                .ok_or_else(|| HandlerError::unknown_user(&meta.uid))?;
            apply_metadata(user, &meta.key, &meta.value)
        };
        if let Some(fp) = fingerprint {
            login_by_fingerprint(svc, &meta.uid, &fp).await?;
        }
        Ok(())
    }
}

/// Apply one metadata key. Returns a newly learned fingerprint.
fn apply_metadata(user: &mut User, key: &str, value: &str) -> Option<String> {
    match key {
        "certfp" => {
            user.fingerprint = Some(value.to_ascii_lowercase());
            user.fingerprint.clone()
        }
        "ssl_cert" => {
            user.fingerprint = fingerprint_from_ssl_cert(value);
            user.fingerprint.clone()
        }
        "accountname" => {
            user.account = (!value.is_empty()).then(|| value.to_string());
            None
        }
        "geoip" => {
            user.country = value
                .split('|')
                .find_map(|kv| kv.strip_prefix("cc="))
                .map(str::to_string);
            None
        }
        "webirc" => {
            user.webirc = true;
            None
        }
        "websocket" => {
            user.websocket = true;
            None
        }
        _ => None,
    }
}

/// UnrealIRCd `REPUTATION <ip> <score>`.
pub struct ReputationHandler;

#[async_trait]
impl WireHandler for ReputationHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let ip = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let raw = line
            .param(1)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        // A trailing `*` marks a score the sender does not consider final.
        let score: i32 = raw
            .trim_end_matches('*')
            .parse()
            .map_err(|_| HandlerError::Protocol(format!("bad reputation score '{raw}'")))?;

        svc.scores.insert(ip.to_string(), score);
        let mut regs = svc.matrix.lock();
        for user in regs.users.iter_mut().filter(|u| u.ip == ip) {
            user.reputation = score;
        }
        Ok(())
    }
}
