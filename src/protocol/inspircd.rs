//! InspIRCd spanning-tree protocol, revisions 1205 and 1206.
//!
//! We announce 1205 and always emit its layouts; inbound `UID` is accepted
//! in either layout since a 1206 hub still relays 1206-shaped lines from
//! newer leaves.

use super::{
    BanClass, BurstJoin, Identity, Introduction, Metadata, ModeTables, Negotiation, Protocol,
    SaslFrame, is_sid, need, parse_ts,
};
use crate::config::UplinkConfig;
use crate::error::HandlerError;
use crate::handlers::{self, HandlerTable};
use crate::state::{Server, User};
use slsvc_proto::Line;

pub struct InspIrcd;

const PROTOCOL_VERSION: &str = "1205";

const COMMANDS: &[&str] = &[
    "PING", "CAPAB", "SERVER", "SQUIT", "ERROR", "BURST", "ENDBURST", "UID", "QUIT", "KILL",
    "NICK", "FJOIN", "IJOIN", "PART", "KICK", "MODE", "FHOST", "METADATA", "PRIVMSG", "ENCAP",
];

impl Protocol for InspIrcd {
    fn name(&self) -> &'static str {
        "inspircd"
    }

    fn version_tag(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    fn known_commands(&self) -> &'static [&'static str] {
        COMMANDS
    }

    fn register_commands(&self, table: &mut HandlerTable) {
        table.register("PING", handlers::PingHandler);
        table.register("CAPAB", handlers::CapabilityHandler);
        table.register("SERVER", handlers::ServerHandler);
        table.register("SQUIT", handlers::SquitHandler);
        table.register("ERROR", handlers::ErrorHandler);
        table.register("BURST", handlers::BurstStartHandler);
        table.register("ENDBURST", handlers::EndBurstHandler);
        table.register("UID", handlers::UidHandler);
        table.register("QUIT", handlers::QuitHandler);
        table.register("KILL", handlers::KillHandler);
        table.register("NICK", handlers::NickHandler);
        table.register("FJOIN", handlers::BurstJoinHandler);
        table.register("IJOIN", handlers::JoinHandler);
        table.register("PART", handlers::PartHandler);
        table.register("KICK", handlers::KickHandler);
        table.register("MODE", handlers::UserModeHandler);
        table.register("FHOST", handlers::HostHandler);
        table.register("METADATA", handlers::MetadataHandler);
        table.register("PRIVMSG", handlers::PrivmsgHandler);
        table.register("ENCAP", handlers::EncapHandler);
    }

    fn negotiate(&self, line: &Line, tables: &mut ModeTables) -> Negotiation {
        let mut result = Negotiation::default();
        if line.command != "CAPAB" {
            return result;
        }
        let body = line.param(1).unwrap_or_default();
        match line.param(0).unwrap_or_default() {
            "START" => result.revision = body.parse().ok(),
            "CHANMODES" => tables.parse_insp_chanmodes(body),
            "USERMODES" => tables.parse_insp_usermodes(body),
            "CAPABILITIES" => {
                for token in body.split_whitespace() {
                    if tables.apply_isupport(token) {
                        continue;
                    }
                    if let Some(rev) = token.strip_prefix("PROTOCOL=") {
                        result.revision = rev.parse().ok();
                    }
                }
            }
            "END" => result.complete = true,
            _ => {}
        }
        result
    }

    fn server_password<'a>(&self, line: &'a Line) -> Option<&'a str> {
        if line.command == "SERVER" && line.source.is_none() {
            line.param(1)
        } else {
            None
        }
    }

    fn link_sequence(&self, me: &Identity, uplink: &UplinkConfig, _now: i64) -> Vec<String> {
        vec![
            format!("CAPAB START {PROTOCOL_VERSION}"),
            "CAPAB CAPABILITIES :CASEMAPPING=rfc1459".to_string(),
            "CAPAB END".to_string(),
            format!(
                "SERVER {} {} 0 {} :{}",
                me.server_name, uplink.password, me.sid, me.description
            ),
        ]
    }

    fn burst_start(&self, me: &Identity, now: i64) -> Vec<String> {
        vec![
            format!(":{} BURST {}", me.sid, now),
            self.introduce_user(me, &Introduction::service(me, now)),
        ]
    }

    fn joins_log_channel_in_burst(&self) -> bool {
        false
    }

    fn end_of_burst(&self, me: &Identity) -> String {
        format!(":{} ENDBURST", me.sid)
    }

    fn pong(&self, me: &Identity, line: &Line) -> Option<String> {
        match line.source_name() {
            Some(source) => Some(format!(":{} PONG {}", me.sid, source)),
            None => Some(format!(":{} PONG {}", me.sid, line.param(0)?)),
        }
    }

    fn sasl_mechanisms(&self, me: &Identity, mechanisms: &str) -> String {
        format!(":{} METADATA * saslmechlist :{}", me.sid, mechanisms)
    }

    fn introduce_user(&self, me: &Identity, intro: &Introduction<'_>) -> String {
        let ip = if intro.ip.is_empty() { "0.0.0.0" } else { intro.ip };
        format!(
            ":{} UID {} {} {} {} {} {} {} {} +{} :{}",
            me.sid,
            intro.uid,
            intro.ts,
            intro.nick,
            intro.host,
            intro.vhost,
            intro.user,
            ip,
            intro.ts,
            intro.modes.trim_start_matches('+'),
            intro.realname
        )
    }

    fn change_nick(&self, uid: &str, nick: &str, ts: i64) -> String {
        format!(":{uid} NICK {nick} {ts}")
    }

    fn user_mode(&self, me: &Identity, target: &str, modes: &str) -> String {
        format!(":{} MODE {} {}", me.sid, target, modes)
    }

    fn channel_mode(&self, _me: &Identity, source: &str, channel: &str, ts: i64, modes: &str) -> String {
        format!(":{source} FMODE {channel} {ts} {modes}")
    }

    /// Server-side joins are not checked against `+k`, so the key is not sent.
    /// Membership ids are the peer's to assign; ours are always 0.
    fn join(&self, me: &Identity, uid: &str, channel: &str, _key: Option<&str>, ts: i64) -> String {
        format!(":{} FJOIN {} {} + :,{}:0", me.sid, channel, ts, uid)
    }

    fn part(&self, uid: &str, channel: &str, reason: Option<&str>) -> String {
        format!(":{uid} PART {channel} :{}", reason.unwrap_or_default())
    }

    fn force_join(&self, me: &Identity, target: &str, channel: &str, key: Option<&str>) -> String {
        match key {
            Some(key) => format!(":{} SVSJOIN {} {} {}", me.sid, target, channel, key),
            None => format!(":{} SVSJOIN {} {}", me.sid, target, channel),
        }
    }

    fn force_part(&self, me: &Identity, target: &str, channel: &str, reason: Option<&str>) -> String {
        match reason {
            Some(reason) => format!(":{} SVSPART {} {} :{}", me.sid, target, channel, reason),
            None => format!(":{} SVSPART {} {}", me.sid, target, channel),
        }
    }

    fn quit(&self, uid: &str, reason: &str) -> String {
        format!(":{uid} QUIT :{reason}")
    }

    fn kill(&self, source: &str, target: &str, reason: &str) -> String {
        format!(":{source} KILL {target} :{reason}")
    }

    fn squit(&self, me: &Identity, server: &str, reason: &str) -> String {
        format!(":{} SQUIT {} :{}", me.sid, server, reason)
    }

    fn ban_add(
        &self,
        me: &Identity,
        class: BanClass,
        user: &str,
        host: &str,
        duration_secs: i64,
        setter: &str,
        reason: &str,
        now: i64,
    ) -> String {
        format!(
            ":{} ADDLINE {} {}@{} {} {} {} :{}",
            me.sid,
            line_type(class),
            user,
            host,
            setter,
            now,
            duration_secs.max(0),
            reason
        )
    }

    fn ban_remove(&self, me: &Identity, class: BanClass, user: &str, host: &str, _setter: &str) -> String {
        format!(":{} DELLINE {} {}@{}", me.sid, line_type(class), user, host)
    }

    fn sasl_reply(&self, me: &Identity, origin: &str, client: &str, mode: char, data: &str) -> String {
        format!(
            ":{} ENCAP {} SASL {} {} {} {}",
            me.sid, origin, me.service_uid, client, mode, data
        )
    }

    fn sasl_login(&self, me: &Identity, _origin: &str, client: &str, account: &str) -> String {
        format!(":{} METADATA {} accountname :{}", me.sid, client, account)
    }

    fn account_logout(&self, me: &Identity, client: &str) -> String {
        format!(":{} METADATA {} accountname :", me.sid, client)
    }

    fn parse_uid(&self, line: &Line, _now: i64) -> Result<User, HandlerError> {
        need(line, 10)?;
        let p = &line.params;
        // 1205: uid ts nick host dhost ident ip signon +modes [args] :real
        // 1206: uid ts nick host dhost realuser user ip signon +modes [args] :real
        let (username, ip, signon, modes) = if p[8].starts_with('+') {
            (p[5].clone(), &p[6], &p[7], &p[8])
        } else {
            need(line, 11)?;
            let user = if p[6] != "*" { p[6].clone() } else { p[5].clone() };
            (user, &p[7], &p[8], &p[9])
        };
        let realname = p[p.len() - 1].clone();

        Ok(User {
            uid: p[0].clone(),
            nick: p[2].clone(),
            username,
            realname,
            hostname: p[3].clone(),
            vhost: p[4].clone(),
            modes: modes.trim_start_matches('+').to_string(),
            ip: ip.clone(),
            webirc: false,
            websocket: false,
            country: None,
            reputation: 0,
            connected_at: parse_ts(signon)?,
            fingerprint: None,
            account: None,
        })
    }

    fn parse_burst_join(&self, line: &Line, _tables: &ModeTables) -> Result<BurstJoin, HandlerError> {
        // :sid FJOIN #chan ts +modes [args] :[prefixes],uid[:membid] ...
        need(line, 4)?;
        let p = &line.params;
        let members = p[p.len() - 1]
            .split_whitespace()
            .filter_map(|token| {
                let (modes, rest) = token.split_once(',')?;
                let uid = rest.split(':').next().unwrap_or(rest);
                (!uid.is_empty()).then(|| (modes.to_string(), uid.to_string()))
            })
            .collect();
        Ok(BurstJoin {
            channel: p[0].clone(),
            ts: parse_ts(&p[1])?,
            modes: p[2].trim_start_matches('+').to_string(),
            members,
        })
    }

    fn parse_metadata(&self, line: &Line) -> Option<Metadata> {
        let target = line.param(0)?;
        if target == "*" || target.starts_with('#') {
            return None;
        }
        Some(Metadata {
            uid: target.to_string(),
            key: line.param(1)?.to_string(),
            value: line.param(2).unwrap_or_default().to_string(),
        })
    }

    fn parse_user_mode(&self, line: &Line) -> Option<(String, String)> {
        let target = line.param(0)?;
        if line.command != "MODE" || target.starts_with('#') {
            return None;
        }
        Some((target.to_string(), line.param(1)?.to_string()))
    }

    fn parse_host(&self, line: &Line) -> Option<(String, String)> {
        if line.command != "FHOST" {
            return None;
        }
        Some((line.source_name()?.to_string(), line.param(0)?.to_string()))
    }

    fn parse_server(&self, line: &Line, _uplink_sid: Option<&str>) -> Result<Server, HandlerError> {
        // SERVER name pass [hop] sid :desc       (uplink)
        // :parent SERVER name [* hop] sid :desc  (downstream)
        need(line, 3)?;
        let p = &line.params;
        let description = p[p.len() - 1].clone();
        let sid = p[1..p.len() - 1]
            .iter()
            .rev()
            .find(|t| is_sid(t))
            .cloned()
            .ok_or_else(|| HandlerError::Protocol(format!("SERVER without SID: {line}")))?;
        Ok(Server {
            sid,
            name: p[0].clone(),
            description,
            parent: line.source_name().map(String::from),
        })
    }

    fn parse_sasl(&self, line: &Line) -> Option<SaslFrame> {
        // :origin ENCAP target SASL client agent mode data [ext]
        if line.param(1)? != "SASL" {
            return None;
        }
        Some(SaslFrame {
            origin: line.source_name()?.to_string(),
            client: line.param(2)?.to_string(),
            mode: line.param(4)?.chars().next()?,
            data: line.param(5).unwrap_or_default().to_string(),
            ext: line.param(6).map(String::from),
        })
    }
}

fn line_type(class: BanClass) -> char {
    match class {
        BanClass::GLine => 'G',
        BanClass::KLine => 'K',
    }
}

/// Fingerprint from an `ssl_cert` metadata value (`flags fp dn issuer`).
/// Flags containing `E` mean the certificate could not be read.
pub fn fingerprint_from_ssl_cert(value: &str) -> Option<String> {
    let mut parts = value.split_whitespace();
    let flags = parts.next()?;
    if flags.contains('E') {
        return None;
    }
    parts.next().filter(|fp| !fp.is_empty()).map(String::from)
}
