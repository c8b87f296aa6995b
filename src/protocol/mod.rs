//! Server-to-server dialects.
//!
//! A [`Protocol`] knows one uplink dialect: which wire tokens it speaks,
//! how to read them into dialect-neutral records, and how to build outbound
//! lines. It holds no state of its own; negotiated state lives in the
//! session's [`LinkState`](crate::session::LinkState) and the registries.
//!
//! - [`modes`]: negotiated mode tables
//! - [`outbox`]: the outbound line queue
//! - [`unreal`]: UnrealIRCd 6
//! - [`inspircd`]: InspIRCd 1205/1206

mod inspircd;
mod modes;
mod outbox;
mod unreal;

pub use inspircd::{InspIrcd, fingerprint_from_ssl_cert};
pub use modes::ModeTables;
pub use outbox::Outbox;
pub use unreal::Unreal;

use crate::config::{Dialect, UplinkConfig};
use crate::error::HandlerError;
use crate::handlers::HandlerTable;
use crate::state::{Registries, Server, User};
use slsvc_proto::Line;
use std::sync::Arc;

/// Who we are on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub sid: String,
    pub server_name: String,
    pub description: String,
    pub service_uid: String,
    pub service_nick: String,
    pub service_user: String,
    pub service_host: String,
    pub service_realname: String,
    pub service_umodes: String,
    pub log_channel: String,
}

/// A pseudo-user we introduce.
#[derive(Debug, Clone)]
pub struct Introduction<'a> {
    pub uid: &'a str,
    pub nick: &'a str,
    pub user: &'a str,
    pub host: &'a str,
    pub vhost: &'a str,
    pub ip: &'a str,
    pub modes: &'a str,
    pub realname: &'a str,
    pub ts: i64,
}

impl<'a> Introduction<'a> {
    /// Our own service pseudo-user.
    pub fn service(me: &'a Identity, ts: i64) -> Self {
        Self {
            uid: &me.service_uid,
            nick: &me.service_nick,
            user: &me.service_user,
            host: &me.service_host,
            vhost: &me.service_host,
            ip: "",
            modes: &me.service_umodes,
            realname: &me.service_realname,
            ts,
        }
    }
}

/// What a capability line told us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Protocol revision the uplink speaks.
    pub revision: Option<u32>,
    /// The uplink's SID, when announced ahead of its `SERVER`.
    pub uplink_sid: Option<String>,
    /// The uplink finished its capability block.
    pub complete: bool,
}

/// Network ban classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanClass {
    /// Network-wide user@host ban.
    GLine,
    /// Server-local user@host ban.
    KLine,
}

/// A channel burst (`SJOIN` / `FJOIN`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstJoin {
    pub channel: String,
    pub ts: i64,
    pub modes: String,
    /// `(prefix modes, uid)` per member.
    pub members: Vec<(String, String)>,
}

/// Metadata about a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub uid: String,
    pub key: String,
    pub value: String,
}

/// One SASL frame relayed by the uplink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslFrame {
    /// Server to address replies to.
    pub origin: String,
    /// The authenticating client's UID.
    pub client: String,
    /// `H`, `S`, `C` or `D`.
    pub mode: char,
    pub data: String,
    /// Mechanism extra (certificate fingerprint on EXTERNAL `S`).
    pub ext: Option<String>,
}

/// A chat message resolved against the registries.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: User,
    pub target: String,
    pub text: String,
}

/// One uplink dialect.
pub trait Protocol: Send + Sync {
    /// Dialect name for logs.
    fn name(&self) -> &'static str;

    /// Protocol revision we announce.
    fn version_tag(&self) -> &'static str;

    /// Wire tokens this dialect handles.
    fn known_commands(&self) -> &'static [&'static str];

    /// Find the command token in a tokenized line.
    ///
    /// Leading `@tags` and `:source` tokens are skipped; only the token in
    /// command position is matched, so a param that happens to spell a
    /// command is never mistaken for one.
    fn locate_command(&self, tokens: &[&str]) -> Option<(usize, &'static str)> {
        let mut idx = 0;
        if tokens.get(idx).is_some_and(|t| t.starts_with('@')) {
            idx += 1;
        }
        if tokens.get(idx).is_some_and(|t| t.starts_with(':')) {
            idx += 1;
        }
        let token = tokens.get(idx)?;
        self.known_commands()
            .iter()
            .find(|c| c.eq_ignore_ascii_case(token))
            .map(|c| (idx, *c))
    }

    /// Bind every known command to its handler.
    fn register_commands(&self, table: &mut HandlerTable);

    /// Mode tables assumed before negotiation completes.
    fn initial_modes(&self) -> ModeTables {
        ModeTables::new()
    }

    /// Read a capability advertisement into `tables`.
    fn negotiate(&self, line: &Line, tables: &mut ModeTables) -> Negotiation;

    /// The link password carried by `line`, if this is the line that
    /// carries it.
    fn server_password<'a>(&self, line: &'a Line) -> Option<&'a str>;

    // ---- link sequencing ----

    /// Lines sent right after the socket opens.
    fn link_sequence(&self, me: &Identity, uplink: &UplinkConfig, now: i64) -> Vec<String>;

    /// Our burst, sent once the uplink has introduced itself.
    fn burst_start(&self, me: &Identity, now: i64) -> Vec<String>;

    /// Whether the log channel is joined inside our own burst (before
    /// end-of-burst) rather than after the uplink finishes bursting.
    fn joins_log_channel_in_burst(&self) -> bool;

    fn end_of_burst(&self, me: &Identity) -> String;

    fn pong(&self, me: &Identity, line: &Line) -> Option<String>;

    /// Advertise SASL mechanisms to the network.
    fn sasl_mechanisms(&self, me: &Identity, mechanisms: &str) -> String;

    // ---- outbound builders ----

    fn introduce_user(&self, me: &Identity, intro: &Introduction<'_>) -> String;
    fn change_nick(&self, uid: &str, nick: &str, ts: i64) -> String;
    fn user_mode(&self, me: &Identity, target: &str, modes: &str) -> String;
    fn channel_mode(&self, me: &Identity, source: &str, channel: &str, ts: i64, modes: &str) -> String;
    fn join(&self, me: &Identity, uid: &str, channel: &str, key: Option<&str>, ts: i64) -> String;
    fn part(&self, uid: &str, channel: &str, reason: Option<&str>) -> String;
    fn force_join(&self, me: &Identity, target: &str, channel: &str, key: Option<&str>) -> String;
    fn force_part(&self, me: &Identity, target: &str, channel: &str, reason: Option<&str>) -> String;
    fn quit(&self, uid: &str, reason: &str) -> String;
    fn kill(&self, source: &str, target: &str, reason: &str) -> String;
    fn squit(&self, me: &Identity, server: &str, reason: &str) -> String;
    #[allow(clippy::too_many_arguments)]
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
    ) -> String;
    fn ban_remove(&self, me: &Identity, class: BanClass, user: &str, host: &str, setter: &str) -> String;

    fn privmsg(&self, source: &str, target: &str, text: &str) -> String {
        format!(":{source} PRIVMSG {target} :{text}")
    }

    fn notice(&self, source: &str, target: &str, text: &str) -> String {
        format!(":{source} NOTICE {target} :{text}")
    }

    fn sasl_reply(&self, me: &Identity, origin: &str, client: &str, mode: char, data: &str) -> String;

    /// Log `client` into `account` network-wide.
    fn sasl_login(&self, me: &Identity, origin: &str, client: &str, account: &str) -> String;

    /// Clear `client`'s network-wide account.
    fn account_logout(&self, me: &Identity, client: &str) -> String;

    // ---- inbound parsers ----

    /// A new user. Returns the record to insert.
    fn parse_uid(&self, line: &Line, now: i64) -> Result<User, HandlerError>;

    fn parse_burst_join(&self, line: &Line, tables: &ModeTables) -> Result<BurstJoin, HandlerError>;

    fn parse_metadata(&self, line: &Line) -> Option<Metadata>;

    /// `(target uid or nick, mode change)`.
    fn parse_user_mode(&self, line: &Line) -> Option<(String, String)>;

    /// `(target uid or nick, new displayed host)`.
    fn parse_host(&self, line: &Line) -> Option<(String, String)>;

    /// A server introduction; `parent` is `None` for our direct uplink.
    fn parse_server(&self, line: &Line, uplink_sid: Option<&str>) -> Result<Server, HandlerError>;

    fn parse_sasl(&self, line: &Line) -> Option<SaslFrame>;

    /// The user behind a `QUIT`, plus the reason.
    fn parse_quit(&self, line: &Line, regs: &Registries) -> Option<(User, String)> {
        let user = regs.users.get(line.source_name()?)?.clone();
        Some((user, line.param(0).unwrap_or_default().to_string()))
    }

    /// The user behind a `NICK`, plus the new nickname.
    fn parse_nick(&self, line: &Line, regs: &Registries) -> Option<(User, String)> {
        let user = regs.users.get(line.source_name()?)?.clone();
        Some((user, line.param(0)?.to_string()))
    }

    /// A `PRIVMSG` from a known user.
    fn parse_privmsg(&self, line: &Line, regs: &Registries) -> Option<ChatMessage> {
        let sender = regs.users.get(line.source_name()?)?.clone();
        Some(ChatMessage {
            sender,
            target: line.param(0)?.to_string(),
            text: line.param(1)?.to_string(),
        })
    }
}

/// Build the protocol engine for a dialect.
pub fn for_dialect(dialect: Dialect) -> Arc<dyn Protocol> {
    match dialect {
        Dialect::Unrealircd => Arc::new(Unreal),
        Dialect::Inspircd => Arc::new(InspIrcd),
    }
}

/// True for a TS6 SID (`[0-9][A-Z0-9][A-Z0-9]`).
pub fn is_sid(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 3
        && b[0].is_ascii_digit()
        && b[1..]
            .iter()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn need(line: &Line, count: usize) -> Result<(), HandlerError> {
    if line.params.len() < count {
        Err(HandlerError::NeedMoreParams(line.command.clone()))
    } else {
        Ok(())
    }
}

fn parse_ts(value: &str) -> Result<i64, HandlerError> {
    value
        .parse()
        .map_err(|_| HandlerError::Protocol(format!("bad timestamp '{value}'")))
}
