//! UnrealIRCd 6 (`PROTOCTL`/`SJOIN`/`EOS`).
//!
//! Peculiarities handled here:
//! - user IPs travel base64-encoded in network byte order (`*` when hidden)
//! - user-attached metadata arrives as `s2s-md/*` message tags on `UID`
//! - `SJOIN` member prefixes use their own symbol set (`*` owner, `~` admin)
//! - SASL frames are a first-class `SASL` command and logins use `SVSLOGIN`

use super::{
    BanClass, BurstJoin, Identity, Introduction, Metadata, ModeTables, Negotiation, Protocol,
    SaslFrame, is_sid, need, parse_ts,
};
use crate::config::UplinkConfig;
use crate::error::HandlerError;
use crate::handlers::{self, HandlerTable};
use crate::state::{Server, User};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use slsvc_proto::Line;
use std::net::IpAddr;

pub struct Unreal;

const PROTOCOL_VERSION: &str = "6100";

/// User modes UnrealIRCd 6 ships with; replaced once `PROTOCTL USERMODES=`
/// arrives.
const DEFAULT_USER_MODES: &str = "diopqrstwxzBDGHIRSTWZ";

const COMMANDS: &[&str] = &[
    "PING", "PASS", "PROTOCTL", "SERVER", "SID", "SQUIT", "ERROR", "EOS", "UID", "QUIT", "KILL",
    "NICK", "SJOIN", "PART", "KICK", "MODE", "UMODE2", "SVSMODE", "SVS2MODE", "SETHOST",
    "CHGHOST", "MD", "REPUTATION", "PRIVMSG", "SASL",
];

impl Protocol for Unreal {
    fn name(&self) -> &'static str {
        "unrealircd"
    }

    fn version_tag(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    fn known_commands(&self) -> &'static [&'static str] {
        COMMANDS
    }

    fn register_commands(&self, table: &mut HandlerTable) {
        table.register("PING", handlers::PingHandler);
        table.register("PASS", handlers::PassHandler);
        table.register("PROTOCTL", handlers::CapabilityHandler);
        table.register("SERVER", handlers::ServerHandler);
        table.register("SID", handlers::ServerHandler);
        table.register("SQUIT", handlers::SquitHandler);
        table.register("ERROR", handlers::ErrorHandler);
        table.register("EOS", handlers::EndBurstHandler);
        table.register("UID", handlers::UidHandler);
        table.register("QUIT", handlers::QuitHandler);
        table.register("KILL", handlers::KillHandler);
        table.register("NICK", handlers::NickHandler);
        table.register("SJOIN", handlers::BurstJoinHandler);
        table.register("PART", handlers::PartHandler);
        table.register("KICK", handlers::KickHandler);
        for cmd in ["MODE", "UMODE2", "SVSMODE", "SVS2MODE"] {
            table.register(cmd, handlers::UserModeHandler);
        }
        table.register("SETHOST", handlers::HostHandler);
        table.register("CHGHOST", handlers::HostHandler);
        table.register("MD", handlers::MetadataHandler);
        table.register("REPUTATION", handlers::ReputationHandler);
        table.register("PRIVMSG", handlers::PrivmsgHandler);
        table.register("SASL", handlers::SaslHandler);
    }

    fn initial_modes(&self) -> ModeTables {
        let mut tables = ModeTables::new();
        tables.parse_prefix("(qaohv)~&@%+");
        tables.parse_usermodes(DEFAULT_USER_MODES);
        tables
    }

    fn negotiate(&self, line: &Line, tables: &mut ModeTables) -> Negotiation {
        let mut result = Negotiation::default();
        if line.command != "PROTOCTL" {
            return result;
        }
        for token in &line.params {
            if tables.apply_isupport(token) {
                continue;
            }
            match token.split_once('=') {
                Some(("SID", sid)) => result.uplink_sid = Some(sid.to_string()),
                Some(("EAUTH", value)) => {
                    result.revision = value.split(',').nth(1).and_then(|v| v.parse().ok());
                }
                _ => {}
            }
        }
        result
    }

    fn server_password<'a>(&self, line: &'a Line) -> Option<&'a str> {
        (line.command == "PASS").then(|| line.param(0)).flatten()
    }

    fn link_sequence(&self, me: &Identity, uplink: &UplinkConfig, _now: i64) -> Vec<String> {
        vec![
            format!("PASS :{}", uplink.password),
            "PROTOCTL NOQUIT NICKv2 SJOIN SJOIN2 UMODE2 VL SJ3 TKLEXT TKLEXT2 NICKIP ESVID MLOCK EXTSWHOIS MTAGS".to_string(),
            format!("PROTOCTL EAUTH={},{}", me.server_name, PROTOCOL_VERSION),
            format!("PROTOCTL SID={}", me.sid),
            format!("SERVER {} 1 :{}", me.server_name, me.description),
        ]
    }

    fn burst_start(&self, me: &Identity, now: i64) -> Vec<String> {
        vec![self.introduce_user(me, &Introduction::service(me, now))]
    }

    fn joins_log_channel_in_burst(&self) -> bool {
        true
    }

    fn end_of_burst(&self, me: &Identity) -> String {
        format!(":{} EOS", me.sid)
    }

    fn pong(&self, me: &Identity, line: &Line) -> Option<String> {
        let origin = line.param(0).or(line.source_name())?;
        Some(format!(":{} PONG {} :{}", me.sid, me.server_name, origin))
    }

    fn sasl_mechanisms(&self, me: &Identity, mechanisms: &str) -> String {
        format!(":{} MD client {} saslmechlist :{}", me.sid, me.server_name, mechanisms)
    }

    fn introduce_user(&self, me: &Identity, intro: &Introduction<'_>) -> String {
        format!(
            ":{} UID {} 1 {} {} {} {} 0 +{} {} {} {} :{}",
            me.sid,
            intro.nick,
            intro.ts,
            intro.user,
            intro.host,
            intro.uid,
            intro.modes.trim_start_matches('+'),
            intro.vhost,
            intro.vhost,
            encode_ip(intro.ip),
            intro.realname
        )
    }

    fn change_nick(&self, uid: &str, nick: &str, ts: i64) -> String {
        format!(":{uid} NICK {nick} {ts}")
    }

    fn user_mode(&self, me: &Identity, target: &str, modes: &str) -> String {
        format!(":{} SVS2MODE {} {}", me.sid, target, modes)
    }

    fn channel_mode(&self, _me: &Identity, source: &str, channel: &str, _ts: i64, modes: &str) -> String {
        format!(":{source} MODE {channel} {modes}")
    }

    fn join(&self, me: &Identity, uid: &str, channel: &str, key: Option<&str>, ts: i64) -> String {
        match key {
            Some(key) => format!(":{uid} JOIN {channel} {key}"),
            None => format!(":{} SJOIN {} {} :{}", me.sid, ts, channel, uid),
        }
    }

    fn part(&self, uid: &str, channel: &str, reason: Option<&str>) -> String {
        match reason {
            Some(reason) => format!(":{uid} PART {channel} :{reason}"),
            None => format!(":{uid} PART {channel}"),
        }
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

    fn squit(&self, _me: &Identity, server: &str, reason: &str) -> String {
        format!("SQUIT {server} :{reason}")
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
        let expire = if duration_secs > 0 { now + duration_secs } else { 0 };
        format!(
            ":{} TKL + {} {} {} {} {} {} :{}",
            me.sid,
            tkl_type(class),
            user,
            host,
            setter,
            expire,
            now,
            reason
        )
    }

    fn ban_remove(&self, me: &Identity, class: BanClass, user: &str, host: &str, setter: &str) -> String {
        format!(":{} TKL - {} {} {} {}", me.sid, tkl_type(class), user, host, setter)
    }

    fn sasl_reply(&self, me: &Identity, origin: &str, client: &str, mode: char, data: &str) -> String {
        format!(":{} SASL {} {} {} {}", me.sid, origin, client, mode, data)
    }

    fn sasl_login(&self, me: &Identity, origin: &str, client: &str, account: &str) -> String {
        format!(":{} SVSLOGIN {} {} {}", me.sid, origin, client, account)
    }

    fn account_logout(&self, me: &Identity, client: &str) -> String {
        format!(":{} SVSLOGIN * {} 0", me.sid, client)
    }

    fn parse_uid(&self, line: &Line, _now: i64) -> Result<User, HandlerError> {
        need(line, 12)?;
        let p = &line.params;
        let host = p[4].clone();
        let vhost = [&p[8], &p[9]]
            .into_iter()
            .find(|h| *h != "*")
            .cloned()
            .unwrap_or_else(|| host.clone());
        let stamp = &p[6];
        let account = (stamp != "0" && stamp != "*" && !stamp.chars().all(|c| c.is_ascii_digit()))
            .then(|| stamp.clone());

        Ok(User {
            uid: p[5].clone(),
            nick: p[0].clone(),
            username: p[3].clone(),
            realname: p[11].clone(),
            hostname: host,
            vhost,
            modes: p[7].trim_start_matches('+').to_string(),
            ip: decode_ip(&p[10]).unwrap_or_default(),
            webirc: line.tag("s2s-md/webirc").is_some(),
            websocket: line.tag("s2s-md/websocket").is_some(),
            country: line.tag("s2s-md/geoip").and_then(country_from_geoip),
            reputation: 0,
            connected_at: parse_ts(&p[2])?,
            fingerprint: line
                .tag("s2s-md/certfp")
                .filter(|fp| !fp.is_empty())
                .map(String::from),
            account,
        })
    }

    fn parse_burst_join(&self, line: &Line, _tables: &ModeTables) -> Result<BurstJoin, HandlerError> {
        need(line, 3)?;
        let p = &line.params;
        let modes = if p.len() > 3 && p[2].starts_with('+') {
            p[2].trim_start_matches('+').to_string()
        } else {
            String::new()
        };
        let members = p[p.len() - 1]
            .split_whitespace()
            .filter_map(sjoin_member)
            .collect();
        Ok(BurstJoin {
            channel: p[1].clone(),
            ts: parse_ts(&p[0])?,
            modes,
            members,
        })
    }

    fn parse_metadata(&self, line: &Line) -> Option<Metadata> {
        if line.param(0)? != "client" {
            return None;
        }
        Some(Metadata {
            uid: line.param(1)?.to_string(),
            key: line.param(2)?.to_string(),
            value: line.param(3).unwrap_or_default().to_string(),
        })
    }

    fn parse_user_mode(&self, line: &Line) -> Option<(String, String)> {
        match line.command.as_str() {
            "UMODE2" => Some((line.source_name()?.to_string(), line.param(0)?.to_string())),
            "SVSMODE" | "SVS2MODE" => Some((line.param(0)?.to_string(), line.param(1)?.to_string())),
            "MODE" if !line.param(0)?.starts_with('#') => {
                Some((line.param(0)?.to_string(), line.param(1)?.to_string()))
            }
            _ => None,
        }
    }

    fn parse_host(&self, line: &Line) -> Option<(String, String)> {
        match line.command.as_str() {
            "SETHOST" => Some((line.source_name()?.to_string(), line.param(0)?.to_string())),
            "CHGHOST" => Some((line.param(0)?.to_string(), line.param(1)?.to_string())),
            _ => None,
        }
    }

    fn parse_server(&self, line: &Line, uplink_sid: Option<&str>) -> Result<Server, HandlerError> {
        match (line.command.as_str(), line.source_name()) {
            // :001 SID name hop sid :desc
            ("SID", Some(parent)) => {
                need(line, 4)?;
                Ok(Server {
                    sid: line.params[2].clone(),
                    name: line.params[0].clone(),
                    description: line.params[3].clone(),
                    parent: Some(parent.to_string()),
                })
            }
            // SERVER name hop :[U6100-flags-sid ]desc
            ("SERVER", None) => {
                need(line, 3)?;
                let (vl_sid, description) = split_vl_info(&line.params[2]);
                let sid = uplink_sid
                    .map(str::to_string)
                    .or(vl_sid)
                    .ok_or_else(|| HandlerError::Protocol("uplink SERVER before SID".into()))?;
                Ok(Server {
                    sid,
                    name: line.params[0].clone(),
                    description,
                    parent: None,
                })
            }
            _ => Err(HandlerError::Protocol(format!(
                "unexpected server introduction: {line}"
            ))),
        }
    }

    fn parse_sasl(&self, line: &Line) -> Option<SaslFrame> {
        Some(SaslFrame {
            origin: line.source_name()?.to_string(),
            client: line.param(1)?.to_string(),
            mode: line.param(2)?.chars().next()?,
            data: line.param(3).unwrap_or_default().to_string(),
            ext: line.param(4).map(String::from),
        })
    }
}

fn tkl_type(class: BanClass) -> char {
    match class {
        BanClass::GLine => 'G',
        BanClass::KLine => 'k',
    }
}

/// Member token from an `SJOIN` list. List-mode entries (`&`, `"`, `'`)
/// are not members.
fn sjoin_member(token: &str) -> Option<(String, String)> {
    // SJSBY: <setat,setby>&mask
    let token = match token.strip_prefix('<') {
        Some(rest) => rest.split_once('>')?.1,
        None => token,
    };
    if token.starts_with(['&', '"', '\'']) {
        return None;
    }
    let uid = token.trim_start_matches(['*', '~', '@', '%', '+']);
    if uid.is_empty() {
        return None;
    }
    let modes = token[..token.len() - uid.len()]
        .chars()
        .filter_map(|c| match c {
            '*' => Some('q'),
            '~' => Some('a'),
            '@' => Some('o'),
            '%' => Some('h'),
            '+' => Some('v'),
            _ => None,
        })
        .collect();
    Some((modes, uid.to_string()))
}

/// `U6100-Fhin6XeOoE-001 description` → (Some("001"), "description").
fn split_vl_info(info: &str) -> (Option<String>, String) {
    let Some((first, rest)) = info.split_once(' ') else {
        return (None, info.to_string());
    };
    let parts: Vec<&str> = first.split('-').collect();
    if first.starts_with('U') && parts.len() >= 3 && is_sid(parts[2]) {
        (Some(parts[2].to_string()), rest.to_string())
    } else {
        (None, info.to_string())
    }
}

/// `cc=NL|cd=Netherlands` → `NL`.
fn country_from_geoip(value: &str) -> Option<String> {
    value
        .split('|')
        .find_map(|kv| kv.strip_prefix("cc="))
        .filter(|cc| !cc.is_empty())
        .map(String::from)
}

/// Base64 network-order address to text. `*` means no address.
pub fn decode_ip(value: &str) -> Option<String> {
    if value == "*" {
        return None;
    }
    let bytes = BASE64.decode(value).ok()?;
    let addr = match bytes.len() {
        4 => IpAddr::from(<[u8; 4]>::try_from(bytes.as_slice()).ok()?),
        16 => IpAddr::from(<[u8; 16]>::try_from(bytes.as_slice()).ok()?),
        _ => return None,
    };
    Some(addr.to_string())
}

/// Text address to the base64 wire form, `*` when unparseable.
pub fn encode_ip(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => BASE64.encode(v4.octets()),
        Ok(IpAddr::V6(v6)) => BASE64.encode(v6.octets()),
        Err(_) => "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Line {
        Line::parse(raw).unwrap()
    }

    #[test]
    fn ip_wire_form() {
        assert_eq!(encode_ip("192.168.1.1"), "wKgBAQ==");
        assert_eq!(decode_ip("wKgBAQ==").as_deref(), Some("192.168.1.1"));
        assert_eq!(decode_ip("*"), None);
        assert_eq!(encode_ip("not-an-ip"), "*");
        let v6 = encode_ip("2001:db8::1");
        assert_eq!(decode_ip(&v6).as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn uid_with_tags() {
        let line = parse(
            "@s2s-md/geoip=cc=NL|cd=Netherlands;s2s-md/certfp=abcd;s2s-md/webirc=1 :001 UID bob 0 1700000000 bobu real.host 001AAAAAB 0 +iwx * cloak.host wKgBAQ== :Bob B",
        );
        let user = Unreal.parse_uid(&line, 0).unwrap();
        assert_eq!(user.uid, "001AAAAAB");
        assert_eq!(user.nick, "bob");
        assert_eq!(user.ip, "192.168.1.1");
        assert_eq!(user.vhost, "cloak.host");
        assert_eq!(user.modes, "iwx");
        assert_eq!(user.country.as_deref(), Some("NL"));
        assert_eq!(user.fingerprint.as_deref(), Some("abcd"));
        assert!(user.webirc);
        assert!(!user.websocket);
        assert_eq!(user.account, None);
        assert_eq!(user.connected_at, 1_700_000_000);
    }

    #[test]
    fn uid_with_account_stamp() {
        let line = parse(":001 UID bob 0 1700000000 u h 001AAAAAB bobacct +i * * * :Bob");
        let user = Unreal.parse_uid(&line, 0).unwrap();
        assert_eq!(user.account.as_deref(), Some("bobacct"));
        assert_eq!(user.vhost, "h");
        assert_eq!(user.ip, "");
    }

    #[test]
    fn short_uid_is_rejected() {
        assert!(matches!(
            Unreal.parse_uid(&parse(":001 UID bob 0"), 0),
            Err(HandlerError::NeedMoreParams(_))
        ));
    }

    #[test]
    fn sjoin_members_and_lists() {
        let line = parse(
            ":001 SJOIN 1600000000 #chat +nt :*001AAAAAA @+001AAAAAB 001AAAAAC &*!*@bad <1,x>\"*!*@ok",
        );
        let burst = Unreal.parse_burst_join(&line, &ModeTables::new()).unwrap();
        assert_eq!(burst.channel, "#chat");
        assert_eq!(burst.modes, "nt");
        assert_eq!(
            burst.members,
            vec![
                ("q".to_string(), "001AAAAAA".to_string()),
                ("ov".to_string(), "001AAAAAB".to_string()),
                (String::new(), "001AAAAAC".to_string()),
            ]
        );
    }

    #[test]
    fn protoctl_negotiation() {
        let mut tables = Unreal.initial_modes();
        let line = parse(
            "PROTOCTL EAUTH=irc.example.net,6100,,UnrealIRCd-6.1.0 SID=001 CHANMODES=beI,fkL,lH,cdimnprstz PREFIX=(qaohv)~&@%+",
        );
        let result = Unreal.negotiate(&line, &mut tables);
        assert_eq!(result.uplink_sid.as_deref(), Some("001"));
        assert_eq!(result.revision, Some(6100));
        assert!(tables.is_channel_mode('z'));
        assert!(tables.is_user_mode('x'));
    }

    #[test]
    fn servers() {
        let up = Unreal
            .parse_server(&parse("SERVER irc.example.net 1 :U6100-Fhin6-001 Example hub"), None)
            .unwrap();
        assert_eq!(up.sid, "001");
        assert_eq!(up.description, "Example hub");
        assert!(up.parent.is_none());

        let leaf = Unreal
            .parse_server(&parse(":001 SID leaf.example.net 2 002 :Leaf"), Some("001"))
            .unwrap();
        assert_eq!(leaf.sid, "002");
        assert_eq!(leaf.parent.as_deref(), Some("001"));

        assert!(Unreal.parse_server(&parse("SERVER x 1 :plain"), None).is_err());
    }

    #[test]
    fn sasl_frames() {
        let frame = Unreal
            .parse_sasl(&parse(":irc.example.net SASL services.example.net 001AAAAAB S EXTERNAL abcdef"))
            .unwrap();
        assert_eq!(frame.origin, "irc.example.net");
        assert_eq!(frame.client, "001AAAAAB");
        assert_eq!(frame.mode, 'S');
        assert_eq!(frame.data, "EXTERNAL");
        assert_eq!(frame.ext.as_deref(), Some("abcdef"));
    }

    #[test]
    fn metadata_and_modes() {
        let md = Unreal
            .parse_metadata(&parse(":001 MD client 001AAAAAB certfp :abcdef"))
            .unwrap();
        assert_eq!(md.key, "certfp");
        assert_eq!(md.value, "abcdef");
        assert!(Unreal.parse_metadata(&parse(":001 MD channel #x k :v")).is_none());

        assert_eq!(
            Unreal.parse_user_mode(&parse(":001AAAAAB UMODE2 +x")),
            Some(("001AAAAAB".into(), "+x".into()))
        );
        assert_eq!(Unreal.parse_user_mode(&parse(":001AAAAAB MODE #chan +m")), None);
        assert_eq!(
            Unreal.parse_host(&parse(":001 CHGHOST 001AAAAAB new.host")),
            Some(("001AAAAAB".into(), "new.host".into()))
        );
    }

    #[test]
    fn ban_lines() {
        let me = crate::protocol::tests::identity();
        assert_eq!(
            Unreal.ban_add(&me, BanClass::GLine, "*", "bad.host", 3600, "Svc", "go away", 1000),
            ":9SV TKL + G * bad.host Svc 4600 1000 :go away"
        );
        assert_eq!(
            Unreal.ban_remove(&me, BanClass::KLine, "*", "bad.host", "Svc"),
            ":9SV TKL - k * bad.host Svc"
        );
    }

    #[test]
    fn introduction_encodes_ip() {
        let me = crate::protocol::tests::identity();
        let line = Unreal.introduce_user(&me, &Introduction::service(&me, 1234));
        assert_eq!(
            line,
            ":9SV UID Svc 1 1234 services services.example.net 9SVAAAAAA 0 +ioS services.example.net services.example.net * :Network Services"
        );
    }
}
