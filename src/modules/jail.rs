//! Reputation sanctions.
//!
//! A user introduced after the burst with a reputation at or below the
//! threshold is force-joined to the jail channel and handed a release code.
//! Sending `code <secret>` to the service releases them; an admin can
//! release anyone. Each sanction arms a one-shot timer that kills the user
//! if they are still jailed after `timeout_secs`.

use super::{CommandHandler, Module};
use crate::commands::{CommandSpec, Invocation, reply};
use crate::security::{secret_code, secrets_match};
use crate::session::{Services, now};
use crate::state::Reputation;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use slsvc_proto::{Line, irc_eq};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const NAME: &str = "jail";
const CODE_LENGTH: usize = 8;

const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("code", 0, "code <secret>").secret(&[0]),
    CommandSpec::new("jail", 2, "jail <release <nick> | list>"),
];

#[derive(Debug, Clone)]
struct Settings {
    threshold: i32,
    channel: String,
    timeout_secs: i64,
    enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: 0,
            channel: "#jail".to_string(),
            timeout_secs: 600,
            enabled: true,
        }
    }
}

pub struct JailModule {
    settings: Mutex<Settings>,
}

impl Default for JailModule {
    fn default() -> Self {
        Self::new()
    }
}

impl JailModule {
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(Settings::default()),
        }
    }

    fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    /// Sanction `uid` if its reputation calls for it.
    fn screen(&self, svc: &Arc<Services>, uid: &str) {
        let settings = self.settings();
        if !settings.enabled {
            return;
        }
        let me = svc.identity();
        let code = secret_code(CODE_LENGTH);
        let jailed = {
            let mut regs = svc.matrix.lock();
            let Some(user) = regs.users.get(uid) else {
                return;
            };
            if user.server() == me.sid
                || user.account.is_some()
                || user.reputation > settings.threshold
                || regs.admins.exists(uid)
                || regs.reputations.exists(uid)
            {
                return;
            }
            let record = Reputation {
                user: user.clone(),
                code: code.clone(),
                jailed_at: now(),
            };
            let nick = record.user.nick.clone();
            let score = record.user.reputation;
            regs.reputations.insert(record).then_some((nick, score))
        };
        let Some((nick, score)) = jailed else {
            return;
        };

        info!(uid = %uid, nick = %nick, score, "user jailed");
        svc.force_join(uid, &settings.channel, None);
        svc.notice(
            uid,
            &format!(
                "Your connection needs verification. Type \x02/msg {} code {code}\x02 to continue.",
                me.service_nick
            ),
        );
        svc.announce(&format!("Jailed {nick} (reputation {score})"));

        if settings.timeout_secs > 0 {
            let worker = Arc::clone(svc);
            let uid = uid.to_string();
            let delay = Duration::from_secs(settings.timeout_secs.unsigned_abs());
            svc.tasks.spawn_timer(format!("jail-{uid}"), delay, async move {
                if worker.tasks.is_running() && expire(&worker, &uid, &code) {
                    worker.announce(&format!("Killed unverified user {uid}"));
                }
            });
        }
    }

    fn code(&self, svc: &Services, inv: &Invocation) {
        let Some(given) = inv.arg(0) else {
            reply(svc, inv, "Usage: \x02code <secret>\x02");
            return;
        };
        let expected = svc
            .matrix
            .lock()
            .reputations
            .get(&inv.uid)
            .map(|r| r.code.clone());
        match expected {
            None => reply(svc, inv, "There is nothing to release you from."),
            Some(code) if secrets_match(given, &code) => {
                release(svc, &self.settings().channel, &inv.uid, "Verified");
                reply(svc, inv, "Thank you, you are free to go.");
            }
            Some(_) => {
                debug!(uid = %inv.uid, "wrong release code");
                reply(svc, inv, "That code is not right.");
            }
        }
    }

    fn jail(&self, svc: &Services, inv: &Invocation) -> anyhow::Result<()> {
        let channel = self.settings().channel;
        match inv.arg(0).map(str::to_ascii_lowercase).as_deref() {
            Some("release") => {
                let nick = inv.arg(1).context("usage: jail release <nick>")?;
                let uid = svc
                    .matrix
                    .lock()
                    .reputations
                    .get(nick)
                    .map(|r| r.user.uid.clone());
                let Some(uid) = uid else {
                    reply(svc, inv, &format!("\x02{nick}\x02 is not jailed."));
                    return Ok(());
                };
                release(svc, &channel, &uid, &format!("Released by {}", inv.nick));
                reply(svc, inv, &format!("Released \x02{nick}\x02."));
                svc.announce(&format!("{} released {nick}", inv.nick));
            }
            Some("list") => {
                let now = now();
                let mut lines: Vec<String> = svc
                    .matrix
                    .lock()
                    .reputations
                    .iter()
                    .map(|r| {
                        format!(
                            "{} [{}] rep {} for {}s",
                            r.user.nick,
                            r.user.ip,
                            r.user.reputation,
                            now - r.jailed_at
                        )
                    })
                    .collect();
                lines.sort();
                reply(svc, inv, &format!("{} jailed", lines.len()));
                for line in lines {
                    reply(svc, inv, &line);
                }
            }
            _ => reply(svc, inv, &format!("Usage: \x02{}\x02", COMMANDS[1].help)),
        }
        Ok(())
    }
}

/// Drop the record for `uid` and let it out of the jail channel.
fn release(svc: &Services, channel: &str, uid: &str, reason: &str) -> bool {
    let released = svc.matrix.lock().reputations.remove(uid).is_some();
    if released {
        svc.force_part(uid, channel, Some(reason));
        info!(uid = %uid, reason = %reason, "user released");
    }
    released
}

/// Kill `uid` if it is still held under the sanction that issued `code`.
/// A record from a later jailing carries a different code and is left alone.
fn expire(svc: &Services, uid: &str, code: &str) -> bool {
    let held = svc
        .matrix
        .lock()
        .reputations
        .get(uid)
        .is_some_and(|r| r.user.uid == uid && r.code == code);
    if !held {
        return false;
    }
    let departure = svc.kill(uid, "Verification timed out");
    if let Some(user) = departure.user {
        info!(uid = %uid, nick = %user.nick, "jailed user timed out");
    }
    true
}

#[async_trait]
impl CommandHandler for JailModule {
    async fn cmd(&self, svc: &Arc<Services>, line: &Line) -> anyhow::Result<()> {
        if !line.command.eq_ignore_ascii_case("UID") || !svc.burst_complete() {
            return Ok(());
        }
        // The UID sits at a different position in each dialect.
        let user = svc.protocol.parse_uid(line, now())?;
        self.screen(svc, &user.uid);
        Ok(())
    }

    async fn hcmds(&self, svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
        if inv.is("code") {
            self.code(svc, inv);
        } else if inv.is("jail") {
            if let Err(e) = self.jail(svc, inv) {
                reply(svc, inv, &e.to_string());
                return Err(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Module for JailModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn commands(&self) -> &'static [CommandSpec] {
        COMMANDS
    }

    fn config_fields(&self) -> Vec<(&'static str, String)> {
        let s = Settings::default();
        vec![
            ("threshold", s.threshold.to_string()),
            ("jail_channel", s.channel),
            ("timeout_secs", s.timeout_secs.to_string()),
            ("enabled", s.enabled.to_string()),
        ]
    }

    async fn on_load(&self, svc: &Arc<Services>, config: BTreeMap<String, String>) -> anyhow::Result<()> {
        let mut settings = Settings::default();
        if let Some(v) = config.get("threshold") {
            settings.threshold = v.parse().with_context(|| format!("bad threshold: {v}"))?;
        }
        if let Some(v) = config.get("jail_channel") {
            if !v.starts_with('#') {
                anyhow::bail!("jail_channel must start with #: {v}");
            }
            settings.channel = v.clone();
        }
        if let Some(v) = config.get("timeout_secs") {
            settings.timeout_secs = v.parse().with_context(|| format!("bad timeout_secs: {v}"))?;
        }
        if let Some(v) = config.get("enabled") {
            settings.enabled = v.parse().with_context(|| format!("bad enabled flag: {v}"))?;
        }
        *self.settings.lock() = settings.clone();

        let me = svc.identity();
        if !svc.matrix.lock().channels.is_member(&settings.channel, &me.service_uid) {
            svc.join(&me.service_uid, &settings.channel, None);
        }
        svc.db.channels().assign(&settings.channel, NAME, NAME).await?;
        info!(channel = %settings.channel, threshold = settings.threshold, "jail armed");
        Ok(())
    }

    async fn unload(&self, svc: &Arc<Services>) {
        let channel = self.settings().channel;
        let uids: Vec<String> = svc.matrix.lock().reputations.keys().map(String::from).collect();
        for uid in &uids {
            release(svc, &channel, uid, "Jail closed");
        }

        let me = svc.identity();
        if !irc_eq(&channel, &me.log_channel) {
            svc.part(&me.service_uid, &channel, Some("Jail closed"));
        }
        if let Err(e) = svc.db.channels().unassign(&channel, NAME).await {
            warn!(channel = %channel, error = %e, "could not drop jail channel assignment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dialect;
    use crate::handlers;
    use crate::session::TaskKind;
    use crate::session::testing::{drain, services};

    const INSP_MALLORY: &str = ":001 UID 001AAAAAB 1700000000 mallory host.example.org cloak.example.org mallory 198.51.100.7 1700000000 +i :Mallory";
    // 198.51.100.7 in network byte order, base64.
    const UNREAL_MALLORY: &str = ":001 UID mallory 0 1700000000 mallory host.example.org 001AAAAAB 0 +i * * xjNkBw== :Mallory";

    fn invocation(uid: &str, nick: &str, command: &str, args: &[&str]) -> Invocation {
        Invocation {
            uid: uid.into(),
            nick: nick.into(),
            target: "Svc".into(),
            private: true,
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            level: Some(2),
        }
    }

    async fn armed(svc: &Arc<Services>) -> JailModule {
        let module = JailModule::new();
        let config = BTreeMap::from([("timeout_secs".to_string(), "0".to_string())]);
        module.on_load(svc, config).await.unwrap();
        svc.link.lock().burst_complete = true;
        module
    }

    /// Run `raw` through the core handlers, then show it to the module,
    /// in the order a loaded module sees it.
    async fn introduce(svc: &Arc<Services>, module: &JailModule, raw: &str, score: i32) {
        svc.scores.insert("198.51.100.7".into(), score);
        handlers::dispatch(svc, raw).await.unwrap();
        module.cmd(svc, &Line::parse(raw).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn low_reputation_is_jailed_and_released_by_code() {
        let (svc, mut rx) = services(Dialect::Inspircd).await;
        let module = armed(&svc).await;
        drain(&mut rx);

        introduce(&svc, &module, INSP_MALLORY, -3).await;
        let code = svc.matrix.lock().reputations.get("mallory").unwrap().code.clone();
        let sent = drain(&mut rx);
        assert!(sent.iter().any(|l| l == ":9SV SVSJOIN 001AAAAAB #jail"));
        assert!(sent.iter().any(|l| l.contains(" NOTICE 001AAAAAB :") && l.contains(&code)));

        let inv = invocation("001AAAAAB", "mallory", "code", &["wrong"]);
        module.hcmds(&svc, &inv).await.unwrap();
        assert!(svc.matrix.lock().reputations.exists("001AAAAAB"));

        let inv = invocation("001AAAAAB", "mallory", "code", &[&code]);
        module.hcmds(&svc, &inv).await.unwrap();
        assert!(!svc.matrix.lock().reputations.exists("001AAAAAB"));
        assert!(drain(&mut rx).iter().any(|l| l.contains("SVSPART 001AAAAAB #jail")));
    }

    #[tokio::test]
    async fn unreal_sanctions_target_the_uid() {
        let (svc, mut rx) = services(Dialect::Unrealircd).await;
        let module = armed(&svc).await;
        drain(&mut rx);

        introduce(&svc, &module, UNREAL_MALLORY, -3).await;
        assert!(svc.matrix.lock().reputations.exists("001AAAAAB"));
        let sent = drain(&mut rx);
        assert!(sent.iter().any(|l| l == ":9SV SVSJOIN 001AAAAAB #jail"));
        assert!(sent.iter().any(|l| l.contains(" NOTICE 001AAAAAB :")));
        assert!(!sent.iter().any(|l| l.contains("mallory #jail") || l.contains("NOTICE mallory")));

        // A rename before release changes nothing about who holds the code.
        handlers::dispatch(&svc, ":001AAAAAB NICK mal 1700000100").await.unwrap();
        let release = invocation("9SVAAAAAB", "root", "jail", &["release", "mal"]);
        module.hcmds(&svc, &release).await.unwrap();
        assert!(svc.matrix.lock().reputations.is_empty());
        assert!(drain(&mut rx).iter().any(|l| l.contains("SVSPART 001AAAAAB #jail")));
    }

    #[tokio::test]
    async fn admins_and_good_scores_pass() {
        let (svc, _rx) = services(Dialect::Inspircd).await;
        let module = armed(&svc).await;
        introduce(&svc, &module, INSP_MALLORY, 5).await;

        let named = ":001 UID 001AAAAAC 1700000000 named host.example.org cloak.example.org named 198.51.100.7 1700000000 +i :Named";
        handlers::dispatch(&svc, named).await.unwrap();
        svc.matrix.lock().users.get_mut("named").unwrap().account = Some("named".into());
        module.cmd(&svc, &Line::parse(named).unwrap()).await.unwrap();

        assert!(svc.matrix.lock().reputations.is_empty());
    }

    #[tokio::test]
    async fn nothing_is_screened_during_the_burst() {
        let (svc, _rx) = services(Dialect::Inspircd).await;
        let module = armed(&svc).await;
        svc.link.lock().burst_complete = false;
        introduce(&svc, &module, INSP_MALLORY, -10).await;
        assert!(svc.matrix.lock().reputations.is_empty());
    }

    #[tokio::test]
    async fn each_sanction_arms_a_timer() {
        let (svc, _rx) = services(Dialect::Inspircd).await;
        let module = JailModule::new();
        let config = BTreeMap::from([("timeout_secs".to_string(), "3600".to_string())]);
        module.on_load(&svc, config).await.unwrap();
        svc.link.lock().burst_complete = true;

        introduce(&svc, &module, INSP_MALLORY, -3).await;
        let timers = svc.tasks.list(TaskKind::Timer);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].name, "jail-001AAAAAB");
        svc.tasks.shutdown();
    }

    #[tokio::test]
    async fn expiry_kills_only_the_same_sanction() {
        let (svc, mut rx) = services(Dialect::Inspircd).await;
        let module = armed(&svc).await;
        introduce(&svc, &module, INSP_MALLORY, 0).await;
        drain(&mut rx);

        assert!(!expire(&svc, "001AAAAAB", "stale-code"));
        assert!(svc.matrix.lock().users.exists("001AAAAAB"));

        let code = svc.matrix.lock().reputations.get("001AAAAAB").unwrap().code.clone();
        assert!(expire(&svc, "001AAAAAB", &code));
        let regs = svc.matrix.lock();
        assert!(!regs.users.exists("001AAAAAB"));
        assert!(regs.reputations.is_empty());
        drop(regs);
        assert!(drain(&mut rx).iter().any(|l| l.contains("KILL 001AAAAAB")));
    }

    #[tokio::test]
    async fn admin_release_and_list() {
        let (svc, mut rx) = services(Dialect::Inspircd).await;
        let module = armed(&svc).await;
        introduce(&svc, &module, INSP_MALLORY, -10).await;
        drain(&mut rx);

        let list = invocation("9SVAAAAAB", "root", "jail", &["list"]);
        module.hcmds(&svc, &list).await.unwrap();
        assert!(drain(&mut rx).iter().any(|l| l.contains("1 jailed")));

        let release = invocation("9SVAAAAAB", "root", "jail", &["release", "mallory"]);
        module.hcmds(&svc, &release).await.unwrap();
        assert!(svc.matrix.lock().reputations.is_empty());
    }
}
