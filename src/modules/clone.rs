//! Clone-army simulator.
//!
//! Introduces synthetic users in named groups and moves them around, which
//! is how an operator rehearses flood handling. Joins are staggered through
//! the deferred queue so a large group does not land in one burst.

use super::{CommandHandler, Module};
use crate::commands::{CommandSpec, Invocation, reply};
use crate::protocol::Introduction;
use crate::session::{Services, now};
use crate::state::{CloneUser, generate_clone};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use slsvc_proto::casemap::is_channel_name;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const COMMANDS: &[CommandSpec] = &[CommandSpec::new(
    "clone",
    3,
    "clone <connect <count> [group] | kill <group|all> | join <group|all> <#chan> | part <group|all> <#chan> | list>",
)];

const DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone)]
struct Settings {
    max_clones: usize,
    vhost_suffix: String,
}

pub struct CloneModule {
    settings: Mutex<Settings>,
}

impl Default for CloneModule {
    fn default() -> Self {
        Self::new()
    }
}

impl CloneModule {
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(Settings {
                max_clones: 50,
                vhost_suffix: "clones.invalid".to_string(),
            }),
        }
    }

    fn connect(&self, svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
        let count: usize = inv
            .arg(1)
            .context("usage: clone connect <count> [group]")?
            .parse()
            .context("count must be a number")?;
        let group = inv.arg(2).unwrap_or(DEFAULT_GROUP);
        let settings = self.settings.lock().clone();

        let created: Vec<CloneUser> = {
            let mut regs = svc.matrix.lock();
            let live = regs.clones.iter().filter(|c| c.connected).count();
            let room = settings.max_clones.saturating_sub(live);
            let mut created = Vec::new();
            for _ in 0..count.min(room) {
                let Some(mut clone) =
                    generate_clone(&regs, &svc.uids, group, &settings.vhost_suffix)
                else {
                    break;
                };
                clone.connected = true;
                regs.clones.remove(&clone.uid);
                if regs.clones.insert(clone.clone()) {
                    created.push(clone);
                }
            }
            created
        };

        let ts = now();
        for clone in &created {
            svc.introduce(&Introduction {
                uid: &clone.uid,
                nick: &clone.nick,
                user: &clone.username,
                host: &clone.vhost,
                vhost: &clone.vhost,
                ip: &clone.ip,
                modes: &clone.modes,
                realname: &clone.realname,
                ts,
            });
        }
        info!(group = %group, requested = count, created = created.len(), "clones connected");
        reply(
            svc,
            inv,
            &format!(
                "Connected {} of {count} clone(s) in \x02{group}\x02 (limit {}).",
                created.len(),
                settings.max_clones
            ),
        );
        Ok(())
    }

    fn kill(&self, svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
        let group = inv.arg(1).context("usage: clone kill <group|all>")?;
        let killed = kill_group(svc, group, &format!("Killed by {}", inv.nick));
        reply(svc, inv, &format!("Killed {killed} clone(s)."));
        Ok(())
    }

    fn join(&self, svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
        let (group, channel) = group_and_channel(inv)?;
        let uids = members(svc, group);
        for uid in &uids {
            let uid = uid.clone();
            let channel = channel.to_string();
            svc.deferred.push(format!("clone-join {uid} {channel}"), move |svc| {
                let joined = {
                    let mut regs = svc.matrix.lock();
                    match regs.clones.get_mut(&uid) {
                        Some(clone) if clone.connected => {
                            clone.channels.push(channel.clone());
                            true
                        }
                        _ => false,
                    }
                };
                if joined {
                    svc.join(&uid, &channel, None);
                }
            });
        }
        reply(
            svc,
            inv,
            &format!("{} clone(s) queued to join \x02{channel}\x02.", uids.len()),
        );
        Ok(())
    }

    fn part(&self, svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
        let (group, channel) = group_and_channel(inv)?;
        let uids = members(svc, group);
        for uid in &uids {
            if let Some(clone) = svc.matrix.lock().clones.get_mut(uid) {
                clone.channels.retain(|c| !slsvc_proto::irc_eq(c, channel));
            }
            svc.part(uid, channel, None);
        }
        reply(svc, inv, &format!("{} clone(s) left \x02{channel}\x02.", uids.len()));
        Ok(())
    }

    fn list(&self, svc: &Arc<Services>, inv: &Invocation) {
        let groups: BTreeMap<String, (usize, usize)> = {
            let regs = svc.matrix.lock();
            let mut groups: BTreeMap<String, (usize, usize)> = BTreeMap::new();
            for clone in regs.clones.iter() {
                let entry = groups.entry(clone.group.clone()).or_default();
                entry.0 += 1;
                if clone.connected {
                    entry.1 += 1;
                }
            }
            groups
        };
        if groups.is_empty() {
            reply(svc, inv, "No clones.");
            return;
        }
        for (group, (total, connected)) in groups {
            reply(svc, inv, &format!("\x02{group}\x02: {connected}/{total} connected"));
        }
    }
}

fn group_and_channel(inv: &Invocation) -> anyhow::Result<(&str, &str)> {
    let group = inv.arg(1).context("usage: clone join|part <group|all> <#chan>")?;
    let channel = inv
        .arg(2)
        .filter(|c| is_channel_name(c))
        .context("a channel name starting with # is required")?;
    Ok((group, channel))
}

/// UIDs of connected clones in `group` (`all` for every group).
fn members(svc: &Services, group: &str) -> Vec<String> {
    svc.matrix
        .lock()
        .clones
        .iter()
        .filter(|c| c.connected && (group == "all" || c.group == group))
        .map(|c| c.uid.clone())
        .collect()
}

/// Quit and forget every clone in `group`. Returns how many were live.
fn kill_group(svc: &Services, group: &str, reason: &str) -> usize {
    let uids = members(svc, group);
    for uid in &uids {
        svc.quit(uid, reason);
    }
    svc.matrix
        .lock()
        .clones
        .drain_where(|c| group == "all" || c.group == group);
    debug!(group = %group, killed = uids.len(), "clones killed");
    uids.len()
}

#[async_trait]
impl CommandHandler for CloneModule {
    async fn hcmds(&self, svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
        if !inv.is("clone") {
            return Ok(());
        }
        let sub = inv.arg(0).map(str::to_ascii_lowercase).unwrap_or_default();
        let result = match sub.as_str() {
            "connect" => self.connect(svc, inv),
            "kill" => self.kill(svc, inv),
            "join" => self.join(svc, inv),
            "part" => self.part(svc, inv),
            "list" => {
                self.list(svc, inv);
                Ok(())
            }
            _ => {
                reply(svc, inv, &format!("Usage: \x02{}\x02", COMMANDS[0].help));
                Ok(())
            }
        };
        if let Err(e) = &result {
            reply(svc, inv, &e.to_string());
        }
        result
    }
}

#[async_trait]
impl Module for CloneModule {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        COMMANDS
    }

    fn config_fields(&self) -> Vec<(&'static str, String)> {
        let s = self.settings.lock();
        vec![
            ("max_clones", s.max_clones.to_string()),
            ("vhost_suffix", s.vhost_suffix.clone()),
        ]
    }

    async fn on_load(&self, _svc: &Arc<Services>, config: BTreeMap<String, String>) -> anyhow::Result<()> {
        let mut settings = self.settings.lock();
        if let Some(max) = config.get("max_clones") {
            settings.max_clones = max
                .parse()
                .with_context(|| format!("max_clones is not a number: {max}"))?;
        }
        if let Some(suffix) = config.get("vhost_suffix") {
            settings.vhost_suffix = suffix.clone();
        }
        Ok(())
    }

    async fn unload(&self, svc: &Arc<Services>) {
        let killed = kill_group(svc, "all", "Clone module unloaded");
        if killed > 0 {
            info!(killed, "clones removed on unload");
        }
    }
}
