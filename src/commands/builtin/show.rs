//! Introspection commands.

use crate::commands::{Invocation, reply};
use crate::config::describe;
use crate::modules::CATALOG;
use crate::session::{Services, TaskKind};
use std::sync::Arc;

/// Longest listing sent back in one reply.
const LIST_LIMIT: usize = 50;

pub(super) fn help(svc: &Arc<Services>, inv: &Invocation) {
    let table = svc.commands.read();
    if let Some(name) = inv.arg(0) {
        let text = match table.get(name) {
            Some(entry) if entry.allows(inv.level) => {
                format!("\x02{}\x02 (level {})", entry.spec.help, entry.level())
            }
            _ => format!("No help for \x02{name}\x02."),
        };
        drop(table);
        reply(svc, inv, &text);
        return;
    }

    let lines: Vec<String> = (0..=inv.level.unwrap_or(0))
        .filter_map(|level| {
            let names: Vec<&str> = table
                .visible_to(inv.level)
                .into_iter()
                .filter(|e| e.level() == level)
                .map(|e| e.name())
                .collect();
            (!names.is_empty()).then(|| format!("Level {level}: {}", names.join(", ")))
        })
        .collect();
    drop(table);
    for line in lines {
        reply(svc, inv, &line);
    }
}

pub(super) fn modules(svc: &Arc<Services>, inv: &Invocation) {
    let loaded = svc.modules.names();
    reply(
        svc,
        inv,
        &format!(
            "Loaded ({}): {}",
            loaded.len(),
            if loaded.is_empty() { "none".to_string() } else { loaded.join(", ") }
        ),
    );
    reply(svc, inv, &format!("Available: {}", CATALOG.join(", ")));
}

pub(super) fn channels(svc: &Arc<Services>, inv: &Invocation) {
    let (total, lines) = {
        let regs = svc.matrix.lock();
        let mut lines: Vec<String> = regs
            .channels
            .iter()
            .map(|c| format!("{} ({} members)", c.name, c.members.len()))
            .collect();
        lines.sort();
        (regs.channels.len(), lines)
    };
    send_list(svc, inv, "channels", total, lines);
}

pub(super) fn users(svc: &Arc<Services>, inv: &Invocation) {
    let (total, lines) = {
        let regs = svc.matrix.lock();
        let mut lines: Vec<String> = regs
            .users
            .iter()
            .map(|u| format!("{} {} [{}] rep {}", u.uid, u.mask(), u.ip, u.reputation))
            .collect();
        lines.sort();
        (regs.users.len(), lines)
    };
    send_list(svc, inv, "users", total, lines);
}

/// `show_timers` / `show_threads`.
pub(super) fn tasks(svc: &Arc<Services>, inv: &Invocation) {
    let (kind, label) = if inv.is("show_timers") {
        (TaskKind::Timer, "timers")
    } else {
        (TaskKind::Worker, "workers")
    };
    let now = crate::session::now();
    let lines: Vec<String> = svc
        .tasks
        .list(kind)
        .into_iter()
        .map(|t| {
            let state = if t.finished { "finished" } else { "running" };
            format!("{} ({state}, {}s)", t.name, now - t.started_at)
        })
        .collect();
    send_list(svc, inv, label, lines.len(), lines);
}

pub(super) async fn admins(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let online: Vec<String> = {
        let regs = svc.matrix.lock();
        regs.admins
            .iter()
            .map(|a| format!("{} as {} (level {})", a.nick, a.account, a.level))
            .collect()
    };
    send_list(svc, inv, "admins online", online.len(), online);

    let stored: Vec<String> = svc
        .db
        .admins()
        .list()
        .await?
        .into_iter()
        .map(|r| {
            let cert = if r.fingerprint.is_some() { ", cert" } else { "" };
            format!("{} (level {}{cert})", r.name, r.level)
        })
        .collect();
    send_list(svc, inv, "admin records", stored.len(), stored);
    Ok(())
}

pub(super) async fn clients(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let online: Vec<String> = {
        let regs = svc.matrix.lock();
        regs.clients
            .iter()
            .map(|c| format!("{} as {} ({}@{})", c.nick, c.account, c.username, c.hostname))
            .collect()
    };
    send_list(svc, inv, "clients online", online.len(), online);
    let registered = svc.db.clients().count().await?;
    reply(svc, inv, &format!("{registered} registered account(s)."));
    Ok(())
}

pub(super) fn config(svc: &Arc<Services>, inv: &Invocation) {
    let config = svc.config();
    for (path, value) in describe(&config) {
        reply(svc, inv, &format!("{path} = {value}"));
    }
}

fn send_list(svc: &Services, inv: &Invocation, label: &str, total: usize, lines: Vec<String>) {
    reply(svc, inv, &format!("{total} {label}"));
    for line in lines.iter().take(LIST_LIMIT) {
        reply(svc, inv, line);
    }
    if lines.len() > LIST_LIMIT {
        reply(svc, inv, &format!("... and {} more", lines.len() - LIST_LIMIT));
    }
}
