//! Session and module control.

use super::usage;
use crate::commands::{Invocation, reply};
use crate::session::{Control, Services};
use slsvc_proto::casemap::is_channel_name;
use slsvc_proto::irc_eq;
use std::sync::Arc;
use tracing::info;

/// Channel assignments made from chat belong to this owner.
const CORE_OWNER: &str = "core";

/// `load` / `unload` / `reload <module>`.
pub(super) async fn module(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let Some(name) = inv.arg(0).map(str::to_ascii_lowercase) else {
        usage(svc, inv);
        return Ok(());
    };
    let result = match inv.command.as_str() {
        "load" => svc.modules.load(svc, &name, &inv.nick, true).await,
        "unload" => svc.modules.unload(svc, &name).await,
        _ => svc.modules.reload(svc, &name).await,
    };
    match result {
        Ok(()) => {
            let done = match inv.command.as_str() {
                "load" => "loaded",
                "unload" => "unloaded",
                _ => "reloaded",
            };
            svc.db
                .logs()
                .audit(&inv.nick, &format!("module.{}", inv.command), Some(&name))
                .await?;
            reply(svc, inv, &format!("Module \x02{name}\x02 {done}."));
            svc.announce(&format!("{} {done} module {name}", inv.nick));
        }
        Err(e) => reply(svc, inv, &format!("Module \x02{name}\x02: {e}")),
    }
    Ok(())
}

pub(super) async fn join(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let Some(channel) = inv.arg(0).filter(|c| is_channel_name(c)) else {
        usage(svc, inv);
        return Ok(());
    };
    let uid = svc.identity().service_uid;
    if svc.matrix.lock().channels.is_member(channel, &uid) {
        reply(svc, inv, &format!("Already in \x02{channel}\x02."));
        return Ok(());
    }
    svc.join(&uid, channel, inv.arg(1));
    svc.db.channels().assign(channel, CORE_OWNER, &inv.nick).await?;
    reply(svc, inv, &format!("Joined \x02{channel}\x02."));
    Ok(())
}

pub(super) async fn part(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    let Some(channel) = inv.arg(0).filter(|c| is_channel_name(c)) else {
        usage(svc, inv);
        return Ok(());
    };
    let me = svc.identity();
    if irc_eq(channel, &me.log_channel) {
        reply(svc, inv, "The log channel is set in the configuration.");
        return Ok(());
    }
    svc.part(&me.service_uid, channel, Some(&format!("Requested by {}", inv.nick)));
    svc.db.channels().unassign(channel, CORE_OWNER).await?;
    reply(svc, inv, &format!("Left \x02{channel}\x02."));
    Ok(())
}

pub(super) async fn rehash(svc: &Arc<Services>, inv: &Invocation) {
    match svc.rehash().await {
        Ok(report) => {
            let mut text = format!("Rehash complete: {} change(s)", report.changes.len());
            if !report.reloaded.is_empty() {
                text.push_str(&format!(", reloaded {}", report.reloaded.join(", ")));
            }
            if report.restart_required {
                text.push_str("; some changes apply after a restart");
            }
            reply(svc, inv, &text);
        }
        Err(e) => reply(svc, inv, &format!("Rehash failed: {e}")),
    }
}

pub(super) fn restart(svc: &Arc<Services>, inv: &Invocation) {
    let reason = reason_or(inv, "Restarting");
    info!(by = %inv.nick, reason = %reason, "restart requested");
    svc.announce(&format!("Restart requested by {}: {reason}", inv.nick));
    svc.request(Control::Restart(reason));
}

pub(super) fn quit(svc: &Arc<Services>, inv: &Invocation) {
    let reason = reason_or(inv, "Shutting down");
    info!(by = %inv.nick, reason = %reason, "shutdown requested");
    svc.announce(&format!("Shutdown requested by {}: {reason}", inv.nick));
    svc.request(Control::Shutdown(reason));
}

pub(super) fn raw(svc: &Arc<Services>, inv: &Invocation) {
    let line = inv.rest(0);
    if line.is_empty() {
        usage(svc, inv);
        return;
    }
    info!(by = %inv.nick, line = %line, "raw line");
    svc.raw(&line);
}

fn reason_or(inv: &Invocation, default: &str) -> String {
    let reason = inv.rest(0);
    if reason.is_empty() {
        default.to_string()
    } else {
        reason
    }
}
