//! The core command set.
//!
//! Replies go to the sender by notice. Errors bubble up as `anyhow` and are
//! reported to the sender by the dispatcher.

mod access;
mod auth;
mod control;
mod show;

use super::{Invocation, reply};
use crate::session::Services;
use std::sync::Arc;

pub(super) async fn execute(svc: &Arc<Services>, inv: &Invocation) -> anyhow::Result<()> {
    match inv.command.as_str() {
        "help" => show::help(svc, inv),
        "auth" => auth::auth(svc, inv).await?,
        "firstauth" => auth::firstauth(svc, inv).await?,
        "deauth" => auth::deauth(svc, inv).await?,
        "register" => auth::register(svc, inv).await?,
        "identify" => auth::identify(svc, inv).await?,
        "logout" => auth::logout(svc, inv),
        "addaccess" => access::addaccess(svc, inv).await?,
        "editaccess" => access::editaccess(svc, inv).await?,
        "delaccess" => access::delaccess(svc, inv).await?,
        "cert" => access::cert(svc, inv).await?,
        "load" | "unload" | "reload" => control::module(svc, inv).await?,
        "join" => control::join(svc, inv).await?,
        "part" => control::part(svc, inv).await?,
        "rehash" => control::rehash(svc, inv).await,
        "restart" => control::restart(svc, inv),
        "quit" => control::quit(svc, inv),
        "raw" => control::raw(svc, inv),
        "show_modules" => show::modules(svc, inv),
        "show_channels" => show::channels(svc, inv),
        "show_users" => show::users(svc, inv),
        "show_timers" | "show_threads" => show::tasks(svc, inv),
        "show_admins" => show::admins(svc, inv).await?,
        "show_clients" => show::clients(svc, inv).await?,
        "show_config" => show::config(svc, inv),
        other => tracing::debug!(command = %other, "no core handler"),
    }
    Ok(())
}

/// The reply a denied invocation is rewritten into.
pub(super) fn not_allowed(svc: &Services, inv: &Invocation, requested: &str, required: u8) {
    let held = match inv.level {
        Some(level) => format!("you hold level {level}"),
        None => "you are not authenticated".to_string(),
    };
    reply(
        svc,
        inv,
        &format!("Access denied: \x02{requested}\x02 needs level {required}, {held}."),
    );
}

/// Reply with usage for the running command.
fn usage(svc: &Services, inv: &Invocation) {
    let table = svc.commands.read();
    let help = table.get(&inv.command).map(|e| e.spec.help).unwrap_or_default();
    drop(table);
    reply(svc, inv, &format!("Usage: \x02{help}\x02"));
}
