//! In-band operator commands.
//!
//! A command reaches the service as `<prefix><name> <args>` in a channel or
//! as a private message (prefix optional). Each one is looked up in the
//! [`CommandTable`], authorized against the sender's admin session,
//! logged, run by the core when the core owns it, and then shown to every
//! loaded module in load order.
//!
//! - [`table`]: the level table shared with modules
//! - [`builtin`]: the core command set

mod builtin;
mod table;

pub use table::{
    CORE_COMMANDS, CommandEntry, CommandSpec, CommandTable, MAX_LEVEL, NOT_ALLOWED, Owner,
};

use crate::error::HandlerResult;
use crate::protocol::ChatMessage;
use crate::session::Services;
use std::sync::Arc;
use tracing::{debug, warn};

/// One parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub uid: String,
    pub nick: String,
    /// Channel or service the command was sent to.
    pub target: String,
    /// Sent as a private message to the service.
    pub private: bool,
    /// Lowercased command name, or [`NOT_ALLOWED`] after a denial.
    pub command: String,
    pub args: Vec<String>,
    /// The sender's admin level; `None` when not authenticated.
    pub level: Option<u8>,
}

impl Invocation {
    /// Parse chat text. `None` when the text is not a command.
    pub fn parse(message: &ChatMessage, prefix: &str, private: bool) -> Option<Self> {
        let text = message.text.trim();
        let body = match text.strip_prefix(prefix) {
            Some(rest) if !prefix.is_empty() => rest,
            _ if private => text,
            _ => return None,
        };
        let mut words = body.split_whitespace();
        let command = words.next()?.to_ascii_lowercase();
        Some(Self {
            uid: message.sender.uid.clone(),
            nick: message.sender.nick.clone(),
            target: message.target.clone(),
            private,
            command,
            args: words.map(String::from).collect(),
            level: None,
        })
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Arguments from `index` on, space joined.
    pub fn rest(&self, index: usize) -> String {
        self.args.get(index..).map(|a| a.join(" ")).unwrap_or_default()
    }

    pub fn is(&self, name: &str) -> bool {
        self.command.eq_ignore_ascii_case(name)
    }
}

/// Route a chat message that may carry a command.
pub async fn dispatch(svc: &Arc<Services>, message: &ChatMessage) -> HandlerResult {
    let private = svc.is_service(&message.target);
    if !private && !message.target.starts_with('#') {
        return Ok(());
    }
    let prefix = svc.config().service.prefix.clone();
    let Some(mut inv) = Invocation::parse(message, &prefix, private) else {
        return Ok(());
    };
    inv.level = svc
        .matrix
        .lock()
        .admins
        .get(&inv.uid)
        .map(|admin| admin.level);

    let entry = svc.commands.read().get(&inv.command).copied();
    let Some(entry) = entry else {
        if private {
            svc.notice(
                &inv.uid,
                &format!("Unknown command \x02{}\x02. Try \x02help\x02.", inv.command),
            );
        }
        return Ok(());
    };

    if !entry.allows(inv.level) {
        warn!(
            uid = %inv.uid,
            nick = %inv.nick,
            command = %inv.command,
            level = ?inv.level,
            required = entry.level(),
            "command denied"
        );
        let requested = std::mem::replace(&mut inv.command, NOT_ALLOWED.to_string());
        builtin::not_allowed(svc, &inv, &requested, entry.level());
        return Ok(());
    }

    if !private && !entry.spec.secret_args.is_empty() {
        svc.notice(
            &inv.uid,
            &format!("\x02{}\x02 carries a secret; send it to me privately.", inv.command),
        );
        return Ok(());
    }

    debug!(uid = %inv.uid, nick = %inv.nick, command = %inv.command, "command");
    svc.db
        .logs()
        .command(
            &inv.uid,
            &inv.nick,
            inv.level.unwrap_or(0),
            &inv.command,
            &entry.masked_args(&inv.args),
            &inv.target,
        )
        .await?;

    if entry.owner == Owner::Core
        && let Err(e) = builtin::execute(svc, &inv).await
    {
        warn!(command = %inv.command, error = %e, "command failed");
        svc.notice(&inv.uid, &format!("\x02{}\x02 failed: {e}", inv.command));
    }

    svc.modules.broadcast_command(svc, &inv).await;
    Ok(())
}

/// Reply to the sender of `inv`.
pub fn reply(svc: &Services, inv: &Invocation, text: &str) {
    svc.notice(&inv.uid, text);
}
