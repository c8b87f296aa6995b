//! Inbound wire handlers.
//!
//! The active dialect binds each command it knows to one of these handlers
//! (see [`Protocol::register_commands`](crate::protocol::Protocol::register_commands)).
//! A handler error is logged against that line only; the session continues
//! unless the error says the uplink rejected us.

mod channels;
mod chat;
mod link;
mod sasl;
mod users;

pub use channels::{BurstJoinHandler, JoinHandler, KickHandler, PartHandler};
pub use chat::PrivmsgHandler;
pub use link::{
    BurstStartHandler, CapabilityHandler, EndBurstHandler, ErrorHandler, PassHandler, PingHandler,
    ServerHandler, SquitHandler,
};
pub use sasl::{EncapHandler, SaslHandler};
pub use users::{
    HostHandler, KillHandler, MetadataHandler, NickHandler, QuitHandler, ReputationHandler,
    UidHandler, UserModeHandler,
};
pub(crate) use users::{bind_admin, login_by_fingerprint};

use crate::error::{HandlerResult, SessionError};
use crate::session::Services;
use async_trait::async_trait;
use slsvc_proto::Line;
use slsvc_proto::line::tokens;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Handles one inbound wire command.
#[async_trait]
pub trait WireHandler: Send + Sync {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult;
}

/// Wire command → handler, filled by the active dialect.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<&'static str, Box<dyn WireHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: WireHandler + 'static>(&mut self, command: &'static str, handler: H) {
        self.handlers.insert(command, Box::new(handler));
    }

    pub fn get(&self, command: &str) -> Option<&dyn WireHandler> {
        self.handlers.get(command).map(|h| h.as_ref())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Route one raw inbound line: locate the command, run its handler, then
/// show the line to every loaded module.
///
/// Only a rejected link is returned as an error; everything else is logged.
pub async fn dispatch(svc: &Arc<Services>, raw: &str) -> Result<(), SessionError> {
    let located = svc.protocol.locate_command(&tokens(raw));
    let line = match Line::parse(raw) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, line = %raw, "unparseable line");
            return Ok(());
        }
    };

    match located.and_then(|(_, command)| svc.handlers().get(command).map(|h| (command, h))) {
        Some((command, handler)) => {
            if let Err(err) = handler.handle(svc, &line).await {
                if err.is_fatal() {
                    return Err(SessionError::LinkRejected(err.to_string()));
                }
                warn!(
                    command,
                    code = err.error_code(),
                    error = %err,
                    line = %raw,
                    "handler failed"
                );
            }
        }
        None => trace!(command = %line.command, "no handler"),
    }

    svc.modules.on_line(svc, &line).await;
    Ok(())
}
