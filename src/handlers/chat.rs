//! Chat addressed to the service or its channels.

use super::WireHandler;
use crate::commands;
use crate::error::HandlerResult;
use crate::session::Services;
use async_trait::async_trait;
use slsvc_proto::Line;
use slsvc_proto::ctcp::{self, Ctcp};
use std::sync::Arc;
use tracing::{debug, trace};

/// `PRIVMSG`: CTCP queries to the service, otherwise a possible command.
pub struct PrivmsgHandler;

#[async_trait]
impl WireHandler for PrivmsgHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let message = {
            let regs = svc.matrix.lock();
            svc.protocol.parse_privmsg(line, &regs)
        };
        let Some(message) = message else {
            trace!(source = ?line.source_name(), "privmsg from unknown sender");
            return Ok(());
        };

        if let Some(query) = Ctcp::parse(&message.text) {
            if svc.is_service(&message.target) {
                if let Some(body) = ctcp_reply(&query) {
                    debug!(nick = %message.sender.nick, verb = %query.verb, "ctcp reply");
                    svc.notice(&message.sender.uid, &ctcp::reply(&query.verb, &body));
                }
            }
            return Ok(());
        }

        commands::dispatch(svc, &message).await
    }
}

fn ctcp_reply(query: &Ctcp<'_>) -> Option<String> {
    match query.verb.as_str() {
        "VERSION" => Some(format!("slsvcd {}", env!("CARGO_PKG_VERSION"))),
        "TIME" => Some(chrono::Local::now().to_rfc2822()),
        "PING" => Some(query.params.unwrap_or_default().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_known_ctcp_verbs() {
        let ping = Ctcp::parse("\x01PING 42\x01").unwrap();
        assert_eq!(ctcp_reply(&ping).as_deref(), Some("42"));

        let version = Ctcp::parse("\x01VERSION\x01").unwrap();
        assert!(ctcp_reply(&version).unwrap().starts_with("slsvcd "));

        let action = Ctcp::parse("\x01ACTION waves\x01").unwrap();
        assert_eq!(ctcp_reply(&action), None);
    }
}
