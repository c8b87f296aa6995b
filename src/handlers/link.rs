//! Link-level commands: keepalive, negotiation, topology, burst markers.

use super::WireHandler;
use crate::error::{HandlerError, HandlerResult};
use crate::security::secrets_match;
use crate::session::{Services, SessionState};
use async_trait::async_trait;
use slsvc_proto::Line;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct PingHandler;

#[async_trait]
impl WireHandler for PingHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let me = svc.identity();
        if let Some(pong) = svc.protocol.pong(&me, line) {
            svc.send(pong);
        }
        Ok(())
    }
}

/// Checks the password the uplink presents.
pub struct PassHandler;

#[async_trait]
impl WireHandler for PassHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        check_password(svc, line)
    }
}

fn check_password(svc: &Services, line: &Line) -> HandlerResult {
    let Some(presented) = svc.protocol.server_password(line) else {
        return Ok(());
    };
    if secrets_match(presented, &svc.config().uplink.password) {
        debug!("uplink password accepted");
        Ok(())
    } else {
        error!("uplink presented the wrong link password");
        Err(HandlerError::LinkRejected("bad link password".into()))
    }
}

/// `PROTOCTL` / `CAPAB`.
pub struct CapabilityHandler;

#[async_trait]
impl WireHandler for CapabilityHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let mut link = svc.link.lock();
        let result = svc.protocol.negotiate(line, &mut link.tables);
        if let Some(revision) = result.revision {
            link.protocol_version = Some(revision);
            debug!(revision, "uplink protocol revision");
        }
        if let Some(sid) = result.uplink_sid {
            link.uplink_sid = Some(sid);
        }
        if result.complete {
            info!(
                channel_modes = link.tables.channel_modes.len(),
                user_modes = link.tables.user_modes.len(),
                prefixes = link.tables.prefix_to_mode.len(),
                "capability negotiation complete"
            );
        }
        Ok(())
    }
}

/// `SERVER` / `SID`: our uplink introducing itself, or a server behind it.
pub struct ServerHandler;

#[async_trait]
impl WireHandler for ServerHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        check_password(svc, line)?;
        let uplink_sid = svc.link.lock().uplink_sid.clone();
        let server = svc.protocol.parse_server(line, uplink_sid.as_deref())?;

        if server.parent.is_some() {
            debug!(sid = %server.sid, name = %server.name, "server introduced");
            svc.matrix.lock().servers.insert(server);
            return Ok(());
        }

        info!(sid = %server.sid, name = %server.name, "uplink introduced");
        {
            let mut link = svc.link.lock();
            link.uplink_sid = Some(server.sid.clone());
            link.uplink_name = Some(server.name.clone());
        }
        svc.matrix.lock().servers.insert(server);
        svc.send_burst();
        Ok(())
    }
}

/// `SQUIT`: a netsplit, or the uplink dropping us.
pub struct SquitHandler;

#[async_trait]
impl WireHandler for SquitHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let target = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let reason = line.param(1).unwrap_or("no reason");
        let me = svc.identity();
        if target == me.sid || target.eq_ignore_ascii_case(&me.server_name) {
            return Err(HandlerError::LinkRejected(format!("squit: {reason}")));
        }

        let (servers, users) = {
            let mut regs = svc.matrix.lock();
            if !regs.servers.exists(target) {
                return Err(HandlerError::unknown_server(target));
            }
            regs.split_server(target)
        };
        for user in &users {
            svc.sasl.remove(&user.uid);
        }
        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        svc.announce(&format!(
            "Netsplit: {} ({} servers, {} users lost): {}",
            names.join(", "),
            servers.len(),
            users.len(),
            reason
        ));
        Ok(())
    }
}

/// `ERROR` from the uplink always ends the link.
pub struct ErrorHandler;

#[async_trait]
impl WireHandler for ErrorHandler {
    async fn handle(&self, _svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let message = line.param(0).unwrap_or("closing link");
        error!(message = %message, "uplink sent ERROR");
        Err(HandlerError::LinkRejected(message.to_string()))
    }
}

/// InspIRCd `BURST`.
pub struct BurstStartHandler;

#[async_trait]
impl WireHandler for BurstStartHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let mut link = svc.link.lock();
        if !link.burst_complete && line.source_name() == link.uplink_sid.as_deref() {
            link.phase = SessionState::Bursting;
            debug!("uplink burst started");
        }
        Ok(())
    }
}

/// `EOS` / `ENDBURST`.
pub struct EndBurstHandler;

#[async_trait]
impl WireHandler for EndBurstHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        svc.end_of_burst(line.source_name()).await?;
        Ok(())
    }
}
