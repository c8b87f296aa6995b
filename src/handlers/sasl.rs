//! SASL frames relayed by the uplink.

use super::WireHandler;
use crate::error::{HandlerError, HandlerResult};
use crate::sasl::handle_frame;
use crate::session::Services;
use async_trait::async_trait;
use slsvc_proto::Line;
use std::sync::Arc;
use tracing::trace;

/// UnrealIRCd `SASL <target> <client> <mode> <data> [ext]`.
pub struct SaslHandler;

#[async_trait]
impl WireHandler for SaslHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let target = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        if !addressed_to_us(svc, target) {
            trace!(target = %target, "SASL frame for another server");
            return Ok(());
        }
        let frame = svc
            .protocol
            .parse_sasl(line)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        handle_frame(svc, frame).await
    }
}

/// InspIRCd `ENCAP <target> <command> ...`; only `SASL` is ours.
pub struct EncapHandler;

#[async_trait]
impl WireHandler for EncapHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let target = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        if !addressed_to_us(svc, target) {
            return Ok(());
        }
        match svc.protocol.parse_sasl(line) {
            Some(frame) => handle_frame(svc, frame).await,
            None => {
                trace!(command = ?line.param(1), "ENCAP ignored");
                Ok(())
            }
        }
    }
}

fn addressed_to_us(svc: &Services, target: &str) -> bool {
    let me = svc.identity();
    target == "*" || target == me.sid || target.eq_ignore_ascii_case(&me.server_name)
}
