//! Channel membership: bursts, joins, parts and kicks.

use super::WireHandler;
use crate::error::{HandlerError, HandlerResult};
use crate::session::Services;
use async_trait::async_trait;
use slsvc_proto::Line;
use slsvc_proto::casemap::is_channel_name;
use std::sync::Arc;
use tracing::{debug, warn};

/// `SJOIN` / `FJOIN`.
pub struct BurstJoinHandler;

#[async_trait]
impl WireHandler for BurstJoinHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let burst = {
            let link = svc.link.lock();
            svc.protocol.parse_burst_join(line, &link.tables)?
        };
        let mut regs = svc.matrix.lock();
        let mut joined = 0usize;
        for (_, uid) in &burst.members {
            if !regs.users.exists(uid) {
                warn!(channel = %burst.channel, uid = %uid, "burst member is not a known user");
                continue;
            }
            if regs.channels.join(&burst.channel, uid) {
                joined += 1;
            }
        }
        debug!(channel = %burst.channel, joined, "channel burst");
        Ok(())
    }
}

/// InspIRCd `IJOIN`: a single user joining an existing channel.
pub struct JoinHandler;

#[async_trait]
impl WireHandler for JoinHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let source = line
            .source_name()
            .ok_or_else(|| HandlerError::Protocol("join without a source".into()))?;
        let channel = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let mut regs = svc.matrix.lock();
        let uid = regs
            .users
            .resolve(source)
            .map(str::to_string)
            .ok_or_else(|| HandlerError::unknown_user(source))?;
        regs.channels.join(channel, &uid);
        Ok(())
    }
}

/// `PART #a,#b :reason`.
pub struct PartHandler;

#[async_trait]
impl WireHandler for PartHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let source = line
            .source_name()
            .ok_or_else(|| HandlerError::Protocol("part without a source".into()))?;
        let channels = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let mut regs = svc.matrix.lock();
        let uid = regs
            .users
            .resolve(source)
            .map(str::to_string)
            .ok_or_else(|| HandlerError::unknown_user(source))?;
        for channel in channels.split(',').filter(|c| is_channel_name(c)) {
            regs.channels.part(channel, &uid);
        }
        Ok(())
    }
}

/// `KICK #chan target :reason`. A kicked service rejoins.
pub struct KickHandler;

#[async_trait]
impl WireHandler for KickHandler {
    async fn handle(&self, svc: &Arc<Services>, line: &Line) -> HandlerResult {
        let channel = line
            .param(0)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;
        let target = line
            .param(1)
            .ok_or_else(|| HandlerError::NeedMoreParams(line.command.clone()))?;

        if svc.is_service(target) {
            let me = svc.identity();
            warn!(channel = %channel, by = ?line.source_name(), "service was kicked, rejoining");
            svc.matrix.lock().channels.part(channel, &me.service_uid);
            svc.join(&me.service_uid, channel, None);
            return Ok(());
        }

        let mut regs = svc.matrix.lock();
        let uid = regs
            .users
            .resolve(target)
            .map(str::to_string)
            .ok_or_else(|| HandlerError::unknown_user(target))?;
        regs.channels.part(channel, &uid);
        Ok(())
    }
}
