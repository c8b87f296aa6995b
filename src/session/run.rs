//! Connection lifecycle.
//!
//! `Disconnected → Handshaking → Bursting → Synced`, then on request
//! `Restarting` (back to `Handshaking` on a fresh socket) or
//! `ShuttingDown`. Transport errors end the session.

use super::services::identity_for;
use super::{Control, LinkState, Receivers, Services, SessionState, connect, now};
use crate::config::Config;
use crate::error::SessionError;
use crate::handlers;
use futures_util::{SinkExt, StreamExt};
use slsvc_proto::LineCodec;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Pause between dropping a link and reconnecting, so the uplink releases
/// our SID first.
const RELINK_DELAY: Duration = Duration::from_secs(2);

/// How a session ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Restart(String),
    Shutdown(String),
}

/// Run the services link until shutdown or a fatal error.
pub async fn run(svc: Arc<Services>, mut rx: Receivers) -> Result<(), SessionError> {
    loop {
        svc.set_phase(SessionState::Handshaking);
        let uplink = svc.config().uplink.clone();
        let result = match connect(&uplink).await {
            Ok(stream) => run_session(&svc, stream, &mut rx).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(Exit::Restart(reason)) => {
                info!(reason = %reason, "restarting link");
                tokio::time::sleep(RELINK_DELAY).await;
                svc.reset_link();
                svc.reload_for_restart();
            }
            Ok(Exit::Shutdown(reason)) => {
                info!(reason = %reason, "shut down");
                svc.set_phase(SessionState::Disconnected);
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "session ended");
                svc.tasks.shutdown();
                svc.set_phase(SessionState::Disconnected);
                return Err(e);
            }
        }
    }
}

/// Drive one link over an established stream.
pub async fn run_session<S>(
    svc: &Arc<Services>,
    stream: S,
    rx: &mut Receivers,
) -> Result<Exit, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LineCodec::new());

    // Anything queued while no link existed belongs to the old network view.
    while rx.outbound.try_recv().is_ok() {}

    svc.set_phase(SessionState::Handshaking);
    let config = svc.config();
    let me = svc.identity();
    for line in svc.protocol.link_sequence(&me, &config.uplink, now()) {
        debug!(line = %line, ">>");
        framed.send(line).await?;
    }

    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(config.heartbeat.interval_secs.max(1)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => {
                    debug!(line = %line, "<<");
                    handlers::dispatch(svc, &line).await?;
                }
                Some(Err(e)) if e.is_recoverable() => warn!(error = %e, "skipping bad line"),
                Some(Err(e)) => return Err(e.into()),
                None => return Err(SessionError::Closed),
            },
            Some(line) = rx.outbound.recv() => {
                debug!(line = %line, ">>");
                framed.send(line).await?;
            }
            Some(control) = rx.control.recv() => {
                let exit = match control {
                    Control::Restart(reason) => {
                        svc.set_phase(SessionState::Restarting);
                        svc.modules.unload_all(svc).await;
                        Exit::Restart(reason)
                    }
                    Control::Shutdown(reason) => {
                        svc.set_phase(SessionState::ShuttingDown);
                        svc.modules.unload_all(svc).await;
                        svc.send(svc.protocol.quit(&me.service_uid, &reason));
                        Exit::Shutdown(reason)
                    }
                };
                let reason = match &exit {
                    Exit::Restart(r) | Exit::Shutdown(r) => r.clone(),
                };
                let me = svc.identity();
                svc.send(svc.protocol.squit(&me, &me.sid, &reason));
                while let Ok(line) = rx.outbound.try_recv() {
                    debug!(line = %line, ">>");
                    framed.send(line).await?;
                }
                if let Err(e) = framed.close().await {
                    debug!(error = %e, "error closing uplink socket");
                }
                svc.tasks.shutdown();
                return Ok(exit);
            }
            _ = heartbeat.tick() => svc.heartbeat(),
        }
    }
}

impl Services {
    /// Drain deferred work in FIFO order and reap finished tasks.
    pub fn heartbeat(self: &Arc<Self>) {
        let queued = self.deferred.drain();
        let ran = queued.len();
        for (name, task) in queued {
            debug!(task = %name, "running deferred task");
            task(self);
        }
        let reaped = self.tasks.reap();
        if ran > 0 || reaped > 0 {
            debug!(ran, reaped, "heartbeat");
        }
    }

    /// Forget everything learned from the previous link.
    pub fn reset_link(&self) {
        self.matrix.lock().clear_network();
        self.sasl.clear();
        self.scores.clear();
        self.deferred.clear();
        self.tasks.shutdown();
        self.tasks.resume();
        *self.link.lock() = LinkState::new(self.protocol.initial_modes());
    }

    /// Pick up fields held back since the last rehash. The dialect and SID
    /// are fixed for the life of the process.
    fn reload_for_restart(&self) {
        let Some(path) = self.config_path() else {
            return;
        };
        let mut config = match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "keeping running configuration across restart");
                return;
            }
        };
        if let Err(errors) = crate::config::validate(&config) {
            warn!(errors = errors.len(), "new configuration invalid, keeping running one");
            return;
        }
        let running = self.config();
        if config.uplink.dialect != running.uplink.dialect || config.uplink.sid != running.uplink.sid {
            warn!("uplink dialect and sid changes need a process restart");
            config.uplink.dialect = running.uplink.dialect;
            config.uplink.sid = running.uplink.sid.clone();
        }
        let identity = identity_for(&config, &self.uids);
        self.replace_config(config);
        self.update_identity(|me| *me = identity);
    }
}
