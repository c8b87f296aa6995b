//! Our burst and the uplink's end-of-burst.

use super::wire::local_user;
use super::{SessionState, now};
use crate::error::HandlerError;
use crate::protocol::Introduction;
use crate::session::Services;
use serde::Deserialize;
use slsvc_proto::irc_eq;
use slsvc_proto::sasl::SaslMechanism;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
}

impl Services {
    /// Send our burst. Happens once per link, after the uplink introduced
    /// itself.
    pub fn send_burst(&self) {
        {
            let mut link = self.link.lock();
            if link.burst_sent {
                return;
            }
            link.burst_sent = true;
            link.phase = SessionState::Bursting;
        }
        let me = self.identity();
        let ts = now();

        let mut lines = self.protocol.burst_start(&me, ts);
        {
            let mut regs = self.matrix.lock();
            regs.users.insert(local_user(&Introduction::service(&me, ts)));
            if self.protocol.joins_log_channel_in_burst() {
                regs.channels.join(&me.log_channel, &me.service_uid);
                lines.push(
                    self.protocol
                        .join(&me, &me.service_uid, &me.log_channel, None, ts),
                );
            }
        }
        lines.push(self.protocol.sasl_mechanisms(&me, SaslMechanism::supported()));
        lines.push(self.protocol.end_of_burst(&me));
        info!(dialect = self.protocol.name(), lines = lines.len(), "sending burst");
        self.send_all(lines);
    }

    /// Handle end-of-burst from `source`. Only the uplink's first one counts;
    /// returns whether the synced actions ran.
    pub async fn end_of_burst(self: &Arc<Self>, source: Option<&str>) -> Result<bool, HandlerError> {
        let fire = {
            let mut link = self.link.lock();
            let from_uplink = source.is_some() && source == link.uplink_sid.as_deref();
            if from_uplink && !link.burst_complete {
                link.burst_complete = true;
                link.phase = SessionState::Synced;
                true
            } else {
                false
            }
        };
        if !fire {
            debug!(source = ?source, "end-of-burst ignored");
            return Ok(false);
        }

        let config = self.config();
        let me = self.identity();
        let (users, channels, servers) = {
            let regs = self.matrix.lock();
            (regs.users.len(), regs.channels.len(), regs.servers.len())
        };
        info!(users, channels, servers, "uplink burst complete");

        self.spawn_version_check();

        if config.service.banner {
            self.announce(&format!(
                "slsvcd {} linked: {} users, {} channels, {} servers",
                env!("CARGO_PKG_VERSION"),
                users,
                channels,
                servers
            ));
        }

        for channel in self.db.channels().all().await? {
            if !irc_eq(&channel, &me.log_channel) {
                self.join(&me.service_uid, &channel, None);
            }
        }
        if !self.protocol.joins_log_channel_in_burst() {
            self.join(&me.service_uid, &me.log_channel, None);
        }

        let defaults = self.db.modules().defaults().await?;
        let mut queue: Vec<(String, bool)> = defaults.into_iter().map(|n| (n, true)).collect();
        for name in &config.modules.autoload {
            if !queue.iter().any(|(n, _)| n == name) {
                queue.push((name.clone(), false));
            }
        }
        for (name, is_default) in queue {
            if let Err(e) = self.modules.load(self, &name, "autoload", is_default).await {
                warn!(module = %name, error = %e, "autoload failed");
                self.announce(&format!("Autoload of {name} failed: {e}"));
            }
        }
        Ok(true)
    }

    /// Fetch the published version on a tracked worker and post the result.
    fn spawn_version_check(self: &Arc<Self>) {
        let Some(url) = self.config().service.version_check_url.clone() else {
            return;
        };
        let svc = Arc::clone(self);
        self.tasks.spawn_worker("version-check", async move {
            match fetch_version(&url).await {
                Ok(latest) if latest == env!("CARGO_PKG_VERSION") => {
                    debug!(version = %latest, "running the latest version");
                }
                Ok(latest) => svc.announce(&format!(
                    "A different slsvcd version is published: {latest} (running {})",
                    env!("CARGO_PKG_VERSION")
                )),
                Err(e) => warn!(url = %url, error = %e, "version check failed"),
            }
        });
    }
}

async fn fetch_version(url: &str) -> Result<String, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(VERSION_CHECK_TIMEOUT)
        .build()?;
    let info: VersionInfo = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(info.version)
}
