//! Configuration reload.
//!
//! The new file is validated first; a failing file leaves the running
//! configuration untouched. Link-identity fields keep their running values
//! (see [`PRESERVED_ON_REHASH`](crate::config::PRESERVED_ON_REHASH)) and
//! flag the link as needing a restart.

use super::{Services, SessionState, now};
use crate::config::{Config, ConfigChange, ConfigError, diff, preserve_identity, validate};
use crate::error::SessionError;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct RehashReport {
    pub changes: Vec<ConfigChange>,
    pub restart_required: bool,
    /// Modules reloaded with the new configuration.
    pub reloaded: Vec<String>,
}

impl Services {
    /// Re-read the configuration file and apply it.
    pub async fn rehash(self: &Arc<Self>) -> Result<RehashReport, SessionError> {
        let path = self.config_path().ok_or_else(|| {
            SessionError::Config(ConfigError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no configuration file to reload",
            )))
        })?;
        let config = Config::load(path)?;
        self.apply_config(config).await
    }

    /// Apply an already parsed configuration as a rehash.
    pub async fn apply_config(self: &Arc<Self>, mut config: Config) -> Result<RehashReport, SessionError> {
        validate(&config).map_err(SessionError::Invalid)?;

        let previous_phase = self.phase();
        self.set_phase(SessionState::Rehashing);

        let running = self.config();
        let changes = diff(&running, &config);
        let restart_required = changes.iter().any(ConfigChange::requires_restart);
        preserve_identity(&running, &mut config);
        self.replace_config(config.clone());

        if running.service.nick != config.service.nick {
            self.rename_service(&config.service.nick);
        }
        if running.service.log_channel != config.service.log_channel {
            let uid = self.identity().service_uid;
            self.part(&uid, &running.service.log_channel, Some("Log channel moved"));
            self.update_identity(|me| me.log_channel = config.service.log_channel.clone());
            self.join(&uid, &config.service.log_channel, None);
        }

        if restart_required {
            self.link.lock().restart_required = true;
        }
        for change in &changes {
            let suffix = if change.requires_restart() { " (applies after restart)" } else { "" };
            self.announce(&format!(
                "Rehash: {} changed from {} to {}{}",
                change.path, change.old, change.new, suffix
            ));
        }
        info!(changes = changes.len(), restart_required, "configuration reloaded");

        let reloaded = self.modules.reload_all(self).await;
        self.set_phase(previous_phase);

        Ok(RehashReport {
            changes,
            restart_required,
            reloaded,
        })
    }

    fn rename_service(&self, nick: &str) {
        let uid = self.identity().service_uid;
        if !self.matrix.lock().rename_user(&uid, nick) {
            warn!(nick = %nick, "service nickname change not mirrored in registry");
        }
        self.update_identity(|me| me.service_nick = nick.to_string());
        self.send(self.protocol.change_nick(&uid, nick, now()));
    }
}
