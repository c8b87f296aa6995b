//! The services object.
//!
//! One `Arc<Services>` is shared by the read loop, every wire handler, the
//! command dispatcher, modules and background workers. Registry state sits
//! behind [`Matrix`]; link-negotiated state behind [`LinkState`].

use super::tasks::{DeferredQueue, Tasks};
use super::{LinkState, SessionState};
use crate::commands::CommandTable;
use crate::config::{Config, validate};
use crate::db::Database;
use crate::error::SessionError;
use crate::handlers::HandlerTable;
use crate::modules::ModuleHost;
use crate::protocol::{self, Identity, Outbox, Protocol};
use crate::sasl::SaslSessions;
use crate::state::{Matrix, UidGenerator};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Requests to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Drop the link and reconnect from scratch.
    Restart(String),
    /// Leave the network and exit.
    Shutdown(String),
}

/// Receiving ends owned by the session loop.
pub struct Receivers {
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub control: mpsc::UnboundedReceiver<Control>,
}

pub struct Services {
    config: RwLock<Arc<Config>>,
    config_path: Option<PathBuf>,
    identity: RwLock<Identity>,
    outbox: Outbox,
    control: mpsc::UnboundedSender<Control>,
    handlers: HandlerTable,
    started_at: i64,

    pub db: Database,
    pub matrix: Matrix,
    pub protocol: Arc<dyn Protocol>,
    pub link: Mutex<LinkState>,
    pub uids: UidGenerator,
    pub commands: RwLock<CommandTable>,
    pub modules: ModuleHost,
    pub sasl: SaslSessions,
    /// Pre-connect reputation scores by IP, applied at user introduction.
    pub scores: DashMap<String, i32>,
    pub tasks: Tasks,
    pub deferred: DeferredQueue,
}

impl Services {
    /// Validate `config`, open the database and build the services object.
    pub async fn new(
        config: Config,
        config_path: Option<PathBuf>,
    ) -> Result<(Arc<Self>, Receivers), SessionError> {
        validate(&config).map_err(SessionError::Invalid)?;
        let db = Database::new(&config.database.path).await?;
        Ok(Self::with_database(config, config_path, db))
    }

    /// Build around an already opened database.
    pub fn with_database(
        config: Config,
        config_path: Option<PathBuf>,
        db: Database,
    ) -> (Arc<Self>, Receivers) {
        let protocol = protocol::for_dialect(config.uplink.dialect);
        let uids = UidGenerator::new(&config.uplink.sid);
        let identity = identity_for(&config, &uids);

        let mut handlers = HandlerTable::new();
        protocol.register_commands(&mut handlers);

        let (outbox, outbound) = Outbox::channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let link = LinkState::new(protocol.initial_modes());

        let services = Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            config_path,
            identity: RwLock::new(identity),
            outbox,
            control,
            handlers,
            started_at: super::now(),
            db,
            matrix: Matrix::new(),
            protocol,
            link: Mutex::new(link),
            uids,
            commands: RwLock::new(CommandTable::with_core()),
            modules: ModuleHost::new(),
            sasl: SaslSessions::new(),
            scores: DashMap::new(),
            tasks: Tasks::new(),
            deferred: DeferredQueue::default(),
        });
        (
            services,
            Receivers {
                outbound,
                control: control_rx,
            },
        )
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    pub(crate) fn replace_config(&self, config: Config) {
        *self.config.write() = Arc::new(config);
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub(crate) fn update_identity(&self, f: impl FnOnce(&mut Identity)) {
        f(&mut self.identity.write());
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    /// Queue a raw line for the uplink.
    pub fn send(&self, line: impl Into<String>) {
        self.outbox.send(line);
    }

    pub fn send_all(&self, lines: impl IntoIterator<Item = String>) {
        self.outbox.send_all(lines);
    }

    pub fn request(&self, control: Control) {
        if self.control.send(control).is_err() {
            warn!("session loop is gone, control request dropped");
        }
    }

    pub fn phase(&self) -> SessionState {
        self.link.lock().phase
    }

    pub fn set_phase(&self, phase: SessionState) {
        self.link.lock().phase = phase;
    }

    pub fn burst_complete(&self) -> bool {
        self.link.lock().burst_complete
    }

    /// Whether `target` names our service pseudo-user.
    pub fn is_service(&self, target: &str) -> bool {
        let me = self.identity.read();
        target == me.service_uid || slsvc_proto::irc_eq(target, &me.service_nick)
    }
}

pub(crate) fn identity_for(config: &Config, uids: &UidGenerator) -> Identity {
    Identity {
        sid: config.uplink.sid.clone(),
        server_name: config.uplink.name.clone(),
        description: config.uplink.description.clone(),
        service_uid: uids.service_uid(),
        service_nick: config.service.nick.clone(),
        service_user: config.service.user.clone(),
        service_host: config.service.host.clone(),
        service_realname: config.service.realname.clone(),
        service_umodes: config.service.umodes.trim_start_matches('+').to_string(),
        log_channel: config.service.log_channel.clone(),
    }
}
