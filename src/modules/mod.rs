//! Loadable command modules.
//!
//! Modules are compiled in and instantiated by name from [`CATALOG`].
//! A loaded module sees every inbound line through
//! [`CommandHandler::cmd`] and every authorized chat command through
//! [`CommandHandler::hcmds`], in load order. Modules observe; they never
//! override the core. A failing or panicking module is logged and skipped.
//!
//! - [`clone`]: clone-army simulator
//! - [`jail`]: reputation sanctions

mod clone;
mod jail;

pub use clone::CloneModule;
pub use jail::JailModule;

use crate::commands::{CommandSpec, Invocation, Owner};
use crate::db::DbError;
use crate::session::Services;
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use slsvc_proto::Line;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Modules that can be loaded by name.
pub const CATALOG: &[&str] = &["clone", "jail"];

/// Build a fresh instance of a catalog module.
pub fn instantiate(name: &str) -> Option<Arc<dyn Module>> {
    match name {
        "clone" => Some(Arc::new(CloneModule::new())),
        "jail" => Some(Arc::new(JailModule::new())),
        _ => None,
    }
}

/// Hooks a loaded module receives.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Every inbound line, after the core has handled it.
    async fn cmd(&self, _svc: &Arc<Services>, _line: &Line) -> anyhow::Result<()> {
        Ok(())
    }

    /// Every authorized chat command, after the core has handled it.
    async fn hcmds(&self, _svc: &Arc<Services>, _inv: &Invocation) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Module: CommandHandler {
    fn name(&self) -> &'static str;

    /// Commands added to the shared table while loaded.
    fn commands(&self) -> &'static [CommandSpec];

    /// Declared `(key, default)` configuration fields.
    fn config_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Called once the stored configuration is synced.
    async fn on_load(&self, svc: &Arc<Services>, config: BTreeMap<String, String>) -> anyhow::Result<()>;

    /// Release whatever the module holds on the network.
    async fn unload(&self, _svc: &Arc<Services>) {}
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("no module named {0}")]
    Unknown(String),
    #[error("{0} is already loaded")]
    AlreadyLoaded(String),
    #[error("{0} is not loaded")]
    NotLoaded(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{module} failed to start: {source}")]
    Failed {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Loaded module instances, in load order.
#[derive(Default)]
pub struct ModuleHost {
    loaded: RwLock<Vec<Arc<dyn Module>>>,
}

impl ModuleHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.loaded.read().iter().map(|m| m.name()).collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().iter().any(|m| m.name() == name)
    }

    /// Load `name` and record it in the module registry.
    pub async fn load(
        &self,
        svc: &Arc<Services>,
        name: &str,
        by: &str,
        is_default: bool,
    ) -> Result<(), ModuleError> {
        if self.is_loaded(name) {
            return Err(ModuleError::AlreadyLoaded(name.to_string()));
        }
        self.start(svc, name).await?;
        svc.db.modules().mark_loaded(name, by, is_default).await?;
        info!(module = %name, by = %by, "module loaded");
        Ok(())
    }

    /// Unload `name`; it is no longer loaded at end of burst.
    pub async fn unload(&self, svc: &Arc<Services>, name: &str) -> Result<(), ModuleError> {
        let module = self
            .take(name)
            .ok_or_else(|| ModuleError::NotLoaded(name.to_string()))?;
        stop(svc, module).await;
        svc.db.modules().mark_unloaded(name).await?;
        info!(module = %name, "module unloaded");
        Ok(())
    }

    /// Replace a loaded module with a fresh instance, re-reading its
    /// configuration.
    pub async fn reload(&self, svc: &Arc<Services>, name: &str) -> Result<(), ModuleError> {
        let module = self
            .take(name)
            .ok_or_else(|| ModuleError::NotLoaded(name.to_string()))?;
        stop(svc, module).await;
        self.start(svc, name).await?;
        info!(module = %name, "module reloaded");
        Ok(())
    }

    /// Reload every loaded module. Returns the ones that came back.
    pub async fn reload_all(&self, svc: &Arc<Services>) -> Vec<String> {
        let mut reloaded = Vec::new();
        for name in self.names() {
            match self.reload(svc, name).await {
                Ok(()) => reloaded.push(name.to_string()),
                Err(e) => {
                    warn!(module = %name, error = %e, "module reload failed");
                    svc.announce(&format!("Reload of {name} failed: {e}"));
                }
            }
        }
        reloaded
    }

    /// Stop every module, newest first, without touching the registry so
    /// the same set comes back after a relink.
    pub async fn unload_all(&self, svc: &Arc<Services>) {
        let modules: Vec<Arc<dyn Module>> = std::mem::take(&mut *self.loaded.write());
        for module in modules.into_iter().rev() {
            stop(svc, module).await;
        }
    }

    /// Show an inbound line to every module.
    pub async fn on_line(&self, svc: &Arc<Services>, line: &Line) {
        for module in self.snapshot() {
            let result = AssertUnwindSafe(module.cmd(svc, line)).catch_unwind().await;
            report(module.name(), "cmd", result);
        }
    }

    /// Deliver an authorized command to every module.
    pub async fn broadcast_command(&self, svc: &Arc<Services>, inv: &Invocation) {
        for module in self.snapshot() {
            let result = AssertUnwindSafe(module.hcmds(svc, inv)).catch_unwind().await;
            report(module.name(), "hcmds", result);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Module>> {
        self.loaded.read().clone()
    }

    fn take(&self, name: &str) -> Option<Arc<dyn Module>> {
        let mut loaded = self.loaded.write();
        let index = loaded.iter().position(|m| m.name() == name)?;
        Some(loaded.remove(index))
    }

    async fn start(&self, svc: &Arc<Services>, name: &str) -> Result<(), ModuleError> {
        let module = instantiate(name).ok_or_else(|| ModuleError::Unknown(name.to_string()))?;
        let config = svc
            .db
            .modules()
            .sync_config(module.name(), &module.config_fields())
            .await?;

        {
            let mut table = svc.commands.write();
            for spec in module.commands() {
                table.register(Owner::Module(module.name()), *spec);
            }
        }
        if let Err(source) = module.on_load(svc, config).await {
            svc.commands.write().unregister_owner(Owner::Module(module.name()));
            return Err(ModuleError::Failed {
                module: name.to_string(),
                source,
            });
        }
        self.loaded.write().push(module);
        Ok(())
    }
}

async fn stop(svc: &Arc<Services>, module: Arc<dyn Module>) {
    if AssertUnwindSafe(module.unload(svc)).catch_unwind().await.is_err() {
        error!(module = module.name(), "module panicked while unloading");
    }
    let removed = svc
        .commands
        .write()
        .unregister_owner(Owner::Module(module.name()));
    tracing::debug!(module = module.name(), commands = removed, "module stopped");
}

fn report(module: &str, hook: &str, result: std::thread::Result<anyhow::Result<()>>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(module = %module, hook = %hook, error = %e, "module hook failed"),
        Err(_) => error!(module = %module, hook = %hook, "module hook panicked"),
    }
}
