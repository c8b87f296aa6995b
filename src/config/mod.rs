//! Configuration loading and management.
//!
//! - [`types`]: the TOML schema (`Config` and its sections)
//! - [`validation`]: startup/rehash sanity checks
//! - [`diff`]: field-level comparison used to announce rehash changes

mod diff;
mod types;
mod validation;

pub use diff::{ConfigChange, PRESERVED_ON_REHASH, describe, diff, preserve_identity};
pub use types::{
    Config, ConfigError, DatabaseConfig, Dialect, HeartbeatConfig, LoggingConfig, ModulesConfig,
    OwnerConfig, ServiceConfig, UplinkConfig,
};
pub use validation::{ValidationError, validate};

#[cfg(test)]
pub(crate) use types::SAMPLE;
