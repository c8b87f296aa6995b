//! Configuration schema.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// The server link.
    pub uplink: UplinkConfig,
    /// The services pseudo-client.
    pub service: ServiceConfig,
    /// Bootstrap owner credentials for `firstauth`.
    #[serde(default)]
    pub owner: Option<OwnerConfig>,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Which server-to-server dialect the uplink speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// UnrealIRCd 6 (`PROTOCTL`, `SJOIN`, `EOS`).
    Unrealircd,
    /// InspIRCd 3/4 (`CAPAB`, `FJOIN`, `ENDBURST`).
    Inspircd,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrealircd => f.write_str("unrealircd"),
            Self::Inspircd => f.write_str("inspircd"),
        }
    }
}

/// Link block for the single uplink.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UplinkConfig {
    /// Our server name as presented to the network (e.g. "services.example.net").
    pub name: String,
    /// Our SID (TS6 format: `[0-9][A-Z0-9][A-Z0-9]`).
    pub sid: String,
    /// Server description sent in the introduction.
    #[serde(default = "default_description")]
    pub description: String,
    /// Hostname or IP of the IRC server to connect to.
    pub host: String,
    pub port: u16,
    /// Link password, sent and expected.
    pub password: String,
    pub dialect: Dialect,
    #[serde(default)]
    pub tls: bool,
    /// Verify the server certificate against the native root store.
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    /// Optional SHA-256 fingerprint pin (hex, colons allowed).
    #[serde(default)]
    pub cert_fingerprint: Option<String>,
    /// Client certificate (PEM) presented during the TLS handshake.
    #[serde(default)]
    pub client_cert: Option<String>,
    /// Private key for `client_cert` (PEM).
    #[serde(default)]
    pub client_key: Option<String>,
}

/// The services pseudo-client and its chat surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub nick: String,
    #[serde(default = "default_user")]
    pub user: String,
    pub host: String,
    #[serde(default = "default_realname")]
    pub realname: String,
    /// User modes set on introduction.
    #[serde(default = "default_umodes")]
    pub umodes: String,
    /// Command prefix inside channels (`!help`).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Channel receiving operational notices.
    pub log_channel: String,
    /// Default reply language.
    #[serde(default = "default_language")]
    pub language: String,
    /// URL returning `{ "version": "x.y.z" }`, checked after each burst.
    #[serde(default)]
    pub version_check_url: Option<String>,
    /// Post a banner to the log channel after the burst.
    #[serde(default = "default_true")]
    pub banner: bool,
}

/// Owner bootstrap credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OwnerConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatConfig {
    /// Seconds between heartbeat ticks.
    #[serde(default = "default_heartbeat")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` overrides it.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of the human format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModulesConfig {
    /// Modules loaded at end of burst besides the persisted defaults.
    #[serde(default)]
    pub autoload: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_description() -> String {
    "Network Services".to_string()
}

fn default_user() -> String {
    "services".to_string()
}

fn default_realname() -> String {
    "Network Services".to_string()
}

fn default_umodes() -> String {
    "+ioqBS".to_string()
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_heartbeat() -> u64 {
    5
}

fn default_db_path() -> String {
    "slsvcd.db".to_string()
}

fn default_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r##"
[uplink]
name = "services.example.net"
sid = "9SV"
host = "127.0.0.1"
port = 7000
password = "linkpass"
dialect = "inspircd"

[service]
nick = "Svc"
host = "services.example.net"
log_channel = "#services"

[owner]
name = "root"
password = "bootstrap"
"##;
