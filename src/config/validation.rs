//! Configuration validation.
//!
//! Runs at startup and before a rehash is applied; a rehash that fails
//! validation leaves the running configuration untouched.

use super::Config;
use crate::db::IN_MEMORY;
use slsvc_proto::casemap::is_channel_name;
use std::path::Path;
use thiserror::Error;

/// One problem found in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("uplink.name is required")]
    MissingServerName,
    #[error("uplink.sid must be exactly 3 characters, got {0}")]
    InvalidSid(usize),
    #[error("uplink.sid must match pattern [0-9][A-Z0-9][A-Z0-9], got '{0}'")]
    InvalidSidFormat(String),
    #[error("uplink.password is required")]
    MissingLinkPassword,
    #[error("uplink.client_cert and uplink.client_key must be set together")]
    ClientCertIncomplete,
    #[error("{0} does not exist: {1}")]
    FileNotFound(&'static str, String),
    #[error("service.nick is required")]
    MissingServiceNick,
    #[error("service.log_channel must be a channel name, got '{0}'")]
    InvalidLogChannel(String),
    #[error("service.prefix must be a single character, got '{0}'")]
    InvalidPrefix(String),
    #[error("owner.password is required when [owner] is present")]
    MissingOwnerPassword,
    #[error("heartbeat.interval_secs must be at least 1")]
    InvalidHeartbeat,
    #[error("database.path points into a missing directory: {0}")]
    DatabaseDirMissing(String),
}

/// Check `config`, collecting every problem rather than stopping at the
/// first.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let uplink = &config.uplink;

    if uplink.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    match sid_problem(&uplink.sid) {
        Some(SidProblem::Length(len)) => errors.push(ValidationError::InvalidSid(len)),
        Some(SidProblem::Shape) => errors.push(ValidationError::InvalidSidFormat(uplink.sid.clone())),
        None => {}
    }

    if uplink.password.is_empty() {
        errors.push(ValidationError::MissingLinkPassword);
    }

    match (&uplink.client_cert, &uplink.client_key) {
        (Some(cert), Some(key)) => {
            if !Path::new(cert).exists() {
                errors.push(ValidationError::FileNotFound("uplink.client_cert", cert.clone()));
            }
            if !Path::new(key).exists() {
                errors.push(ValidationError::FileNotFound("uplink.client_key", key.clone()));
            }
        }
        (None, None) => {}
        _ => errors.push(ValidationError::ClientCertIncomplete),
    }

    let service = &config.service;
    if service.nick.is_empty() {
        errors.push(ValidationError::MissingServiceNick);
    }
    if !is_channel_name(&service.log_channel) {
        errors.push(ValidationError::InvalidLogChannel(service.log_channel.clone()));
    }
    if service.prefix.chars().count() != 1 || service.prefix == " " {
        errors.push(ValidationError::InvalidPrefix(service.prefix.clone()));
    }

    if let Some(owner) = &config.owner
        && owner.password.is_empty()
    {
        errors.push(ValidationError::MissingOwnerPassword);
    }

    if config.heartbeat.interval_secs == 0 {
        errors.push(ValidationError::InvalidHeartbeat);
    }

    let db_dir = Path::new(&config.database.path).parent();
    if config.database.path != IN_MEMORY
        && db_dir.is_some_and(|dir| !dir.as_os_str().is_empty() && !dir.exists())
    {
        errors.push(ValidationError::DatabaseDirMissing(config.database.path.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

enum SidProblem {
    Length(usize),
    Shape,
}

/// Server IDs are a digit followed by two digits or uppercase letters.
fn sid_problem(sid: &str) -> Option<SidProblem> {
    let bytes = sid.as_bytes();
    let [first, rest @ ..] = bytes else {
        return Some(SidProblem::Length(0));
    };
    if bytes.len() != 3 {
        return Some(SidProblem::Length(sid.chars().count()));
    }
    let alnum = |b: &u8| b.is_ascii_digit() || b.is_ascii_uppercase();
    if first.is_ascii_digit() && rest.iter().all(alnum) {
        None
    } else {
        Some(SidProblem::Shape)
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::SAMPLE;
    use super::*;

    #[test]
    fn sample_is_valid() {
        let config = Config::parse(SAMPLE).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.uplink.sid = "ABC".into();
        config.service.log_channel = "services".into();
        config.service.prefix = "!!".into();
        config.heartbeat.interval_secs = 0;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], ValidationError::InvalidSidFormat(_)));
    }

    #[test]
    fn client_cert_needs_key() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.uplink.client_cert = Some("/tmp/cert.pem".into());
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::ClientCertIncomplete));
    }

    #[test]
    fn short_sid() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.uplink.sid = "9S".into();
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidSid(2)));
    }
}
