//! Error types for the services core.
//!
//! Handler errors are per line: they are logged and the session carries on.
//! Session errors end the link.

use crate::config::{ConfigError, ValidationError};
use crate::db::DbError;
use thiserror::Error;

// ============================================================================
// Handler Errors (one inbound line)
// ============================================================================

/// Errors raised while processing a single inbound line.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters for {0}")]
    NeedMoreParams(String),

    #[error("unknown {kind}: {key}")]
    UnknownEntity { kind: &'static str, key: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The uplink refused us or told us to go away. Ends the session.
    #[error("link rejected: {0}")]
    LinkRejected(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn unknown_user(key: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind: "user",
            key: key.into(),
        }
    }

    pub fn unknown_server(key: impl Into<String>) -> Self {
        Self::UnknownEntity {
            kind: "server",
            key: key.into(),
        }
    }

    /// Static label for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams(_) => "need_more_params",
            Self::UnknownEntity { .. } => "unknown_entity",
            Self::Protocol(_) => "protocol_error",
            Self::LinkRejected(_) => "link_rejected",
            Self::Db(_) => "db_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the session has to end.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LinkRejected(_))
    }
}

/// Result type for wire handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Session Errors (the link as a whole)
// ============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error(transparent)]
    Wire(#[from] slsvc_proto::ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("link rejected: {0}")]
    LinkRejected(String),

    #[error("connection closed by uplink")]
    Closed,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_fatality() {
        assert_eq!(HandlerError::unknown_user("x").error_code(), "unknown_entity");
        assert_eq!(
            HandlerError::unknown_server("9XA").to_string(),
            "unknown server: 9XA"
        );
        assert!(HandlerError::LinkRejected("bad password".into()).is_fatal());
        assert!(!HandlerError::Protocol("junk".into()).is_fatal());
    }
}
