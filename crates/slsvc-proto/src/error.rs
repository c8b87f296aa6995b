//! Error types for the wire layer.

use thiserror::Error;

/// Convenience alias for results carrying a [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while framing or tokenizing wire lines.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Socket-level failure while reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line held nothing but whitespace, tags or a source prefix.
    #[error("line has no command")]
    MissingCommand,

    /// The tag block was opened but never closed by a space.
    #[error("unterminated message tags")]
    UnterminatedTags,

    /// A partial line grew past the buffer high-water mark.
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong {
        /// Bytes buffered when the limit tripped.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Base64 payload could not be decoded.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// SASL payload did not have the expected shape.
    #[error("malformed sasl payload: {0}")]
    MalformedSasl(&'static str),
}

impl ProtocolError {
    /// Whether the framed stream can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
