//! # slsvc-proto
//!
//! Wire layer for the `slsvcd` services daemon: CRLF line framing with a
//! Latin-1 fallback, message tokenizing (tags, source, command, params),
//! RFC 1459 case mapping, line chunking, CTCP helpers and SASL payload
//! decoding.
//!
//! Nothing in here knows about a particular server dialect; dialect-specific
//! command vocabularies live in the daemon.
//!
//! ```
//! use slsvc_proto::Line;
//!
//! let line = Line::parse("@s2s-md/geoip=cc=NL :001AAAAAB PRIVMSG #ops :hello there").unwrap();
//! assert_eq!(line.command, "PRIVMSG");
//! assert_eq!(line.source.as_deref(), Some("001AAAAAB"));
//! assert_eq!(line.param(1), Some("hello there"));
//! assert_eq!(line.tag("s2s-md/geoip"), Some("cc=NL"));
//! ```

#![warn(missing_docs)]

pub mod casemap;
pub mod chunk;
pub mod codec;
pub mod ctcp;
pub mod error;
pub mod line;
pub mod sasl;

pub use casemap::{irc_eq, irc_to_lower};
pub use chunk::{MESSAGE_CHUNK_SIZE, chunk_text};
pub use codec::{LineCodec, MAX_PARTIAL_LINE};
pub use error::{ProtocolError, Result};
pub use line::Line;
