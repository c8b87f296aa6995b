//! SASL payload helpers for the server side of the exchange.
//!
//! The uplink relays a client's `AUTHENTICATE` frames to services; this
//! module only decodes what arrives. Password material is held in
//! [`Zeroizing`] buffers so it is wiped as soon as verification is done.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use zeroize::Zeroizing;

use crate::error::{ProtocolError, Result};

/// Largest payload carried by a single frame; a frame of exactly this size
/// means more data follows.
pub const SASL_CHUNK_SIZE: usize = 400;

/// The continuation marker (`+`), meaning "empty" or "go ahead".
pub const CONTINUATION: &str = "+";

/// Mechanisms services accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaslMechanism {
    /// RFC 4616 username and password.
    Plain,
    /// TLS client certificate fingerprint.
    External,
    /// Anything else; rejected.
    Unknown(String),
}

impl SaslMechanism {
    /// Parse a mechanism name.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::Unknown(name) => name,
        }
    }

    /// Names advertised to the uplink.
    pub fn supported() -> &'static str {
        "PLAIN,EXTERNAL"
    }
}

/// Decoded PLAIN credentials.
#[derive(Debug)]
pub struct PlainCredentials {
    /// Identity to act as (usually empty or equal to `authcid`).
    pub authzid: String,
    /// Account name.
    pub authcid: String,
    /// Secret, wiped on drop.
    pub password: Zeroizing<String>,
}

impl PlainCredentials {
    /// Whether the client asked to act as someone other than itself.
    /// Services never honour this; the login is always the `authcid`.
    pub fn requests_other_identity(&self) -> bool {
        !self.authzid.is_empty() && self.authzid != self.authcid
    }
}

/// Decode a base64 `authzid\0authcid\0password` triplet.
pub fn decode_plain(payload: &str) -> Result<PlainCredentials> {
    let raw = Zeroizing::new(BASE64.decode(payload.trim())?);
    let mut parts = raw.split(|&b| b == 0);
    let (Some(authzid), Some(authcid), Some(password), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ProtocolError::MalformedSasl("expected three NUL separated fields"));
    };

    let text = |bytes: &[u8]| {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::MalformedSasl("field is not utf-8"))
    };
    let authcid = text(authcid)?;
    if authcid.is_empty() {
        return Err(ProtocolError::MalformedSasl("empty authcid"));
    }

    Ok(PlainCredentials {
        authzid: text(authzid)?,
        authcid,
        password: Zeroizing::new(text(password)?),
    })
}

/// Encode a PLAIN triplet.
pub fn encode_plain(authzid: &str, authcid: &str, password: &str) -> String {
    let raw = Zeroizing::new(format!("{authzid}\0{authcid}\0{password}"));
    BASE64.encode(raw.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_roundtrip_fields() {
        let creds = decode_plain(&encode_plain("", "root", "hunter2")).unwrap();
        assert_eq!(creds.authzid, "");
        assert_eq!(creds.authcid, "root");
        assert_eq!(creds.password.as_str(), "hunter2");
    }

    #[test]
    fn authzid_only_matters_when_it_names_someone_else() {
        let plain = |z| decode_plain(&encode_plain(z, "root", "pw")).unwrap();
        assert!(!plain("").requests_other_identity());
        assert!(!plain("root").requests_other_identity());
        assert!(plain("admin").requests_other_identity());
    }

    #[test]
    fn plain_rejects_wrong_field_count() {
        let two = BASE64.encode(b"root\0pw");
        assert!(matches!(
            decode_plain(&two),
            Err(ProtocolError::MalformedSasl(_))
        ));
        let four = BASE64.encode(b"a\0b\0c\0d");
        assert!(decode_plain(&four).is_err());
    }

    #[test]
    fn plain_rejects_bad_base64_and_empty_user() {
        assert!(matches!(
            decode_plain("!!!"),
            Err(ProtocolError::Base64(_))
        ));
        assert!(decode_plain(&encode_plain("x", "", "pw")).is_err());
    }

    #[test]
    fn mechanism_parse() {
        assert_eq!(SaslMechanism::parse("plain"), SaslMechanism::Plain);
        assert_eq!(SaslMechanism::parse("EXTERNAL"), SaslMechanism::External);
        assert_eq!(
            SaslMechanism::parse("SCRAM-SHA-256").as_str(),
            "SCRAM-SHA-256"
        );
    }
}
