//! Uplink transport: plain TCP or TLS.

use crate::config::UplinkConfig;
use crate::error::SessionError;
use crate::security::{fingerprints_match, normalize_fingerprint};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
};
use tracing::{error, info, warn};

/// The uplink socket.
pub enum S2sStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl S2sStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for S2sStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            S2sStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            S2sStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for S2sStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            S2sStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            S2sStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            S2sStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            S2sStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            S2sStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            S2sStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Open the uplink socket, upgrading to TLS when configured.
pub async fn connect(uplink: &UplinkConfig) -> Result<S2sStream, SessionError> {
    let tcp = TcpStream::connect((uplink.host.as_str(), uplink.port)).await?;
    tcp.set_nodelay(true)?;
    info!(host = %uplink.host, port = uplink.port, tls = uplink.tls, "connected to uplink");
    if !uplink.tls {
        return Ok(S2sStream::Plain(tcp));
    }
    let stream = upgrade_to_tls(tcp, uplink).await?;
    Ok(S2sStream::Tls(Box::new(stream)))
}

async fn upgrade_to_tls(
    tcp: TcpStream,
    uplink: &UplinkConfig,
) -> Result<TlsStream<TcpStream>, SessionError> {
    let builder = if uplink.verify_cert {
        ClientConfig::builder().with_root_certificates(native_roots())
    } else {
        warn!(host = %uplink.host, "uplink certificate verification disabled");
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousNoVerifier))
    };

    let config = match (&uplink.client_cert, &uplink.client_key) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|e| SessionError::Tls(format!("client certificate rejected: {e}")))?,
        _ => builder.with_no_client_auth(),
    };

    let server_name = ServerName::try_from(uplink.host.clone())
        .map_err(|e| SessionError::Tls(format!("invalid server name {}: {e}", uplink.host)))?;
    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await?;

    if let Some(expected) = &uplink.cert_fingerprint {
        let (_, conn) = stream.get_ref();
        let actual = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| certificate_fingerprint(cert.as_ref()))
            .ok_or_else(|| SessionError::Tls("uplink presented no certificate".into()))?;
        if !fingerprints_match(expected, &actual) {
            error!(
                host = %uplink.host,
                expected = %normalize_fingerprint(expected),
                actual = %actual,
                "uplink certificate fingerprint mismatch"
            );
            return Err(SessionError::Tls("certificate fingerprint mismatch".into()));
        }
        info!(host = %uplink.host, fingerprint = %actual, "uplink certificate pinned");
    }

    info!(host = %uplink.host, verify = uplink.verify_cert, "TLS handshake complete");
    Ok(stream)
}

/// Lowercase hex SHA-256 of a DER certificate.
pub fn certificate_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for cert in loaded.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "skipping unusable root certificate");
        }
    }
    for e in &loaded.errors {
        warn!(error = %e, "error loading native certificates");
    }
    roots
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, SessionError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(SessionError::Tls(format!("no certificates in {path}")));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, SessionError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| SessionError::Tls(format!("no private key in {path}")))
}

/// Accepts any server certificate. Only used with `verify_cert = false`,
/// typically together with a fingerprint pin.
#[derive(Debug)]
struct DangerousNoVerifier;

impl ServerCertVerifier for DangerousNoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_lowercase_sha256() {
        let fp = certificate_fingerprint(b"abc");
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(fingerprints_match(&fp.to_uppercase(), &fp));
    }

    #[test]
    fn missing_client_cert_is_io_error() {
        assert!(matches!(
            load_certs("/nonexistent/client.pem"),
            Err(SessionError::Io(_))
        ));
    }
}
