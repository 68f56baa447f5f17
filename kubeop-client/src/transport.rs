//! TCP+TLS connection establishment and ALPN protocol negotiation.
//!
//! This is the one piece of the HTTP Adapter (C6) that touches the network
//! directly: everything above this layer (request multiplexing, pooling,
//! response-part delivery) is transport-agnostic over the
//! [`hyper::client::conn`] primitives this module hands back.
use std::sync::Arc;

use tokio::net::TcpStream;

use crate::{connection::TlsVerification, error::Error};

/// Which HTTP protocol version a transport negotiated, via ALPN for TLS
/// connections or a fixed default for plaintext ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedProtocol {
    /// HTTP/1.1: the Connection Registry (C7) pools adapters for this case.
    Http1,
    /// HTTP/2: the Connection Registry (C7) shares a single adapter.
    Http2,
}

/// The destination a [`crate::registry::ConnectionRegistry`] keys its
/// adapters/pools by: scheme, host, port, and the parts of `ConnectionOpts`
/// that affect the transport (TLS verification policy).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    /// `"http"` or `"https"`.
    pub scheme: String,
    /// Hostname or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Whether this destination skips TLS peer verification; folded into the
    /// key so a registry never confuses a verified and an unverified
    /// connection to the same host.
    pub insecure_skip_tls_verify: bool,
}

impl DestinationKey {
    /// Derive the destination key a [`crate::connection::Connection`]'s base
    /// URL resolves to.
    pub fn from_uri(uri: &http::Uri, tls: &TlsVerification) -> Result<Self, Error> {
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| Error::Configuration("base URL has no scheme".to_string()))?
            .to_string();
        let host = uri
            .host()
            .ok_or_else(|| Error::Configuration("base URL has no host".to_string()))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if scheme == "https" { 443 } else { 80 });
        let insecure_skip_tls_verify = matches!(tls, TlsVerification::InsecureSkipVerify);
        Ok(Self {
            scheme,
            host,
            port,
            insecure_skip_tls_verify,
        })
    }
}

/// Open a TCP connection to `key` and, for `https`, perform a TLS handshake,
/// returning the negotiated protocol alongside the stream.
///
/// This is deliberately a thin wrapper: production deployments that need
/// SOCKS5 proxying or mTLS client identities layer those concerns in by
/// swapping the `rustls-tls`/`openssl-tls`/`socks5` cargo features.
pub async fn connect(
    key: &DestinationKey,
    ca_certificate_pem: Option<&str>,
) -> Result<(NegotiatedProtocol, tokio_rustls::client::TlsStream<TcpStream>), Error> {
    let tcp = TcpStream::connect((key.host.as_str(), key.port))
        .await
        .map_err(|e| Error::Http(format!("tcp connect to {}:{} failed: {e}", key.host, key.port)))?;
    tcp.set_nodelay(true)
        .map_err(|e| Error::Http(format!("failed to set TCP_NODELAY: {e}")))?;

    if key.scheme != "https" {
        return Err(Error::Configuration(
            "plaintext (non-TLS) API servers are not supported".to_string(),
        ));
    }

    let tls_config = build_rustls_config(key.insecure_skip_tls_verify, ca_certificate_pem)?;
    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
    let server_name = rustls_pki_types::ServerName::try_from(key.host.clone())
        .map_err(|e| Error::Configuration(format!("invalid server name {:?}: {e}", key.host)))?;
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Http(format!("TLS handshake failed: {e}")))?;

    let negotiated = match tls_stream.get_ref().1.alpn_protocol() {
        Some(proto) if proto == b"h2" => NegotiatedProtocol::Http2,
        _ => NegotiatedProtocol::Http1,
    };

    Ok((negotiated, tls_stream))
}

fn build_rustls_config(
    insecure_skip_tls_verify: bool,
    ca_certificate_pem: Option<&str>,
) -> Result<rustls::ClientConfig, Error> {
    let builder = rustls::ClientConfig::builder();

    let mut config = if insecure_skip_tls_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        if let Some(pem) = ca_certificate_pem {
            for cert in rustls_pemfile::certs(&mut pem.as_bytes()) {
                let cert = cert.map_err(|e| Error::Configuration(format!("invalid CA certificate: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| Error::Configuration(format!("invalid CA certificate: {e}")))?;
            }
        } else {
            // No CA supplied: fall through to the platform trust store.
            let native = rustls_native_certs::load_native_certs();
            for err in native.errors {
                tracing::warn!(%err, "failed to load a native root certificate");
            }
            roots.add_parsable_certificates(native.certs);
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Accepts every certificate; backs [`TlsVerification::InsecureSkipVerify`].
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_key_defaults_https_port() {
        let uri: http::Uri = "https://10.0.0.1".parse().unwrap();
        let key = DestinationKey::from_uri(&uri, &TlsVerification::default()).unwrap();
        assert_eq!(key.port, 443);
        assert_eq!(key.host, "10.0.0.1");
        assert!(!key.insecure_skip_tls_verify);
    }

    #[test]
    fn destination_key_folds_in_insecure_flag() {
        let uri: http::Uri = "https://10.0.0.1:6443".parse().unwrap();
        let key = DestinationKey::from_uri(&uri, &TlsVerification::InsecureSkipVerify).unwrap();
        assert!(key.insecure_skip_tls_verify);
        assert_eq!(key.port, 6443);
    }
}
