//! Auth / Request Options (component C5): turns an opaque credential value
//! into per-request headers and TLS material.
//!
//! Acquiring a credential — parsing a kubeconfig, running an exec plugin,
//! refreshing a GCP/OIDC token — is explicitly out of scope for this crate
//! (§1 external-collaborator boundary). What lives here is the *interface*
//! those collaborators are expected to implement, plus the five built-in
//! variants §4.5 names and the order they're tried in.
use std::sync::Arc;

use futures::future::BoxFuture;
use http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Errors raised while resolving a [`Credential`] into request options.
/// These are always [`crate::Error::Configuration`] from the core's point of
/// view — a collaborator's credential failed to produce material, not a
/// transport or API failure.
#[derive(Error, Debug)]
pub enum AuthError {
    /// A bearer token or basic-auth secret contained bytes that are not a
    /// legal HTTP header value.
    #[error("credential value is not a legal header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// An external token source (auth-provider or exec plugin) failed to
    /// produce a token.
    #[error("token source failed: {0}")]
    TokenSource(String),
}

/// TLS material a credential may contribute, in addition to (or instead of)
/// headers: a client certificate and private key, PEM-encoded.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    /// PEM-encoded client certificate chain.
    pub certificate_pem: SecretString,
    /// PEM-encoded private key.
    pub private_key_pem: SecretString,
}

/// The result of resolving a [`Credential`]: headers to merge into the
/// request and, for client-certificate auth, TLS identity material.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Headers to add to (or overwrite on) the outgoing request.
    pub headers: Vec<(http::HeaderName, HeaderValue)>,
    /// Client TLS identity, present only for [`Credential::ClientCertificate`].
    pub tls_identity: Option<TlsIdentity>,
}

impl RequestOptions {
    fn bearer(token: &str) -> Result<Self, AuthError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        Ok(Self {
            headers: vec![(http::header::AUTHORIZATION, value)],
            tls_identity: None,
        })
    }
}

/// A pluggable external source of bearer tokens, implemented by a
/// collaborator outside this crate (an auth-provider refresher, an exec
/// plugin runner, an OIDC client). Called on every request that uses it, so
/// implementations are expected to cache internally.
pub trait TokenSource: std::fmt::Debug + Send + Sync {
    /// Produce the current token, refreshing it first if the implementation
    /// judges it close to expiry.
    fn token(&self) -> BoxFuture<'_, Result<SecretString, AuthError>>;
}

/// One of the five credential kinds §4.5 recognizes. Tried in the order
/// listed there by [`resolve`]; `Credential::All` applies that ordering to
/// the contained list, which is the common case (several auth methods
/// configured, first usable one wins).
#[derive(Debug, Clone)]
pub enum Credential {
    /// No credential: anonymous access.
    Anonymous,
    /// Client-certificate TLS identity, already loaded and PEM-encoded by
    /// the external collaborator that parsed the kubeconfig or service
    /// account mount.
    ClientCertificate(TlsIdentity),
    /// A static or externally-refreshed bearer token.
    BearerToken(SecretString),
    /// An auth-provider (`authProviders` in kubeconfig), refreshed through a
    /// caller-supplied [`TokenSource`].
    AuthProvider(Arc<dyn TokenSource>),
    /// An exec credential plugin, refreshed through a caller-supplied
    /// [`TokenSource`].
    ExecPlugin(Arc<dyn TokenSource>),
    /// HTTP Basic authentication.
    Basic {
        /// The username.
        username: String,
        /// The password.
        password: SecretString,
    },
    /// Try each credential in order, using the first one that resolves
    /// without declining. Mirrors §4.5's five-variant precedence when more
    /// than one is configured.
    All(Vec<Credential>),
}

/// Resolve `credential` into the headers/TLS material to attach to a
/// request. The connection's `insecure_skip_tls_verify` flag and CA trust
/// are handled separately by the connection manager (§4.5), not here.
pub async fn resolve(credential: &Credential) -> Result<RequestOptions, AuthError> {
    match credential {
        Credential::Anonymous => Ok(RequestOptions::default()),
        Credential::ClientCertificate(identity) => Ok(RequestOptions {
            headers: Vec::new(),
            tls_identity: Some(identity.clone()),
        }),
        Credential::BearerToken(token) => RequestOptions::bearer(token.expose_secret()),
        Credential::AuthProvider(source) | Credential::ExecPlugin(source) => {
            let token = source.token().await?;
            RequestOptions::bearer(token.expose_secret())
        }
        Credential::Basic { username, password } => {
            let raw = format!("{username}:{}", password.expose_secret());
            let encoded = base64_encode(raw.as_bytes());
            let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
            value.set_sensitive(true);
            Ok(RequestOptions {
                headers: vec![(http::header::AUTHORIZATION, value)],
                tls_identity: None,
            })
        }
        Credential::All(candidates) => {
            for candidate in candidates {
                if matches!(candidate, Credential::Anonymous) {
                    continue;
                }
                return Box::pin(resolve(candidate)).await;
            }
            Ok(RequestOptions::default())
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bearer_token_produces_sensitive_authorization_header() {
        let opts = resolve(&Credential::BearerToken(SecretString::from("abc123".to_string())))
            .await
            .unwrap();
        assert_eq!(opts.headers.len(), 1);
        assert_eq!(opts.headers[0].0, http::header::AUTHORIZATION);
        assert!(opts.headers[0].1.is_sensitive());
    }

    #[tokio::test]
    async fn basic_auth_encodes_username_password() {
        let opts = resolve(&Credential::Basic {
            username: "admin".to_string(),
            password: SecretString::from("hunter2".to_string()),
        })
        .await
        .unwrap();
        assert_eq!(opts.headers[0].1.to_str().unwrap(), "Basic YWRtaW46aHVudGVyMg==");
    }

    #[tokio::test]
    async fn all_skips_anonymous_candidates_in_order() {
        let opts = resolve(&Credential::All(vec![
            Credential::Anonymous,
            Credential::BearerToken(SecretString::from("tok".to_string())),
            Credential::Basic {
                username: "u".to_string(),
                password: SecretString::from("p".to_string()),
            },
        ]))
        .await
        .unwrap();
        assert_eq!(opts.headers[0].1.to_str().unwrap(), "Bearer tok");
    }
}
