//! The `Connection` data model entity (§3): cluster coordinates plus
//! credential, immutable after construction.
//!
//! A `Connection` is assembled by an external collaborator — a kubeconfig
//! parser or service-account parser, both explicitly out of scope (§1) —
//! and handed to the runners in this crate. `ConnectionBuilder` performs no
//! file I/O; it only assembles values the caller already has in hand.
use std::{sync::Arc, time::Duration};

use crate::{
    auth::Credential,
    discovery::DiscoveryDriver,
    middleware::{BoxMiddleware, Middleware},
    registry::ConnectionRegistry,
};

/// How the connection manager should verify the server's TLS certificate.
#[derive(Debug, Clone)]
pub enum TlsVerification {
    /// Verify against `ca_certificate_pem`, falling back to the platform's
    /// trust store if none was supplied.
    Verify {
        /// PEM-encoded CA certificate bundle, if the caller has one.
        ca_certificate_pem: Option<String>,
    },
    /// Skip peer verification entirely. Overrides any CA certificate.
    InsecureSkipVerify,
}

impl Default for TlsVerification {
    fn default() -> Self {
        TlsVerification::Verify {
            ca_certificate_pem: None,
        }
    }
}

/// Cluster coordinates and credential, immutable after construction (§3).
#[derive(Clone)]
pub struct Connection {
    base_url: http::Uri,
    default_namespace: String,
    credential: Credential,
    tls: TlsVerification,
    middleware: Arc<[BoxMiddleware]>,
    discovery: Arc<dyn DiscoveryDriver>,
    registry: Arc<ConnectionRegistry>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl Connection {
    /// The API server's base URL, e.g. `https://10.0.0.1:6443`.
    pub fn base_url(&self) -> &http::Uri {
        &self.base_url
    }

    /// The namespace operations without an explicit one fall back to.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// The credential this connection authenticates with.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The TLS verification policy for this connection.
    pub fn tls_verification(&self) -> &TlsVerification {
        &self.tls
    }

    /// The ordered middleware stack applied to every request (§4.8).
    pub fn middleware(&self) -> &[BoxMiddleware] {
        &self.middleware
    }

    /// The discovery driver used to resolve resource descriptors.
    pub fn discovery(&self) -> &Arc<dyn DiscoveryDriver> {
        &self.discovery
    }

    /// The Connection Registry (C7) this connection checks out adapters
    /// from. Defaults to a private registry per built `Connection`; pass the
    /// same registry to [`ConnectionBuilder::registry`] across several
    /// `Connection`s that share a destination to pool adapters between them.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Per-request connect timeout, if configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Per-request read timeout, if configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Start building a connection for `base_url`.
    pub fn builder(base_url: http::Uri) -> ConnectionBuilder {
        ConnectionBuilder::new(base_url)
    }
}

/// Value-semantics builder for [`Connection`]. Every setter consumes and
/// returns `self`, matching the rest of the core's immutable-by-default
/// style (§4.3's `Operation` builders).
pub struct ConnectionBuilder {
    base_url: http::Uri,
    default_namespace: String,
    credential: Credential,
    tls: TlsVerification,
    middleware: Vec<BoxMiddleware>,
    discovery: Option<Arc<dyn DiscoveryDriver>>,
    registry: Option<Arc<ConnectionRegistry>>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl ConnectionBuilder {
    /// Start from a base URL with no credential, default middleware, and
    /// the `"default"` namespace.
    pub fn new(base_url: http::Uri) -> Self {
        Self {
            base_url,
            default_namespace: "default".to_string(),
            credential: Credential::Anonymous,
            tls: TlsVerification::default(),
            middleware: crate::middleware::default_stack(),
            discovery: None,
            registry: None,
            connect_timeout: None,
            read_timeout: None,
        }
    }

    /// Set the fallback namespace for unqualified operations.
    #[must_use]
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Set the credential this connection authenticates with.
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Set the TLS verification policy.
    #[must_use]
    pub fn tls_verification(mut self, tls: TlsVerification) -> Self {
        self.tls = tls;
        self
    }

    /// Append a middleware stage to the end of the stack (run last, closest
    /// to the wire).
    #[must_use]
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Replace the discovery driver (defaults to [`crate::discovery::HttpDiscoveryDriver`]
    /// if never set — see [`ConnectionBuilder::build`]).
    #[must_use]
    pub fn discovery_driver(mut self, driver: Arc<dyn DiscoveryDriver>) -> Self {
        self.discovery = Some(driver);
        self
    }

    /// Share an existing Connection Registry (C7) rather than building a
    /// private one. Connections built from the same kubeconfig context
    /// typically want to share one, so their adapters/pools are reused
    /// across `Connection` values rather than duplicated.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ConnectionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the per-request connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the per-request read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Finish building the connection, defaulting the discovery driver to
    /// an [`crate::discovery::HttpDiscoveryDriver`] against `base_url` if
    /// none was set.
    pub fn build(self) -> Connection {
        let discovery = self
            .discovery
            .unwrap_or_else(|| Arc::new(crate::discovery::HttpDiscoveryDriver::new()));
        let registry = self.registry.unwrap_or_else(|| Arc::new(ConnectionRegistry::new()));
        Connection {
            base_url: self.base_url,
            default_namespace: self.default_namespace,
            credential: self.credential,
            tls: self.tls,
            middleware: self.middleware.into(),
            discovery,
            registry,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_default_namespace_and_anonymous_credential() {
        let conn = Connection::builder("https://localhost:6443".parse().unwrap()).build();
        assert_eq!(conn.default_namespace(), "default");
        assert!(matches!(conn.credential(), Credential::Anonymous));
    }

    #[test]
    fn builder_is_immutable_once_built() {
        let conn = Connection::builder("https://localhost:6443".parse().unwrap())
            .default_namespace("kube-system")
            .credential(Credential::BearerToken(secrecy::SecretString::from("tok".to_string())))
            .build();
        assert_eq!(conn.default_namespace(), "kube-system");
    }
}
