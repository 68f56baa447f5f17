//! Error taxonomy for the connection manager, operation runner and streaming
//! runners (§7): `ApiError`, `HttpError`, `ConfigurationError`, plus the
//! pass-through `DiscoveryError`/`OperationError` from `kubeop-core`.
use thiserror::Error;

/// The Kubernetes `Status` object's canonical reason token, carried by
/// [`Error::Api`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiStatus {
    /// Human-readable message, e.g. `"pods \"nginx\" not found"`.
    #[serde(default)]
    pub message: String,
    /// Canonical machine reason, e.g. `"NotFound"`, `"Conflict"`, `"Invalid"`.
    #[serde(default)]
    pub reason: String,
    /// The HTTP status code the server also returned in-band.
    #[serde(default)]
    pub code: u16,
}

/// Errors surfaced by the connection manager and operation runner.
#[derive(Error, Debug)]
pub enum Error {
    /// The server responded with a Kubernetes `Status` object describing the
    /// failure (`reason`, `message`, `code`). Not retried by the core.
    #[error("api error: {0:?}")]
    Api(ApiStatus),

    /// A transport- or protocol-level failure: connection closed, TLS
    /// handshake failure, or a non-2xx response with no parseable body.
    #[error("http error: {0}")]
    Http(String),

    /// The connection pool had no available adapter within its checkout
    /// timeout.
    #[error("connection pool empty")]
    PoolExhausted,

    /// Building the request path or resolving the resource failed.
    #[error(transparent)]
    Discovery(#[from] kubeop_core::DiscoveryError),

    /// The operation was malformed or unsupported by the runner that
    /// received it.
    #[error(transparent)]
    Operation(#[from] kubeop_core::OperationError),

    /// An error raised by an external collaborator (e.g. the caller's
    /// `ConnectionBuilder` usage) rather than by the core itself.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A middleware in the default or caller-supplied stack rejected the
    /// request, identified by name.
    #[error("middleware {middleware} rejected the request: {cause}")]
    Middleware {
        /// The offending middleware's name, for diagnosis.
        middleware: &'static str,
        /// The underlying cause it reported.
        cause: String,
    },

    /// Failed to serialize a request body or deserialize a response body.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias used throughout `kubeop-client`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
