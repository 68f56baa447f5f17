//! Error types shared by the core data model.
use thiserror::Error;

/// Errors produced while building a REST path from a [`crate::ResourceDescriptor`]
/// and a set of path parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A placeholder in the path template had no matching entry in `pathParams`.
    #[error("missing path parameter: {0}")]
    MissingParam(&'static str),

    /// A placeholder survived substitution; the caller supplied an
    /// unrecognized or malformed path parameter set.
    #[error("unresolved path placeholder: {0}")]
    UnresolvedPlaceholder(String),
}

/// Errors produced while constructing or validating an [`crate::Operation`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The operation's verb is not supported by the resource descriptor it
    /// was resolved against.
    #[error("verb {verb:?} is not supported by resource {kind}")]
    UnsupportedVerb {
        /// The verb that was rejected.
        verb: crate::operation::Verb,
        /// The resource kind it was rejected for.
        kind: String,
    },

    /// A runner received an operation it cannot execute (e.g. a streaming
    /// runner invoked with a non-streaming verb).
    #[error("operation with verb {0:?} is not valid for this runner")]
    InvalidForRunner(crate::operation::Verb),

    /// Building the request path failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// The operation required a body but none was supplied, or vice versa.
    #[error("operation with verb {0:?} requires a request body")]
    MissingBody(crate::operation::Verb),
}

/// Errors produced while resolving `(apiVersion, kind)` to a
/// [`crate::ResourceDescriptor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// No resource matching the given apiVersion/kind/subresource was found.
    #[error("no resource discovered for {api_version}/{name}")]
    NotDiscovered {
        /// The apiVersion that was queried.
        api_version: String,
        /// The kind or `{resource}/{subresource}` name that was queried.
        name: String,
    },

    /// The resource was found, but does not support the requested verb.
    #[error("resource {kind} does not support verb {verb:?}")]
    UnsupportedVerb {
        /// The resource kind.
        kind: String,
        /// The rejected verb.
        verb: crate::operation::Verb,
    },

    /// The resource named in the operation could not be matched against any
    /// descriptor known to the cache.
    #[error("resource {0} is not recognized")]
    UnsupportedResource(String),
}
