//! A discovery-driven, multiplexed Kubernetes API client core.
//!
//! This crate is a thin facade over [`kubeop_core`] (operations, selectors
//! and resources as pure data) and [`kubeop_client`] (the connection
//! manager, request runner, and the list/watch/exec streaming runners). It
//! re-exports the pieces most callers need and adds nothing of its own.
//!
//! ```no_run
//! use kubeop::prelude::*;
//!
//! # async fn run() -> Result<(), kubeop::Error> {
//! let conn = Connection::builder("https://localhost:6443".parse().unwrap())
//!     .credential(Credential::BearerToken("...".to_string().into()))
//!     .build();
//!
//! let op = Operation::build(
//!     Verb::List,
//!     "v1",
//!     "pods",
//!     PathParams {
//!         namespace: Some("default".to_string()),
//!         ..Default::default()
//!     },
//!     None,
//! );
//! let pods = kubeop::run(&conn, &op).await?;
//! # let _ = pods;
//! # Ok(())
//! # }
//! ```
//!
//! A `Connection` is assembled by an external collaborator (a kubeconfig or
//! service-account parser); this crate does no file I/O and reads no
//! environment variables on its own.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub use kubeop_core::{
    discovery as discovery_types, dynamic, error as core_error, gvk, operation, params, path, selector,
    DeleteParams, DiscoveryError, GroupVersion, Operation, OperationError, OperationName, Patch, PathError,
    PathParams, PatchParams, Preconditions, PropagationPolicy, QueryValue, ResourceDescriptor, Selector, Verb,
    ValidationDirective,
};

pub use kubeop_client::{
    adapter, auth, connection, discovery, error, exec_stream, list_stream, middleware, registry, runner,
    transport, watch_stream, Connection, ConnectionBuilder, ConnectionRegistry, Credential, DiscoveryDriver,
    Error, ExecOptions, ExecSession, HttpDiscoveryDriver, LogOptions, StaticDiscoveryDriver, TlsVerification,
    WatchEvent, WatchEventKind,
};

pub use kubeop_client::{list_stream::list, runner::run, watch_stream::watch};

/// Re-exports the common entities of the data model and connection manager
/// for `use kubeop::prelude::*;` at a call site.
pub mod prelude {
    pub use crate::{
        Connection, ConnectionBuilder, Credential, DeleteParams, Error, ExecOptions, ExecSession, LogOptions,
        Operation, OperationName, Patch, PathParams, PatchParams, Preconditions, PropagationPolicy, QueryValue,
        Selector, TlsVerification, Verb, WatchEvent, WatchEventKind,
    };
    pub use crate::{list, run, watch};
}
