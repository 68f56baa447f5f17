//! Connection manager, operation runner and streaming runners for the
//! `kubeop` Kubernetes client core.
//!
//! This crate is the I/O half of the split described in the workspace's
//! design notes: [`kubeop_core`] describes operations and resources as pure
//! data, this crate turns them into dispatched HTTP/WebSocket traffic.
//!
//! - [`connection`] / [`auth`] — the `Connection` data model entity (§3) and
//!   the pluggable `Credential`/`DiscoveryDriver` traits external
//!   collaborators implement (§4.5, §4.4).
//! - [`transport`] / [`adapter`] / [`registry`] — the HTTP Adapter (C6) and
//!   Connection Registry (C7): one mailbox-driven task per destination,
//!   pooled for HTTP/1.1 and shared for HTTP/2.
//! - [`middleware`] / [`runner`] — the Request Runner (C8): resolves a path
//!   via [`discovery`], runs the middleware stack, dispatches, and decodes
//!   the response.
//! - [`list_stream`] / [`watch_stream`] / [`exec_stream`] — the three
//!   streaming runners (C9/C10/C11).
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod auth;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod exec_stream;
pub mod list_stream;
pub mod middleware;
pub mod registry;
pub mod runner;
pub mod transport;
pub mod watch_stream;

pub use auth::Credential;
pub use connection::{Connection, ConnectionBuilder, TlsVerification};
pub use discovery::{DiscoveryDriver, HttpDiscoveryDriver, StaticDiscoveryDriver};
pub use error::Error;
pub use exec_stream::{ExecOptions, ExecSession, LogOptions};
pub use list_stream::list;
pub use registry::ConnectionRegistry;
pub use watch_stream::{watch, WatchEvent, WatchEventKind};
