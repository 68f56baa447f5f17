//! Core data model for `kubeop`: operations, label selectors, path building
//! and discovery types, shared by every runner in `kubeop-client`.
//!
//! Resources are represented as untyped `serde_json::Value` maps rather than
//! generated Kubernetes structs; see [`dynamic`] for the accessors this
//! implies.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod discovery;
pub mod dynamic;
pub mod error;
pub mod gvk;
pub mod operation;
pub mod params;
pub mod path;
pub mod selector;

pub use discovery::ResourceDescriptor;
pub use error::{DiscoveryError, OperationError, PathError};
pub use gvk::GroupVersion;
pub use operation::{Operation, OperationName, PathParams, QueryValue, Verb};
pub use params::{DeleteParams, Patch, PatchParams, Preconditions, PropagationPolicy, ValidationDirective};
pub use selector::Selector;
