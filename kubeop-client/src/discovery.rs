//! Discovery Cache (component C4): resolves `(apiVersion, kind)` pairs to
//! [`ResourceDescriptor`]s via a pluggable driver, and turns a resolved
//! operation into a URL path through the Path Builder (C1).
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use futures::future::BoxFuture;
use kubeop_core::{
    discovery::ResourceDescriptor,
    operation::{Operation, OperationName},
    path, DiscoveryError,
};
use serde::Deserialize;

use crate::{connection::Connection, error::Error, runner};

/// A discovery document's `{"groupVersion": ..., "resources": [...]}` shape,
/// as returned by `/api/{v}` and `/apis/{gv}`.
#[derive(Debug, Deserialize)]
struct ApiResourceList {
    #[serde(rename = "groupVersion")]
    group_version: String,
    resources: Vec<ApiResource>,
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    name: String,
    kind: String,
    namespaced: bool,
    verbs: Vec<String>,
}

/// The `/api` document: `{"versions": [...]}`.
#[derive(Debug, Deserialize)]
struct ApiVersions {
    versions: Vec<String>,
}

/// The `/apis` document: `{"groups": [{"name": ..., "versions": [{"groupVersion": ...}, ...]}]}`.
#[derive(Debug, Deserialize)]
struct ApiGroupList {
    groups: Vec<ApiGroup>,
}

#[derive(Debug, Deserialize)]
struct ApiGroup {
    versions: Vec<ApiGroupVersion>,
}

#[derive(Debug, Deserialize)]
struct ApiGroupVersion {
    #[serde(rename = "groupVersion")]
    group_version: String,
}

fn list_to_descriptors(doc: ApiResourceList) -> Vec<ResourceDescriptor> {
    doc.resources
        .into_iter()
        // subresources (`pods/exec`, `pods/status`, ...) are not independently
        // discoverable resources; the Path Builder derives their path from the
        // owning resource's descriptor plus `OperationName::subresource`.
        .filter(|r| !r.name.contains('/'))
        .map(|r| ResourceDescriptor::new(r.kind, r.name, r.namespaced).with_verbs(r.verbs))
        .collect()
}

/// Pluggable source of discovery metadata: given a connection, enumerate
/// served `apiVersion`s, and for a given `apiVersion`, enumerate the
/// resources it serves.
///
/// Two built-in implementations are provided: [`HttpDiscoveryDriver`] (issues
/// requests against `/api`/`/apis`) and [`StaticDiscoveryDriver`] (serves a
/// fixed, caller-supplied map; intended for tests).
pub trait DiscoveryDriver: Send + Sync {
    /// Enumerate every `apiVersion` the cluster serves.
    fn versions<'a>(&'a self, conn: &'a Connection) -> BoxFuture<'a, Result<Vec<String>, Error>>;

    /// Enumerate the resources served under `api_version`.
    fn resources<'a>(
        &'a self,
        api_version: &'a str,
        conn: &'a Connection,
    ) -> BoxFuture<'a, Result<Vec<ResourceDescriptor>, Error>>;
}

/// Resolve `op`'s target against `conn`'s discovery driver and build the
/// absolute request path. This is the single entry point the Request Runner
/// (C8) and the streaming runners (C9/C10/C11) use to go from an
/// [`Operation`] to a URL path.
pub async fn url_for(conn: &Connection, op: &Operation) -> Result<String, Error> {
    let descriptors = conn.discovery().resources(op.api_version(), conn).await?;
    let descriptor = find_descriptor(&descriptors, op.name())
        .ok_or_else(|| DiscoveryError::UnsupportedResource(op.name().resource_key().to_string()))?;

    let verb = op.verb();
    if !descriptor.supports(verb.discovery_verb()) {
        return Err(DiscoveryError::UnsupportedVerb {
            kind: descriptor.kind.clone(),
            verb,
        }
        .into());
    }

    path::build_path(op.api_version(), descriptor, verb, op.name(), op.path_params())
        .map_err(kubeop_core::OperationError::from)
        .map_err(Error::from)
}

/// Find the descriptor matching `name`'s resource-identifying portion
/// (`kind`, `restName`, or the owning kind of a `{kind, subKind}` pair).
fn find_descriptor<'a>(descriptors: &'a [ResourceDescriptor], name: &OperationName) -> Option<&'a ResourceDescriptor> {
    let key = name.resource_key();
    descriptors
        .iter()
        .find(|d| d.kind == key || d.rest_name == key)
}

/// Issues discovery requests against `/api` and `/apis` (and their
/// per-group-version children) through the same Connection Registry/Adapter
/// the Request Runner uses, and caches the results in process for the
/// lifetime of the driver (§4.4: "caches results in process-wide state keyed
/// by connection identity").
#[derive(Default)]
pub struct HttpDiscoveryDriver {
    cache: RwLock<HashMap<String, Vec<ResourceDescriptor>>>,
}

impl HttpDiscoveryDriver {
    /// Construct a driver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached entry, forcing the next lookup to re-query the
    /// server. Exposed for test isolation and for callers that know the
    /// cluster's discovery document changed (e.g. a CRD was just installed).
    pub fn invalidate(&self) {
        self.cache.write().expect("discovery cache lock poisoned").clear();
    }
}

impl DiscoveryDriver for HttpDiscoveryDriver {
    fn versions<'a>(&'a self, conn: &'a Connection) -> BoxFuture<'a, Result<Vec<String>, Error>> {
        Box::pin(async move {
            let mut versions = Vec::new();

            let core: ApiVersions = runner::get_raw(conn, "/api").await?;
            versions.extend(core.versions);

            let groups: ApiGroupList = runner::get_raw(conn, "/apis").await?;
            for group in groups.groups {
                versions.extend(group.versions.into_iter().map(|v| v.group_version));
            }

            Ok(versions)
        })
    }

    fn resources<'a>(
        &'a self,
        api_version: &'a str,
        conn: &'a Connection,
    ) -> BoxFuture<'a, Result<Vec<ResourceDescriptor>, Error>> {
        Box::pin(async move {
            if let Some(cached) = self
                .cache
                .read()
                .expect("discovery cache lock poisoned")
                .get(api_version)
            {
                return Ok(cached.clone());
            }

            let gv: kubeop_core::GroupVersion = api_version.parse().map_err(|_| {
                Error::from(DiscoveryError::NotDiscovered {
                    api_version: api_version.to_string(),
                    name: String::new(),
                })
            })?;
            let path = if gv.is_core() {
                format!("/api/{api_version}")
            } else {
                format!("/apis/{api_version}")
            };

            let doc: ApiResourceList = runner::get_raw(conn, &path).await?;
            let descriptors = list_to_descriptors(doc);

            self.cache
                .write()
                .expect("discovery cache lock poisoned")
                .insert(api_version.to_string(), descriptors.clone());
            Ok(descriptors)
        })
    }
}

/// Serves a fixed, caller-supplied `apiVersion -> [ResourceDescriptor]` map
/// with no network I/O. Intended for tests and for embedding in binaries
/// that ship a static discovery snapshot rather than querying a live API
/// server.
#[derive(Debug, Default, Clone)]
pub struct StaticDiscoveryDriver {
    resources: HashMap<String, Vec<ResourceDescriptor>>,
}

impl StaticDiscoveryDriver {
    /// Construct an empty static driver; populate with [`Self::with_resources`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the resources served under `api_version`, returning `self`
    /// for chaining.
    #[must_use]
    pub fn with_resources(mut self, api_version: impl Into<String>, resources: Vec<ResourceDescriptor>) -> Self {
        self.resources.insert(api_version.into(), resources);
        self
    }
}

impl DiscoveryDriver for StaticDiscoveryDriver {
    fn versions<'a>(&'a self, _conn: &'a Connection) -> BoxFuture<'a, Result<Vec<String>, Error>> {
        Box::pin(async move { Ok(self.resources.keys().cloned().collect()) })
    }

    fn resources<'a>(
        &'a self,
        api_version: &'a str,
        _conn: &'a Connection,
    ) -> BoxFuture<'a, Result<Vec<ResourceDescriptor>, Error>> {
        Box::pin(async move { Ok(self.resources.get(api_version).cloned().unwrap_or_default()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeop_core::operation::{PathParams, Verb};

    fn static_driver() -> Arc<StaticDiscoveryDriver> {
        Arc::new(StaticDiscoveryDriver::new().with_resources(
            "apps/v1",
            vec![ResourceDescriptor::new("Deployment", "deployments", true)
                .with_verbs(["get", "list", "create", "update", "patch", "delete"])],
        ))
    }

    fn conn_with(driver: Arc<dyn DiscoveryDriver>) -> Connection {
        Connection::builder("https://localhost:6443".parse().unwrap())
            .discovery_driver(driver)
            .build()
    }

    #[tokio::test]
    async fn resolves_url_for_known_resource() {
        let conn = conn_with(static_driver());
        let op = Operation::build(
            Verb::Get,
            "apps/v1",
            "Deployment",
            PathParams::namespaced("default", "nginx"),
            None,
        );
        let url = url_for(&conn, &op).await.unwrap();
        assert_eq!(url, "/apis/apps/v1/namespaces/default/deployments/nginx");
    }

    #[tokio::test]
    async fn unsupported_verb_is_rejected_before_path_building() {
        let conn = conn_with(static_driver());
        let op = Operation::build(
            Verb::DeleteCollection,
            "apps/v1",
            "Deployment",
            PathParams::default(),
            None,
        );
        let err = url_for(&conn, &op).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(DiscoveryError::UnsupportedVerb { .. })));
    }

    #[tokio::test]
    async fn unknown_resource_is_not_discovered() {
        let conn = conn_with(static_driver());
        let op = Operation::build(Verb::Get, "apps/v1", "StatefulSet", PathParams::default(), None);
        let err = url_for(&conn, &op).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(DiscoveryError::UnsupportedResource(_))));
    }
}
