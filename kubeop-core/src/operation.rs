//! Canonical representation of one Kubernetes REST operation (component C3).
use std::collections::BTreeMap;

use serde_json::Value;

use crate::selector::Selector;

/// The Kubernetes action taxonomy an [`Operation`] can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verb {
    /// Fetch a single named resource.
    Get,
    /// List a collection of resources within a namespace (or cluster-scoped).
    List,
    /// List a collection of resources across all namespaces.
    ListAllNamespaces,
    /// Stream change events for a collection within a namespace.
    Watch,
    /// Stream change events for a collection across all namespaces.
    WatchAllNamespaces,
    /// Create a new resource.
    Create,
    /// Replace an existing resource in full.
    Update,
    /// Apply a partial patch to a resource.
    Patch,
    /// Server-side apply.
    Apply,
    /// Delete a single named resource.
    Delete,
    /// Delete every resource in a collection.
    DeleteCollection,
    /// Open a streaming connection to a subresource (`pods/exec`, `pods/log`, ...).
    Connect,
}

impl Verb {
    /// The HTTP method this verb is dispatched as.
    pub fn method(self) -> http::Method {
        match self {
            Verb::Get | Verb::List | Verb::ListAllNamespaces | Verb::Watch | Verb::WatchAllNamespaces => {
                http::Method::GET
            }
            Verb::Create | Verb::Apply => http::Method::POST,
            Verb::Update => http::Method::PUT,
            Verb::Patch => http::Method::PATCH,
            Verb::Delete | Verb::DeleteCollection => http::Method::DELETE,
            Verb::Connect => http::Method::GET,
        }
    }

    /// The discovery verb token (§4.4) this `Verb` is checked against. Both
    /// namespace-scoped and all-namespace list/watch variants check the
    /// same underlying discovery verb.
    pub fn discovery_verb(self) -> &'static str {
        use crate::discovery::verbs;
        match self {
            Verb::Get => verbs::GET,
            Verb::List | Verb::ListAllNamespaces => verbs::LIST,
            Verb::Watch | Verb::WatchAllNamespaces => verbs::WATCH,
            Verb::Create | Verb::Apply => verbs::CREATE,
            Verb::Update => verbs::UPDATE,
            Verb::Patch => verbs::PATCH,
            Verb::Delete => verbs::DELETE,
            Verb::DeleteCollection => verbs::DELETE_COLLECTION,
            Verb::Connect => verbs::GET,
        }
    }

    /// `true` for the two "all namespaces" variants, used by the path
    /// builder to decide whether to omit the namespace segment.
    pub fn is_all_namespaces(self) -> bool {
        matches!(self, Verb::ListAllNamespaces | Verb::WatchAllNamespaces)
    }

    /// `true` for verbs dispatched against a resource collection rather than
    /// a single named resource.
    pub fn is_collection_scoped(self) -> bool {
        matches!(
            self,
            Verb::Create | Verb::List | Verb::ListAllNamespaces | Verb::DeleteCollection | Verb::WatchAllNamespaces
        )
    }

    /// `true` for verbs whose HTTP method carries a request body.
    pub fn is_body_bearing(self) -> bool {
        matches!(self.method(), m if m == http::Method::POST || m == http::Method::PUT || m == http::Method::PATCH)
    }
}

/// The target of an [`Operation`]: either a bare Kind (`"Deployment"`), a
/// `"{resource}/{subresource}"` pair (`"pods/exec"`), or an explicit
/// `{kind, subKind}` pair used by subresource creates such as eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationName {
    /// A plain resource kind, e.g. `Deployment`.
    Kind(String),
    /// A subresource addressed as `resource/subresource`, e.g. `pods/exec`.
    Subresource {
        /// The owning resource's kind or plural name.
        resource: String,
        /// The subresource name, e.g. `exec`, `log`, `status`.
        subresource: String,
    },
    /// A subresource create for a specific owning kind, e.g. creating an
    /// `Eviction` under a `Pod`.
    KindWithSubKind {
        /// The owning resource's kind.
        kind: String,
        /// The subresource kind being created.
        sub_kind: String,
    },
}

impl OperationName {
    /// Parse either a bare kind or a `"resource/subresource"` string into an
    /// [`OperationName`].
    pub fn parse(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.split_once('/') {
            Some((resource, subresource)) => OperationName::Subresource {
                resource: resource.to_string(),
                subresource: subresource.to_string(),
            },
            None => OperationName::Kind(name),
        }
    }

    /// The resource-identifying portion: the kind for [`OperationName::Kind`]
    /// and [`OperationName::KindWithSubKind`], or the resource for
    /// [`OperationName::Subresource`].
    pub fn resource_key(&self) -> &str {
        match self {
            OperationName::Kind(k) => k,
            OperationName::Subresource { resource, .. } => resource,
            OperationName::KindWithSubKind { kind, .. } => kind,
        }
    }

    /// The subresource segment, if any.
    pub fn subresource(&self) -> Option<&str> {
        match self {
            OperationName::Subresource { subresource, .. } => Some(subresource),
            OperationName::KindWithSubKind { sub_kind, .. } => Some(sub_kind),
            OperationName::Kind(_) => None,
        }
    }
}

/// A single query-parameter value. Kubernetes query parameters are either
/// plain strings, repeated values (e.g. exec's `command`), or bare booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// A single string value.
    Str(String),
    /// A repeated-key value, serialized as one `key=value` pair per element.
    Array(Vec<String>),
    /// A boolean, serialized as the literal `true`/`false`.
    Bool(bool),
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::Str(s.to_string())
    }
}
impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::Str(s)
    }
}
impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        QueryValue::Bool(b)
    }
}
impl From<Vec<String>> for QueryValue {
    fn from(v: Vec<String>) -> Self {
        QueryValue::Array(v)
    }
}

/// Path parameters recognized by the Path Builder (C1): `namespace`, `name`,
/// and the two subresource-path placeholders used by `pods/exec`'s
/// `path`/`logpath` options (Kubernetes uses these for the `proxy`
/// subresource's arbitrary path suffix).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    /// `{namespace}` placeholder.
    pub namespace: Option<String>,
    /// `{name}` placeholder.
    pub name: Option<String>,
    /// `{path}` placeholder (proxy subresource).
    pub path: Option<String>,
    /// `{logpath}` placeholder (log subresource).
    pub logpath: Option<String>,
}

impl PathParams {
    /// Convenience constructor for the common `{namespace, name}` case.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }
}

/// Immutable description of one request: verb, apiVersion, target name,
/// path parameters, body, query parameters, and an optional structured
/// selector. Value semantics: every mutator consumes `self` and returns a
/// new `Operation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    verb: Verb,
    api_version: String,
    name: OperationName,
    path_params: PathParams,
    data: Option<Value>,
    query_params: BTreeMap<String, QueryValue>,
    selector: Option<Selector>,
}

impl Operation {
    /// Explicit constructor: verb, apiVersion, target name (kind or
    /// `resource/subresource`), path parameters, and an optional body.
    pub fn build(
        verb: Verb,
        api_version: impl Into<String>,
        name_or_kind: impl Into<String>,
        path_params: PathParams,
        body: Option<Value>,
    ) -> Self {
        Self {
            verb,
            api_version: api_version.into(),
            name: OperationName::parse(name_or_kind),
            path_params,
            data: body,
            query_params: BTreeMap::new(),
            selector: None,
        }
    }

    /// Infer `apiVersion`, kind, namespace and name from a resource map's
    /// `apiVersion`/`kind`/`metadata.{namespace,name}` fields.
    pub fn build_from_resource(verb: Verb, resource: &Value) -> Self {
        let api_version = resource
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let kind = resource
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = resource.get("metadata");
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let path_params = PathParams {
            namespace,
            name,
            ..Default::default()
        };
        let body = verb.is_body_bearing().then(|| resource.clone());

        Self::build(verb, api_version, kind, path_params, body)
    }

    /// Build a `connect` operation for `pods/exec`/`pods/log`, attaching the
    /// caller-supplied exec/log options as query parameters.
    pub fn connect(
        api_version: impl Into<String>,
        name: impl Into<String>,
        path_params: PathParams,
        opts: impl IntoIterator<Item = (&'static str, QueryValue)>,
    ) -> Self {
        let mut op = Self::build(Verb::Connect, api_version, name, path_params, None);
        for (k, v) in opts {
            op = op.put_query_param(k, v);
        }
        op
    }

    /// The action this operation performs.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The target apiVersion, e.g. `"apps/v1"`.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// The target name (kind, subresource pair, or kind/subkind pair).
    pub fn name(&self) -> &OperationName {
        &self.name
    }

    /// The path parameters supplied for this operation.
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// The request body, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// The structured selector attached to this operation, if any.
    pub fn selector(&self) -> Option<&Selector> {
        self.selector.as_ref()
    }

    /// All query parameters, including `labelSelector` merged in from
    /// [`Operation::selector`] at read time.
    pub fn query_params(&self) -> BTreeMap<String, QueryValue> {
        let mut qp = self.query_params.clone();
        if let Some(sel) = &self.selector {
            if !sel.is_empty() {
                let merged = match qp.remove("labelSelector") {
                    Some(QueryValue::Str(existing)) if !existing.is_empty() => {
                        format!("{existing},{}", sel.serialize())
                    }
                    _ => sel.serialize(),
                };
                qp.insert("labelSelector".to_string(), QueryValue::Str(merged));
            }
        }
        qp
    }

    /// Set a single query parameter, returning a new `Operation`.
    #[must_use]
    pub fn put_query_param(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Attach a structured [`Selector`] to be merged into `labelSelector` at
    /// serialization time, returning a new `Operation`.
    #[must_use]
    pub fn put_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(match self.selector {
            Some(existing) => existing.merge(selector),
            None => selector,
        });
        self
    }

    /// Set the raw `labelSelector` query parameter directly (bypassing the
    /// structured [`Selector`] builder), returning a new `Operation`.
    #[must_use]
    pub fn put_label_selector(self, raw: impl Into<String>) -> Self {
        self.put_query_param("labelSelector", raw.into())
    }

    /// Replace the request body, returning a new `Operation`. Used by
    /// [`crate::params::Patch`] and [`crate::params::DeleteParams`] to attach
    /// their wire bodies to an otherwise-bodyless operation.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Replace the path parameters, returning a new `Operation`. Used by the
    /// List Stream (C9) to fold a path `name` into `fieldSelector` and drop
    /// it from the path (§4.9).
    #[must_use]
    pub fn with_path_params(mut self, path_params: PathParams) -> Self {
        self.path_params = path_params;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_from_resource_infers_coordinates() {
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"namespace": "default", "name": "nginx"},
        });
        let op = Operation::build_from_resource(Verb::Get, &pod);
        assert_eq!(op.api_version(), "v1");
        assert_eq!(op.name().resource_key(), "Pod");
        assert_eq!(op.path_params().namespace.as_deref(), Some("default"));
        assert_eq!(op.path_params().name.as_deref(), Some("nginx"));
    }

    #[test]
    fn selector_merges_into_label_selector_query_param() {
        use crate::selector::Selector;
        let op = Operation::build(Verb::List, "v1", "Pod", PathParams::default(), None)
            .put_selector(Selector::new().label("app", "nginx").label_in("env", ["qa", "prod"]));
        let qp = op.query_params();
        assert_eq!(
            qp.get("labelSelector"),
            Some(&QueryValue::Str("app=nginx,env in (qa,prod)".to_string()))
        );
    }

    #[test]
    fn subresource_name_parses() {
        let name = OperationName::parse("pods/exec");
        assert_eq!(name.resource_key(), "pods");
        assert_eq!(name.subresource(), Some("exec"));
    }
}
