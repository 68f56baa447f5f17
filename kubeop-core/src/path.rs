//! Path Builder (component C1): resource descriptor + verb + path params -> URL path.
//!
//! Pure function, no I/O: given a [`ResourceDescriptor`] and the verb/path
//! parameters carried by an [`Operation`], produces an absolute REST path or
//! a [`PathError`] naming the missing parameter.
use crate::{
    discovery::ResourceDescriptor,
    error::PathError,
    gvk::GroupVersion,
    operation::{OperationName, PathParams, Verb},
};

/// Build the absolute URL path for `verb` against `descriptor`, using
/// `api_version` for the `/api`-vs-`/apis` prefix and `name` to decide
/// whether a subresource segment is appended.
///
/// Rules (spec.md §4.1):
/// - prefix is `/api/{apiVersion}` for group-less versions, `/apis/{apiVersion}` otherwise
/// - suffix is `{restName}` for collection-scoped verbs, `{restName}/{name}` otherwise;
///   subresources append `/{subresource}` after `{name}`
/// - a `/namespaces/{namespace}` segment is inserted between prefix and
///   suffix iff the descriptor is namespaced and the verb isn't one of the
///   "all namespaces" variants
pub fn build_path(
    api_version: &str,
    descriptor: &ResourceDescriptor,
    verb: Verb,
    name: &OperationName,
    path_params: &PathParams,
) -> Result<String, PathError> {
    let gv: GroupVersion = api_version
        .parse()
        .map_err(|_| PathError::UnresolvedPlaceholder(api_version.to_string()))?;
    let prefix = if gv.is_core() {
        format!("/api/{api_version}")
    } else {
        format!("/apis/{api_version}")
    };

    let mut segments = vec![prefix];

    if descriptor.namespaced && !verb.is_all_namespaces() {
        let ns = path_params
            .namespace
            .as_deref()
            .ok_or(PathError::MissingParam("namespace"))?;
        segments.push(format!("namespaces/{ns}"));
    }

    let subresource = name.subresource();
    let needs_name = !verb.is_collection_scoped() || subresource.is_some();

    if needs_name {
        let resource_name = path_params.name.as_deref().ok_or(PathError::MissingParam("name"))?;
        segments.push(format!("{}/{resource_name}", descriptor.rest_name));
    } else {
        segments.push(descriptor.rest_name.clone());
    }

    if let Some(sub) = subresource {
        segments.push(sub.to_string());
        if sub == "proxy" {
            if let Some(path) = &path_params.path {
                segments.push(path.trim_start_matches('/').to_string());
            }
        }
        if sub == "log" {
            if let Some(logpath) = &path_params.logpath {
                segments.push(logpath.trim_start_matches('/').to_string());
            }
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::PathParams;

    fn deployment_descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("Deployment", "deployments", true)
            .with_verbs(["get", "list", "create", "update", "patch", "delete", "deletecollection"])
    }

    // S1 — get by name
    #[test]
    fn get_by_name_under_named_group() {
        let desc = deployment_descriptor();
        let path = build_path(
            "apps/v1",
            &desc,
            Verb::Get,
            &OperationName::Kind("Deployment".into()),
            &PathParams::namespaced("default", "nginx"),
        )
        .unwrap();
        assert_eq!(path, "/apis/apps/v1/namespaces/default/deployments/nginx");
    }

    // S2 — cluster-scoped list-all-namespaces
    #[test]
    fn list_all_namespaces_omits_namespace_segment() {
        let desc = ResourceDescriptor::new("Namespace", "namespaces", false).with_verbs(["list"]);
        let path = build_path(
            "v1",
            &desc,
            Verb::ListAllNamespaces,
            &OperationName::Kind("Namespace".into()),
            &PathParams::default(),
        )
        .unwrap();
        assert_eq!(path, "/api/v1/namespaces");
    }

    // S3 — create eviction subresource
    #[test]
    fn subresource_create_requires_name_despite_create_verb() {
        let desc = ResourceDescriptor::new("Pod", "pods", true).with_verbs(["get", "list", "create"]);
        let path = build_path(
            "v1",
            &desc,
            Verb::Create,
            &OperationName::KindWithSubKind {
                kind: "Pod".into(),
                sub_kind: "eviction".into(),
            },
            &PathParams::namespaced("default", "nginx"),
        )
        .unwrap();
        assert_eq!(path, "/api/v1/namespaces/default/pods/nginx/eviction");
    }

    #[test]
    fn missing_namespace_is_a_fatal_path_error() {
        let desc = deployment_descriptor();
        let err = build_path(
            "apps/v1",
            &desc,
            Verb::Get,
            &OperationName::Kind("Deployment".into()),
            &PathParams {
                name: Some("nginx".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, PathError::MissingParam("namespace"));
    }

    #[test]
    fn cluster_scoped_list_has_no_namespace_segment() {
        let desc = ResourceDescriptor::new("ClusterRole", "clusterroles", false).with_verbs(["list"]);
        let path = build_path(
            "rbac.authorization.k8s.io/v1",
            &desc,
            Verb::List,
            &OperationName::Kind("ClusterRole".into()),
            &PathParams::default(),
        )
        .unwrap();
        assert_eq!(path, "/apis/rbac.authorization.k8s.io/v1/clusterroles");
    }
}
