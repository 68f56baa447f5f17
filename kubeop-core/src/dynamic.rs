//! Structural accessors over dynamic, string-keyed resource maps.
//!
//! The core never depends on generated Kubernetes types (§9 design notes):
//! a "resource" is simply a `serde_json::Value` object with the usual
//! `apiVersion`/`kind`/`metadata`/`spec`/`status` shape. These helpers read
//! the handful of fields the core itself needs to inspect.
use std::collections::BTreeMap;

use serde_json::Value;

/// The resource's `metadata.name`, if set.
pub fn name(resource: &Value) -> Option<&str> {
    resource.get("metadata")?.get("name")?.as_str()
}

/// The resource's `metadata.namespace`, if set.
pub fn namespace(resource: &Value) -> Option<&str> {
    resource.get("metadata")?.get("namespace")?.as_str()
}

/// The resource's `apiVersion`, if set.
pub fn api_version(resource: &Value) -> Option<&str> {
    resource.get("apiVersion")?.as_str()
}

/// The resource's `kind`, if set.
pub fn kind(resource: &Value) -> Option<&str> {
    resource.get("kind")?.as_str()
}

/// The resource's `metadata.resourceVersion`, if set.
pub fn resource_version(resource: &Value) -> Option<&str> {
    resource.get("metadata")?.get("resourceVersion")?.as_str()
}

/// The value of a single `metadata.labels` entry, if both the map and the
/// key are present.
pub fn label<'a>(resource: &'a Value, key: &str) -> Option<&'a str> {
    resource.get("metadata")?.get("labels")?.get(key)?.as_str()
}

/// All of `metadata.labels`, flattened into an owned string map suitable
/// for [`crate::Selector::matches`].
pub fn labels(resource: &Value) -> BTreeMap<String, String> {
    resource
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// The `metadata.continue` token from a list response, if present and
/// non-empty.
pub fn continue_token(list_response: &Value) -> Option<&str> {
    list_response
        .get("metadata")?
        .get("continue")?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// The `items` array of a list response.
pub fn items(list_response: &Value) -> &[Value] {
    list_response
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_identity_fields() {
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "nginx",
                "namespace": "default",
                "resourceVersion": "42",
                "labels": {"app": "nginx"},
            },
        });
        assert_eq!(name(&pod), Some("nginx"));
        assert_eq!(namespace(&pod), Some("default"));
        assert_eq!(api_version(&pod), Some("v1"));
        assert_eq!(kind(&pod), Some("Pod"));
        assert_eq!(resource_version(&pod), Some("42"));
        assert_eq!(label(&pod, "app"), Some("nginx"));
        assert_eq!(label(&pod, "missing"), None);
    }

    #[test]
    fn continue_token_is_none_when_empty_or_absent() {
        assert_eq!(continue_token(&json!({"metadata": {}})), None);
        assert_eq!(continue_token(&json!({"metadata": {"continue": ""}})), None);
        assert_eq!(
            continue_token(&json!({"metadata": {"continue": "abc"}})),
            Some("abc")
        );
    }
}
