//! REST API convention parameters: patch bodies, delete preconditions, and
//! the query-parameter shapes the same verbs use on the wire (§3 supplement:
//! apply/patch/delete wire shape).
use serde::Serialize;
use serde_json::Value;

use crate::operation::Operation;

/// The wire shape of a `PATCH`/`apply` body, tagging which patch strategy
/// the server should use via `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Server-side apply (`application/apply-patch+yaml`, sent as JSON).
    Apply(Value),
    /// RFC 6902 JSON patch (`application/json-patch+json`).
    Json(Value),
    /// RFC 7396 JSON merge patch (`application/merge-patch+json`).
    Merge(Value),
    /// Kubernetes strategic merge patch (`application/strategic-merge-patch+json`).
    Strategic(Value),
}

impl Patch {
    /// The `Content-Type` header value the server expects for this patch kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            Patch::Apply(_) => "application/apply-patch+yaml",
            Patch::Json(_) => "application/json-patch+json",
            Patch::Merge(_) => "application/merge-patch+json",
            Patch::Strategic(_) => "application/strategic-merge-patch+json",
        }
    }

    /// `true` for [`Patch::Apply`], the only variant `force` applies to.
    pub fn is_apply(&self) -> bool {
        matches!(self, Patch::Apply(_))
    }

    /// The patch body, regardless of variant.
    pub fn body(&self) -> &Value {
        match self {
            Patch::Apply(v) | Patch::Json(v) | Patch::Merge(v) | Patch::Strategic(v) => v,
        }
    }
}

/// Server-side validation strictness for `fieldValidation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationDirective {
    /// Reject the request on any unrecognized or duplicate field.
    Strict,
    /// Accept the request but surface warnings for unrecognized fields.
    Warn,
    /// Accept the request and ignore unrecognized fields.
    Ignore,
}

impl ValidationDirective {
    fn as_str(self) -> &'static str {
        match self {
            ValidationDirective::Strict => "Strict",
            ValidationDirective::Warn => "Warn",
            ValidationDirective::Ignore => "Ignore",
        }
    }
}

/// Query parameters common to `patch`/`apply` requests.
#[derive(Debug, Clone, Default)]
pub struct PatchParams {
    /// Persist nothing; ask the server to validate only.
    pub dry_run: bool,
    /// Force a server-side apply through on field-manager conflicts.
    /// Only meaningful for [`Patch::Apply`].
    pub force: bool,
    /// Identity of the actor making the change. Required for
    /// [`Patch::Apply`], optional otherwise.
    pub field_manager: Option<String>,
    /// Server-side field validation strictness.
    pub field_validation: Option<ValidationDirective>,
}

impl PatchParams {
    /// Construct params for a server-side apply under the given field manager.
    pub fn apply(manager: impl Into<String>) -> Self {
        Self {
            field_manager: Some(manager.into()),
            ..Self::default()
        }
    }

    /// Set `force`, returning `self` for chaining.
    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Apply these params and `patch` to `op`, setting the body,
    /// `Content-Type`-relevant query params, and the `force`/`dryRun`/
    /// `fieldManager`/`fieldValidation` query parameters.
    pub fn apply_to(&self, op: Operation, patch: &Patch) -> Operation {
        let mut op = op
            .with_data(patch.body().clone())
            .put_query_param("contentType", patch.content_type());
        if self.dry_run {
            op = op.put_query_param("dryRun", "All");
        }
        if self.force && patch.is_apply() {
            op = op.put_query_param("force", true);
        }
        if let Some(fm) = &self.field_manager {
            op = op.put_query_param("fieldManager", fm.clone());
        }
        if let Some(fv) = &self.field_validation {
            op = op.put_query_param("fieldValidation", fv.as_str());
        }
        op
    }
}

/// A condition that must hold for a delete to proceed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preconditions {
    /// The resource version the server must see unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// The UID the resource must still have.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// How dependents of a deleted resource should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropagationPolicy {
    /// Delete dependents in the background after the owner is removed.
    Background,
    /// Orphan dependents; they are not deleted.
    Orphan,
    /// Delete dependents before the owner, synchronously.
    Foreground,
}

/// Query parameters and request body for `delete`/`deletecollection`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    /// Persist nothing; ask the server to validate only.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    /// Seconds to wait before the object is deleted; `0` means immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<u32>,
    /// Conditions that must hold for the delete to proceed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Preconditions>,
    /// How to handle dependents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub propagation_policy: Option<PropagationPolicy>,
}

impl DeleteParams {
    fn is_default(&self) -> bool {
        self.grace_period_seconds.is_none()
            && self.preconditions.is_none()
            && self.propagation_policy.is_none()
            && !self.dry_run
    }

    /// Apply these params to `op`: non-default params are serialized as the
    /// JSON request body (matching the `DeleteOptions` wire convention);
    /// a fully-default set of params sends no body.
    pub fn apply_to(&self, op: Operation) -> Operation {
        if self.is_default() {
            op
        } else {
            let body = serde_json::to_value(self).expect("DeleteParams always serializes");
            op.with_data(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{PathParams, Verb};
    use serde_json::json;

    #[test]
    fn apply_patch_sets_content_type_and_field_manager() {
        let op = Operation::build(Verb::Patch, "apps/v1", "Deployment", PathParams::namespaced("default", "nginx"), None);
        let patch = Patch::Apply(json!({"spec": {"replicas": 3}}));
        let op = PatchParams::apply("kubeop").force().apply_to(op, &patch);
        let qp = op.query_params();
        assert_eq!(
            qp.get("contentType"),
            Some(&crate::operation::QueryValue::Str("application/apply-patch+yaml".to_string()))
        );
        assert_eq!(qp.get("fieldManager"), Some(&crate::operation::QueryValue::Str("kubeop".to_string())));
        assert_eq!(qp.get("force"), Some(&crate::operation::QueryValue::Bool(true)));
        assert_eq!(op.data(), Some(&json!({"spec": {"replicas": 3}})));
    }

    #[test]
    fn force_is_dropped_for_non_apply_patches() {
        let op = Operation::build(Verb::Patch, "v1", "Pod", PathParams::namespaced("default", "nginx"), None);
        let patch = Patch::Merge(json!({"spec": {}}));
        let op = PatchParams { force: true, ..Default::default() }.apply_to(op, &patch);
        assert_eq!(op.query_params().get("force"), None);
    }

    #[test]
    fn default_delete_params_send_no_body() {
        let op = Operation::build(Verb::Delete, "v1", "Pod", PathParams::namespaced("default", "nginx"), None);
        let op = DeleteParams::default().apply_to(op);
        assert_eq!(op.data(), None);
    }

    #[test]
    fn delete_preconditions_are_serialized_as_body() {
        let op = Operation::build(Verb::Delete, "v1", "Pod", PathParams::namespaced("default", "nginx"), None);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            preconditions: Some(Preconditions {
                uid: Some("abc-123".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let op = params.apply_to(op);
        assert_eq!(
            op.data(),
            Some(&json!({
                "propagationPolicy": "Foreground",
                "preconditions": {"uid": "abc-123"},
            }))
        );
    }
}
