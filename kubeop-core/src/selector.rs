//! Label selector composition and evaluation (component C2).
//!
//! A [`Selector`] is the structured form of a Kubernetes `labelSelector`
//! query string: an AND of exact-match labels plus an ordered list of set-based
//! expressions. [`Operation::put_selector`](crate::Operation::put_selector)
//! merges a `Selector` into the operation's `labelSelector` query parameter at
//! serialization time.
use std::collections::BTreeMap;

/// One set-based selector requirement, as found in `matchExpressions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// `key in (v1,v2,...)`
    In(String, Vec<String>),
    /// `key notin (v1,v2,...)`
    NotIn(String, Vec<String>),
    /// `key` (the label must be present, with any value)
    Exists(String),
    /// `!key` (the label must be absent)
    DoesNotExist(String),
}

impl Expression {
    fn to_query_fragment(&self) -> String {
        match self {
            Expression::In(key, values) => format!("{key} in ({})", values.join(",")),
            Expression::NotIn(key, values) => format!("{key} notin ({})", values.join(",")),
            Expression::Exists(key) => key.clone(),
            Expression::DoesNotExist(key) => format!("!{key}"),
        }
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Expression::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Expression::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
            Expression::Exists(key) => labels.contains_key(key),
            Expression::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// A composable label selector: an equality map (`matchLabels`) plus an
/// ordered sequence of set-based [`Expression`]s (`matchExpressions`).
///
/// Invariant: serialization is deterministic — `matchLabels` entries come
/// first (in key order, since they're stored in a `BTreeMap`), followed by
/// expressions in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    match_labels: BTreeMap<String, String>,
    match_expressions: Vec<Expression>,
}

impl Selector {
    /// An empty selector, matching every resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact-match label requirement (`key=value`).
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    /// Add an `In` set-based requirement (`key in (v1,v2,...)`).
    #[must_use]
    pub fn label_in<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expr = Expression::In(key.into(), values.into_iter().map(Into::into).collect());
        self.push_expr(expr);
        self
    }

    /// Add a `NotIn` set-based requirement (`key notin (v1,v2,...)`).
    #[must_use]
    pub fn label_not_in<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expr = Expression::NotIn(key.into(), values.into_iter().map(Into::into).collect());
        self.push_expr(expr);
        self
    }

    /// Add an `Exists` requirement (`key`).
    #[must_use]
    pub fn label_exists(mut self, key: impl Into<String>) -> Self {
        let expr = Expression::Exists(key.into());
        self.push_expr(expr);
        self
    }

    /// Add a `DoesNotExist` requirement (`!key`).
    #[must_use]
    pub fn label_does_not_exist(mut self, key: impl Into<String>) -> Self {
        let expr = Expression::DoesNotExist(key.into());
        self.push_expr(expr);
        self
    }

    fn push_expr(&mut self, expr: Expression) {
        if !self.match_expressions.contains(&expr) {
            self.match_expressions.push(expr);
        }
    }

    /// Merge `other` into `self`: match-label maps are unioned (`other` wins
    /// conflicts), match-expression lists are concatenated with structural
    /// duplicates dropped.
    #[must_use]
    pub fn merge(mut self, other: Selector) -> Self {
        self.match_labels.extend(other.match_labels);
        for expr in other.match_expressions {
            self.push_expr(expr);
        }
        self
    }

    /// `true` if this selector has no requirements at all.
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    /// Serialize to the `labelSelector` query-string form: `k=v` for labels,
    /// `k in (...)`/`k notin (...)`/`k`/`!k` for expressions, joined by `,`.
    /// `matchLabels` are emitted first (in key order), then expressions in
    /// insertion order.
    pub fn serialize(&self) -> String {
        let mut parts: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        parts.extend(self.match_expressions.iter().map(Expression::to_query_fragment));
        parts.join(",")
    }

    /// Evaluate the selector against a resource's labels. Returns `true` iff
    /// every match-label entry and every expression matches.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels.iter().all(|(k, v)| labels.get(k) == Some(v))
            && self.match_expressions.iter().all(|e| e.matches(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_labels_before_expressions_in_insertion_order() {
        let sel = Selector::new()
            .label("app", "nginx")
            .label_in("env", ["qa", "prod"]);
        assert_eq!(sel.serialize(), "app=nginx,env in (qa,prod)");
    }

    #[test]
    fn serializes_exists_and_does_not_exist() {
        let sel = Selector::new().label_exists("tier").label_does_not_exist("deprecated");
        assert_eq!(sel.serialize(), "tier,!deprecated");
    }

    #[test]
    fn merge_unions_labels_right_wins() {
        let a = Selector::new().label("app", "nginx");
        let b = Selector::new().label("app", "proxy").label("env", "prod");
        let merged = a.merge(b);
        assert_eq!(merged.serialize(), "app=proxy,env=prod");
    }

    #[test]
    fn merge_dedups_structurally_equal_expressions() {
        let a = Selector::new().label_in("env", ["qa"]);
        let b = Selector::new().label_in("env", ["qa"]);
        let merged = a.merge(b);
        assert_eq!(merged.serialize(), "env in (qa)");
    }

    #[test]
    fn matches_evaluates_all_parts() {
        let sel = Selector::new().label("app", "nginx").label_in("env", ["qa", "prod"]);
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "nginx".to_string());
        labels.insert("env".to_string(), "prod".to_string());
        assert!(sel.matches(&labels));

        labels.insert("env".to_string(), "dev".to_string());
        assert!(!sel.matches(&labels));
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(Selector::new().matches(&BTreeMap::new()));
        assert!(Selector::new().is_empty());
    }
}
