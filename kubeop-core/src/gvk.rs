//! Group/version/kind identifiers for dynamic resources.
use std::str::FromStr;

/// Failed to parse a `group/version` or bare `version` apiVersion string.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("failed to parse apiVersion: {0}")]
pub struct ParseGroupVersionError(pub String);

/// A parsed `apiVersion`, split into its (possibly empty) group and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// API group; empty string for the core group.
    pub group: String,
    /// API version, e.g. `"v1"`.
    pub version: String,
}

impl GroupVersion {
    /// Construct from explicit group and version.
    pub fn gv(group: &str, version: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
        }
    }

    /// Render back to the `apiVersion` string used on the wire.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// `true` if this group/version has no group component, i.e. it belongs
    /// to the core API (served under `/api` rather than `/apis`).
    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }
}

impl FromStr for GroupVersion {
    type Err = ParseGroupVersionError;

    fn from_str(gv: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = gv.splitn(2, '/').collect();
        match parts.as_slice() {
            [g, v] => Ok(Self::gv(g, v)),
            [v] => Ok(Self::gv("", v)),
            _ => Err(ParseGroupVersionError(gv.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_group() {
        let gv: GroupVersion = "apps/v1".parse().unwrap();
        assert_eq!(gv.group, "apps");
        assert_eq!(gv.version, "v1");
        assert_eq!(gv.api_version(), "apps/v1");
        assert!(!gv.is_core());
    }

    #[test]
    fn parses_core_group() {
        let gv: GroupVersion = "v1".parse().unwrap();
        assert_eq!(gv.group, "");
        assert_eq!(gv.version, "v1");
        assert_eq!(gv.api_version(), "v1");
        assert!(gv.is_core());
    }
}
