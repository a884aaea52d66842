//! Identity keys naming test entities across re-discovery.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Value naming a test entity: container type, optional member, and the build
/// scope that disambiguates identically named containers.
///
/// Keys compare ordinally on all three fields; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    scope_id: String,
    container_type_name: String,
    member_name: String,
}

impl IdentityKey {
    /// Creates a key for a member of a container.
    pub fn new(
        scope_id: impl Into<String>,
        container_type_name: impl Into<String>,
        member_name: impl Into<String>,
    ) -> Self {
        Self {
            scope_id: scope_id.into(),
            container_type_name: container_type_name.into(),
            member_name: member_name.into(),
        }
    }

    /// Creates a key naming a container itself (empty member name).
    pub fn container(scope_id: impl Into<String>, container_type_name: impl Into<String>) -> Self {
        Self::new(scope_id, container_type_name, String::new())
    }

    /// Scope (project) that owns the container.
    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// Fully qualified container type name.
    pub fn container_type_name(&self) -> &str {
        &self.container_type_name
    }

    /// Member name, empty for container keys.
    pub fn member_name(&self) -> &str {
        &self.member_name
    }

    /// Whether the key names a member rather than a container.
    pub fn has_member(&self) -> bool {
        !self.member_name.is_empty()
    }

    /// Key of the container this key belongs to.
    #[must_use]
    pub fn container_key(&self) -> Self {
        Self::container(self.scope_id.clone(), self.container_type_name.clone())
    }

    /// Namespace part of the container type name (everything before the last `.`).
    pub fn namespace(&self) -> &str {
        self.container_type_name
            .rsplit_once('.')
            .map_or("", |(namespace, _)| namespace)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_member() {
            write!(
                formatter,
                "{}:{}.{}",
                self.scope_id, self.container_type_name, self.member_name
            )
        } else {
            write!(formatter, "{}:{}", self.scope_id, self.container_type_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality_is_ordinal() {
        let key = IdentityKey::new("proj", "N.T", "M");
        assert_eq!(key, IdentityKey::new("proj", "N.T", "M"));
        assert_ne!(key, IdentityKey::new("proj", "n.t", "M"));
        assert_ne!(key, IdentityKey::new("other", "N.T", "M"));
        assert_ne!(key, IdentityKey::new("proj", "N.T", "m"));
    }

    #[test]
    fn test_container_key_drops_member() {
        let key = IdentityKey::new("proj", "N.T", "M");
        let container = key.container_key();
        assert!(!container.has_member());
        assert_eq!(container, IdentityKey::container("proj", "N.T"));
    }

    #[test]
    fn test_namespace() {
        assert_eq!(IdentityKey::container("proj", "A.B.Tests").namespace(), "A.B");
        assert_eq!(IdentityKey::container("proj", "Tests").namespace(), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(IdentityKey::new("proj", "N.T", "M").to_string(), "proj:N.T.M");
        assert_eq!(IdentityKey::container("proj", "N.T").to_string(), "proj:N.T");
    }
}
