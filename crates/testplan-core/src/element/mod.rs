//! Test element hierarchy: assemblies own classes, classes own methods.
//!
//! Elements live in an [`ElementTree`] arena keyed by [`ElementId`]. A parent
//! stores the ordered ids of its children and each child stores its parent id;
//! the tree keeps both sides consistent.

mod resolve;
mod tree;

pub use resolve::{
    is_test_method_candidate, resolve_declared_member, resolve_disposition, resolve_state,
    source_files,
};
pub use tree::{ElementAttrs, ElementTree};

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::IdentityKey;

/// Stable element identifier, assigned at creation and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrows the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Kind of a test element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    /// Compiled artifact containing test classes
    Assembly,
    /// Test container type
    Class,
    /// Test method
    Method,
}

impl ElementKind {
    /// Whether an element of this kind may own an element of `child` kind.
    pub fn can_contain(self, child: Self) -> bool {
        matches!(
            (self, child),
            (Self::Assembly, Self::Class) | (Self::Class, Self::Method)
        )
    }

    /// Whether elements of this kind live at the top of the hierarchy.
    pub fn is_root(self) -> bool {
        self == Self::Assembly
    }

    /// Lowercase label used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Assembly => "assembly",
            Self::Class => "class",
            Self::Method => "method",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Resolution state of an element against the current source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementState {
    /// Resolves to a usable declaration
    #[default]
    Valid,
    /// Container exists but the member no longer qualifies as a test
    Invalid,
    /// Container type no longer exists
    NotFound,
}

/// Kind-specific element data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementData {
    /// Assembly element
    Assembly {
        /// Absolute path to the compiled artifact
        location: String,
    },
    /// Class element
    Class {
        /// Absolute path to the compiled artifact declaring the class
        assembly_location: String,
    },
    /// Method element
    Method {
        /// Method name as shown to the user
        short_name: String,
        /// Why the test is skipped, empty when it is not
        skip_reason: String,
        /// Discovery order within the owning class
        order: usize,
    },
}

/// Key under which elements compare equal: kind, container type, member.
///
/// The scope is deliberately left out so the same test shown under two build
/// configurations is recognized as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey {
    kind: ElementKind,
    container_type_name: String,
    member_name: String,
}

/// A discovered test entity.
#[derive(Debug, Clone)]
pub struct Element {
    id: ElementId,
    identity: IdentityKey,
    state: ElementState,
    explicit_reason: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    data: ElementData,
}

impl Element {
    /// Stable identifier.
    pub fn id(&self) -> &ElementId {
        &self.id
    }

    /// Identity key.
    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        match self.data {
            ElementData::Assembly { .. } => ElementKind::Assembly,
            ElementData::Class { .. } => ElementKind::Class,
            ElementData::Method { .. } => ElementKind::Method,
        }
    }

    /// Kind-specific data.
    pub fn data(&self) -> &ElementData {
        &self.data
    }

    /// Current resolution state.
    pub fn state(&self) -> ElementState {
        self.state
    }

    /// Reason the element must be selected explicitly, empty when it need not be.
    pub fn explicit_reason(&self) -> &str {
        &self.explicit_reason
    }

    /// Whether the element is excluded from "run all" sweeps.
    pub fn is_explicit(&self) -> bool {
        !self.explicit_reason.is_empty()
    }

    /// Owning element, `None` for assemblies.
    pub fn parent(&self) -> Option<&ElementId> {
        self.parent.as_ref()
    }

    /// Owned children in insertion order.
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    /// Path of the compiled artifact the element lives in.
    pub fn assembly_location(&self) -> &str {
        match &self.data {
            ElementData::Assembly { location } => location,
            ElementData::Class { assembly_location } => assembly_location,
            ElementData::Method { .. } => "",
        }
    }

    /// Skip reason of a method, empty for containers.
    pub fn skip_reason(&self) -> &str {
        match &self.data {
            ElementData::Method { skip_reason, .. } => skip_reason,
            ElementData::Assembly { .. } | ElementData::Class { .. } => "",
        }
    }

    /// Short name shown in test trees.
    pub fn presentation(&self) -> &str {
        match &self.data {
            ElementData::Assembly { location } => location,
            ElementData::Class { .. } => self.identity.container_type_name(),
            ElementData::Method { short_name, .. } => short_name,
        }
    }

    /// Namespace of the container type.
    pub fn namespace(&self) -> &str {
        self.identity.namespace()
    }

    /// Human readable kind description.
    pub fn kind_label(&self) -> &'static str {
        match self.kind() {
            ElementKind::Assembly => "Test Assembly",
            ElementKind::Class => "Test Class",
            ElementKind::Method => "Test",
        }
    }

    /// Equality key that ignores the scope.
    pub fn key(&self) -> ElementKey {
        ElementKey {
            kind: self.kind(),
            container_type_name: self.identity.container_type_name().to_owned(),
            member_name: self.identity.member_name().to_owned(),
        }
    }

    fn method_order(&self) -> usize {
        match self.data {
            ElementData::Method { order, .. } => order,
            ElementData::Assembly { .. } | ElementData::Class { .. } => 0,
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.identity.container_type_name() == other.identity.container_type_name()
            && self.identity.member_name() == other.identity.member_name()
    }
}

impl Eq for Element {}

/// Orders elements for presentation.
///
/// Container type names compare case-insensitively; for the same type a method
/// sorts before its class, and methods keep their discovery order.
pub fn compare_elements(left: &Element, right: &Element) -> Ordering {
    if left == right {
        return Ordering::Equal;
    }

    let by_type = left
        .identity
        .container_type_name()
        .to_lowercase()
        .cmp(&right.identity.container_type_name().to_lowercase());
    if by_type != Ordering::Equal {
        return by_type;
    }

    match (left.kind(), right.kind()) {
        (ElementKind::Method, ElementKind::Method) => left.method_order().cmp(&right.method_order()),
        (ElementKind::Method, _) => Ordering::Less,
        (_, ElementKind::Method) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(identity: IdentityKey, data: ElementData) -> Element {
        Element {
            id: ElementId::generate(),
            identity,
            state: ElementState::Valid,
            explicit_reason: String::new(),
            parent: None,
            children: Vec::new(),
            data,
        }
    }

    fn method(scope: &str, type_name: &str, name: &str, order: usize) -> Element {
        element(
            IdentityKey::new(scope, type_name, name),
            ElementData::Method {
                short_name: name.to_owned(),
                skip_reason: String::new(),
                order,
            },
        )
    }

    fn class(scope: &str, type_name: &str) -> Element {
        element(
            IdentityKey::container(scope, type_name),
            ElementData::Class {
                assembly_location: "/bin/tests.dll".to_owned(),
            },
        )
    }

    #[test]
    fn test_kind_containment() {
        assert!(ElementKind::Assembly.can_contain(ElementKind::Class));
        assert!(ElementKind::Class.can_contain(ElementKind::Method));
        assert!(!ElementKind::Method.can_contain(ElementKind::Method));
        assert!(!ElementKind::Assembly.can_contain(ElementKind::Method));
        assert!(!ElementKind::Class.can_contain(ElementKind::Class));
    }

    #[test]
    fn test_equality_ignores_scope() {
        let debug = method("debug", "N.T", "A", 0);
        let release = method("release", "N.T", "A", 3);
        assert_eq!(debug, release);
        assert_eq!(debug.key(), release.key());
        assert_ne!(debug.identity(), release.identity());
        assert_ne!(debug, method("debug", "N.T", "B", 0));
    }

    #[test]
    fn test_class_and_method_never_equal() {
        let class_element = class("proj", "N.T");
        let method_element = method("proj", "N.T", "", 0);
        assert_ne!(class_element, method_element);
    }

    #[test]
    fn test_compare_elements() {
        let first = method("proj", "a.Tests", "Second", 1);
        let second = method("proj", "A.Tests", "First", 0);
        let owner = class("proj", "A.Tests");
        let later = class("proj", "B.Tests");

        assert_eq!(compare_elements(&second, &first), Ordering::Less);
        assert_eq!(compare_elements(&first, &owner), Ordering::Less);
        assert_eq!(compare_elements(&owner, &first), Ordering::Greater);
        assert_eq!(compare_elements(&owner, &later), Ordering::Less);
        assert_eq!(compare_elements(&owner, &class("other", "A.Tests")), Ordering::Equal);
    }

    #[test]
    fn test_presentation_helpers() {
        let mut skipped = method("proj", "N.Inner.T", "Flaky", 0);
        skipped.explicit_reason = "flaky".to_owned();
        assert_eq!(skipped.presentation(), "Flaky");
        assert_eq!(skipped.namespace(), "N.Inner");
        assert!(skipped.is_explicit());
        assert_eq!(skipped.kind_label(), "Test");

        let owner = class("proj", "N.T");
        assert_eq!(owner.presentation(), "N.T");
        assert_eq!(owner.assembly_location(), "/bin/tests.dll");
        assert!(!owner.is_explicit());
    }
}
