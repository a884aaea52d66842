//! Source index collaborator: declared types, members, and their locations.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::IdentityKey;

/// Declared accessibility of a type or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accessibility {
    /// Visible everywhere
    Public,
    /// Visible within the declaring module
    Internal,
    /// Visible to derived types or within the declaring module
    ProtectedInternal,
    /// Visible to derived types
    Protected,
    /// Visible to the declaring type only
    Private,
}

/// Kind of a declared member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// A method
    Method,
    /// A property
    Property,
    /// A field
    Field,
    /// A constructor
    Constructor,
}

/// An attribute applied to a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeUsage {
    /// Fully qualified attribute type name
    pub type_name: String,
    /// Positional constructor arguments, rendered as strings
    #[serde(default)]
    pub positional: Vec<String>,
    /// Named arguments, rendered as strings
    #[serde(default)]
    pub named: BTreeMap<String, String>,
}

impl AttributeUsage {
    /// Creates an attribute usage without arguments.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Adds a positional argument.
    #[must_use]
    pub fn with_positional(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Adds a named argument.
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }
}

/// A member declared on a type, as reported by the source index or an
/// assembly explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredMember {
    /// Short member name
    pub name: String,
    /// Member kind
    pub kind: MemberKind,
    /// Declared accessibility
    pub accessibility: Accessibility,
    /// Whether the member is abstract
    #[serde(default)]
    pub is_abstract: bool,
    /// Whether the member is static
    #[serde(default)]
    pub is_static: bool,
    /// Number of generic type parameters
    #[serde(default)]
    pub type_parameter_count: usize,
    /// Attributes applied to the member
    #[serde(default)]
    pub attributes: Vec<AttributeUsage>,
    /// Opaque handle assigned by the source index
    #[serde(default)]
    pub handle: String,
}

impl DeclaredMember {
    /// Creates a public, concrete, non-generic method.
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Method,
            accessibility: Accessibility::Public,
            is_abstract: false,
            is_static: false,
            type_parameter_count: 0,
            attributes: Vec::new(),
            handle: String::new(),
        }
    }

    /// Creates a public instance property.
    pub fn property(name: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Property,
            ..Self::method(name)
        }
    }

    /// Sets the accessibility.
    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    /// Marks the member abstract.
    #[must_use]
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Marks the member static.
    #[must_use]
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Sets the number of generic type parameters.
    #[must_use]
    pub fn with_type_parameters(mut self, count: usize) -> Self {
        self.type_parameter_count = count;
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeUsage) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Sets the source index handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = handle.into();
        self
    }

    /// Finds an applied attribute by type name.
    pub fn attribute(&self, type_name: &str) -> Option<&AttributeUsage> {
        self.attributes
            .iter()
            .find(|attribute| attribute.type_name == type_name)
    }
}

/// A declared type with its members and nested types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredType {
    /// Fully qualified type name
    pub name: String,
    /// Declared accessibility
    pub accessibility: Accessibility,
    /// Whether the type is abstract
    #[serde(default)]
    pub is_abstract: bool,
    /// Attributes applied to the type
    #[serde(default)]
    pub attributes: Vec<AttributeUsage>,
    /// Members in declaration order
    #[serde(default)]
    pub members: Vec<DeclaredMember>,
    /// Nested types in declaration order
    #[serde(default)]
    pub nested_types: Vec<Self>,
}

impl DeclaredType {
    /// Creates a public, concrete type without members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessibility: Accessibility::Public,
            is_abstract: false,
            attributes: Vec::new(),
            members: Vec::new(),
            nested_types: Vec::new(),
        }
    }

    /// Adds a member.
    #[must_use]
    pub fn with_member(mut self, member: DeclaredMember) -> Self {
        self.members.push(member);
        self
    }

    /// Adds a nested type.
    #[must_use]
    pub fn with_nested(mut self, nested: Self) -> Self {
        self.nested_types.push(nested);
        self
    }

    /// Marks the type abstract.
    #[must_use]
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Methods of this type, in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &DeclaredMember> {
        self.members
            .iter()
            .filter(|member| member.kind == MemberKind::Method)
    }
}

/// Half-open byte range inside a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl TextRange {
    /// Creates a range.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// One declaration site of an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File containing the declaration
    pub file: PathBuf,
    /// Range of the declared name
    pub name_range: TextRange,
    /// Range of the whole declaration
    pub full_range: TextRange,
}

/// Resolved source location(s) of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing resolves; the element is stale
    Invalid,
    /// Declaration sites ordered by file path, then offset
    Locations(Vec<SourceLocation>),
}

impl Disposition {
    /// Whether the element resolved to at least one location.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Locations(_))
    }
}

/// What to ask the source index about.
#[derive(Debug, Clone, Copy)]
pub enum SourceTarget<'target> {
    /// A container type
    Container(&'target IdentityKey),
    /// A declared member
    Member(&'target DeclaredMember),
}

/// Source code index consulted for lazy resolution of elements.
///
/// Implementations wrap whatever parses and indexes the code base; this crate
/// never reads source files itself.
pub trait SourceIndex: Send + Sync {
    /// Members named `member_name` declared on `container`, in declaration order.
    ///
    /// Returns `None` when the container type itself cannot be found.
    fn enumerate_members(
        &self,
        container: &IdentityKey,
        member_name: &str,
    ) -> Option<Vec<DeclaredMember>>;

    /// Declaration sites of a container type; empty when it cannot be found.
    fn container_locations(&self, container: &IdentityKey) -> Vec<SourceLocation>;

    /// Declaration sites of a member.
    fn locations_of(&self, member: &DeclaredMember) -> Vec<SourceLocation>;

    /// Files declaring a type or member.
    fn source_files_of(&self, target: SourceTarget<'_>) -> BTreeSet<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_builders() {
        let member = DeclaredMember::method("Run")
            .with_accessibility(Accessibility::Internal)
            .with_type_parameters(1)
            .with_attribute(AttributeUsage::new("Xunit.FactAttribute").with_named("Skip", "later"));

        assert_eq!(member.kind, MemberKind::Method);
        assert_eq!(member.accessibility, Accessibility::Internal);
        assert_eq!(member.type_parameter_count, 1);
        let fact = member.attribute("Xunit.FactAttribute");
        assert_eq!(
            fact.and_then(|attribute| attribute.named.get("Skip")),
            Some(&"later".to_owned())
        );
        assert!(member.attribute("Xunit.TheoryAttribute").is_none());
    }

    #[test]
    fn test_declared_type_methods_skip_properties() {
        let declared = DeclaredType::new("N.T")
            .with_member(DeclaredMember::method("A"))
            .with_member(DeclaredMember::property("Data"))
            .with_member(DeclaredMember::method("B"));

        let names: Vec<&str> = declared.methods().map(|member| member.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_declared_type_deserializes_with_defaults() {
        let json = r#"{"name":"N.T","accessibility":"Public","members":[{"name":"A","kind":"Method","accessibility":"Public"}]}"#;
        let declared: DeclaredType = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(error) => panic!("deserialize failed: {error}"),
        };
        assert_eq!(declared.members.len(), 1);
        assert!(!declared.members[0].is_abstract);
        assert!(declared.nested_types.is_empty());
    }

    #[test]
    fn test_disposition_validity() {
        assert!(!Disposition::Invalid.is_valid());
        assert!(Disposition::Locations(Vec::new()).is_valid());
    }
}
