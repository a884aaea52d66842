//! Pluggable "is this a test" classification over declared code.

use crate::config::ClassifierConfig;
use crate::source::{Accessibility, AttributeUsage, DeclaredMember, DeclaredType, MemberKind};

/// Role a declaration plays for the test framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestRole {
    /// Not related to tests
    Unknown,
    /// A runnable test method
    Test,
    /// A type containing tests
    TestContainer,
    /// Anything test related: tests, containers, data sources, and types
    /// nesting test containers
    TestStuff,
}

/// A declaration to classify.
#[derive(Debug, Clone, Copy)]
pub enum Declaration<'decl> {
    /// A type
    Type(&'decl DeclaredType),
    /// A member of a type
    Member {
        /// The member
        member: &'decl DeclaredMember,
        /// Type declaring the member
        container: &'decl DeclaredType,
    },
}

/// Capability deciding which declarations are tests.
pub trait TestClassifier: Send + Sync {
    /// Whether a member is a runnable test method.
    fn is_test_method(&self, member: &DeclaredMember) -> bool;

    /// Whether a property supplies data to a parameterized test in `container`.
    fn is_data_source_property(&self, member: &DeclaredMember, container: &DeclaredType) -> bool;

    /// Whether a type is a test container.
    fn is_test_container(&self, declared: &DeclaredType) -> bool;

    /// Why a test method is skipped, `None` when it runs normally.
    fn skip_reason(&self, member: &DeclaredMember) -> Option<String>;
}

/// Classifier driven by attribute type names.
#[derive(Debug, Clone, Default)]
pub struct AttributeClassifier {
    config: ClassifierConfig,
}

impl AttributeClassifier {
    /// Creates a classifier from configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    fn test_attribute<'member>(
        &self,
        member: &'member DeclaredMember,
    ) -> Option<&'member AttributeUsage> {
        member.attributes.iter().find(|attribute| {
            self.config
                .test_attributes
                .iter()
                .any(|name| *name == attribute.type_name)
        })
    }
}

impl TestClassifier for AttributeClassifier {
    fn is_test_method(&self, member: &DeclaredMember) -> bool {
        member.kind == MemberKind::Method && self.test_attribute(member).is_some()
    }

    fn is_data_source_property(&self, member: &DeclaredMember, container: &DeclaredType) -> bool {
        if member.kind != MemberKind::Property
            || !member.is_static
            || member.accessibility != Accessibility::Public
        {
            return false;
        }

        container.methods().any(|method| {
            method
                .attributes
                .iter()
                .filter(|attribute| attribute.type_name == self.config.data_source_attribute)
                .any(|attribute| attribute.positional.first() == Some(&member.name))
        })
    }

    fn is_test_container(&self, declared: &DeclaredType) -> bool {
        !declared.is_abstract && declared.methods().any(|method| self.is_test_method(method))
    }

    fn skip_reason(&self, member: &DeclaredMember) -> Option<String> {
        self.test_attribute(member)?
            .named
            .get(&self.config.skip_argument)
            .filter(|reason| !reason.is_empty())
            .cloned()
    }
}

/// Whether a declaration plays `role`.
///
/// `TestStuff` is the union of every other test role; `Unknown` is its
/// complement.
pub fn is_of_role(classifier: &dyn TestClassifier, declaration: Declaration<'_>, role: TestRole) -> bool {
    match role {
        TestRole::Unknown => !is_test_stuff(classifier, declaration),
        TestRole::Test => match declaration {
            Declaration::Member { member, .. } => classifier.is_test_method(member),
            Declaration::Type(_) => false,
        },
        TestRole::TestContainer => match declaration {
            Declaration::Type(declared) => classifier.is_test_container(declared),
            Declaration::Member { .. } => false,
        },
        TestRole::TestStuff => is_test_stuff(classifier, declaration),
    }
}

/// Most specific role of a declaration.
pub fn classify(classifier: &dyn TestClassifier, declaration: Declaration<'_>) -> TestRole {
    [TestRole::Test, TestRole::TestContainer, TestRole::TestStuff]
        .into_iter()
        .find(|role| is_of_role(classifier, declaration, *role))
        .unwrap_or(TestRole::Unknown)
}

fn is_test_stuff(classifier: &dyn TestClassifier, declaration: Declaration<'_>) -> bool {
    match declaration {
        Declaration::Member { member, container } => {
            classifier.is_test_method(member) || classifier.is_data_source_property(member, container)
        }
        Declaration::Type(declared) => {
            classifier.is_test_container(declared)
                || declared
                    .nested_types
                    .iter()
                    .any(|nested| is_test_stuff(classifier, Declaration::Type(nested)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACT: &str = "Xunit.FactAttribute";
    const PROPERTY_DATA: &str = "Xunit.Extensions.PropertyDataAttribute";

    fn fact() -> AttributeUsage {
        AttributeUsage::new(FACT)
    }

    fn theory_type() -> DeclaredType {
        DeclaredType::new("N.Theories")
            .with_member(
                DeclaredMember::method("Adds")
                    .with_attribute(AttributeUsage::new("Xunit.Extensions.TheoryAttribute"))
                    .with_attribute(AttributeUsage::new(PROPERTY_DATA).with_positional("Cases")),
            )
            .with_member(DeclaredMember::property("Cases").with_static(true))
            .with_member(DeclaredMember::property("Other").with_static(true))
    }

    #[test]
    fn test_method_detection() {
        let classifier = AttributeClassifier::default();
        assert!(classifier.is_test_method(&DeclaredMember::method("A").with_attribute(fact())));
        assert!(!classifier.is_test_method(&DeclaredMember::method("A")));
        assert!(!classifier.is_test_method(&DeclaredMember::property("A").with_attribute(fact())));
    }

    #[test]
    fn test_skip_reason() {
        let classifier = AttributeClassifier::default();
        let skipped = DeclaredMember::method("B").with_attribute(fact().with_named("Skip", "flaky"));
        assert_eq!(classifier.skip_reason(&skipped), Some("flaky".to_owned()));

        let blank = DeclaredMember::method("C").with_attribute(fact().with_named("Skip", ""));
        assert_eq!(classifier.skip_reason(&blank), None);
        assert_eq!(classifier.skip_reason(&DeclaredMember::method("D")), None);
    }

    #[test]
    fn test_data_source_property() {
        let classifier = AttributeClassifier::default();
        let declared = theory_type();
        let cases = &declared.members[1];
        let other = &declared.members[2];
        assert!(classifier.is_data_source_property(cases, &declared));
        assert!(!classifier.is_data_source_property(other, &declared));

        let instance = DeclaredMember::property("Cases");
        assert!(!classifier.is_data_source_property(&instance, &declared));
    }

    #[test]
    fn test_container_and_nesting() {
        let classifier = AttributeClassifier::default();
        let inner = DeclaredType::new("N.Outer+Inner")
            .with_member(DeclaredMember::method("A").with_attribute(fact()));
        let outer = DeclaredType::new("N.Outer").with_nested(inner.clone());

        assert_eq!(classify(&classifier, Declaration::Type(&inner)), TestRole::TestContainer);
        assert_eq!(classify(&classifier, Declaration::Type(&outer)), TestRole::TestStuff);
        assert!(is_of_role(&classifier, Declaration::Type(&inner), TestRole::TestStuff));
        assert!(!is_of_role(&classifier, Declaration::Type(&outer), TestRole::Unknown));

        let plain = DeclaredType::new("N.Helper");
        assert_eq!(classify(&classifier, Declaration::Type(&plain)), TestRole::Unknown);

        let abstract_base = inner.with_abstract(true);
        assert!(!classifier.is_test_container(&abstract_base));
    }

    #[test]
    fn test_member_roles() {
        let classifier = AttributeClassifier::default();
        let declared = theory_type();
        let theory = Declaration::Member {
            member: &declared.members[0],
            container: &declared,
        };
        let data = Declaration::Member {
            member: &declared.members[1],
            container: &declared,
        };
        let unrelated = Declaration::Member {
            member: &declared.members[2],
            container: &declared,
        };

        assert_eq!(classify(&classifier, theory), TestRole::Test);
        assert_eq!(classify(&classifier, data), TestRole::TestStuff);
        assert_eq!(classify(&classifier, unrelated), TestRole::Unknown);
    }
}
