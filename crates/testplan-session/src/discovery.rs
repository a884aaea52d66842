//! Turning assembly exploration results into elements.

use std::collections::BTreeSet;

use testplan_core::element::is_test_method_candidate;
use testplan_core::{
    DeclaredType, ElementAttrs, ElementId, ElementTree, IdentityKey, Result, TestClassifier,
};
use tracing::debug;

/// Exported types of one compiled artifact, as reported after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyChange {
    /// Persistent id of the project that produced the artifact
    pub project_id: String,
    /// Absolute path of the artifact
    pub assembly_location: String,
    /// Exported types with their members and nested types
    pub types: Vec<DeclaredType>,
}

impl AssemblyChange {
    /// Creates a change without types.
    pub fn new(project_id: impl Into<String>, assembly_location: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            assembly_location: assembly_location.into(),
            types: Vec::new(),
        }
    }

    /// Adds an exported type.
    #[must_use]
    pub fn with_type(mut self, declared: DeclaredType) -> Self {
        self.types.push(declared);
        self
    }

    /// Identity of the artifact's element.
    pub fn assembly_identity(&self) -> IdentityKey {
        IdentityKey::container(self.project_id.clone(), self.assembly_location.clone())
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Element of the artifact, `None` if it holds no tests
    pub assembly: Option<ElementId>,
    /// Containers and methods reported by the pass, in discovery order
    pub discovered: Vec<ElementId>,
    /// Elements removed because the pass no longer reported them
    pub pruned: Vec<ElementId>,
}

/// Applies one artifact's exported types to `tree`.
///
/// Re-reported elements keep their ids and take the reported attributes. A
/// container that moved to this artifact leaves its previous artifact, which
/// is removed once it owns nothing. With `prune` set, elements under the
/// artifact that were not reported again are removed, and an artifact without
/// tests loses its element.
///
/// # Errors
/// Fails if an element cannot be created; `tree` may then be partially updated.
pub fn apply_change(
    tree: &mut ElementTree,
    change: &AssemblyChange,
    classifier: &dyn TestClassifier,
    prune: bool,
) -> Result<DiscoveryReport> {
    let mut containers = Vec::new();
    for declared in &change.types {
        collect_containers(declared, classifier, &mut containers);
    }

    let mut report = DiscoveryReport::default();
    let assembly_identity = change.assembly_identity();

    if containers.is_empty() {
        if prune && let Some(existing) = tree.find(&assembly_identity).map(|element| element.id().clone()) {
            report.pruned = tree.remove(&existing)?;
        }
        return Ok(report);
    }

    let assembly = tree.get_or_create(assembly_identity, ElementAttrs::Assembly)?;
    for declared in containers {
        let class = tree.get_or_create_under(
            Some(&assembly),
            IdentityKey::container(change.project_id.clone(), declared.name.clone()),
            ElementAttrs::class(change.assembly_location.clone()),
            None,
        )?;
        report.discovered.push(class.clone());

        for method in declared
            .methods()
            .filter(|member| classifier.is_test_method(member) && is_test_method_candidate(member))
        {
            let skip_reason = classifier.skip_reason(method).unwrap_or_default();
            let id = tree.get_or_create_under(
                Some(&class),
                IdentityKey::new(change.project_id.clone(), declared.name.clone(), method.name.clone()),
                ElementAttrs::method(change.assembly_location.clone(), skip_reason),
                None,
            )?;
            report.discovered.push(id);
        }
    }

    if prune {
        let keep: BTreeSet<ElementId> = report.discovered.iter().cloned().collect();
        report.pruned = tree.prune(&assembly, &keep)?;
    }
    report
        .pruned
        .extend(tree.remove_empty_roots(&change.project_id));
    debug!(
        "Discovered {} elements in {} ({} pruned)",
        report.discovered.len(),
        change.assembly_location,
        report.pruned.len()
    );
    report.assembly = Some(assembly);
    Ok(report)
}

fn collect_containers<'change>(
    declared: &'change DeclaredType,
    classifier: &dyn TestClassifier,
    containers: &mut Vec<&'change DeclaredType>,
) {
    if classifier.is_test_container(declared) {
        containers.push(declared);
    }
    for nested in &declared.nested_types {
        collect_containers(nested, classifier, containers);
    }
}

#[cfg(test)]
#[allow(
    clippy::missing_panics_doc,
    clippy::expect_used,
    reason = "Test code is allowed to use expect"
)]
mod tests {
    use super::*;
    use testplan_core::{
        Accessibility, AttributeClassifier, AttributeUsage, DeclaredMember, Element, ElementKind,
    };

    const ASSEMBLY: &str = "/build/N.Tests.dll";

    fn fact() -> AttributeUsage {
        AttributeUsage::new("Xunit.FactAttribute")
    }

    fn container(methods: &[&str]) -> DeclaredType {
        methods.iter().fold(DeclaredType::new("N.T"), |declared, name| {
            declared.with_member(DeclaredMember::method(*name).with_attribute(fact()))
        })
    }

    fn method_names(tree: &ElementTree) -> Vec<String> {
        tree.iter()
            .filter(|element| element.kind() == ElementKind::Method)
            .map(|element| element.presentation().to_owned())
            .collect()
    }

    #[test]
    fn test_discovers_containers_and_methods() {
        let mut tree = ElementTree::new();
        let change = AssemblyChange::new("proj", ASSEMBLY)
            .with_type(
                container(&["A"]).with_member(
                    DeclaredMember::method("B").with_attribute(fact().with_named("Skip", "flaky")),
                ),
            )
            .with_type(DeclaredType::new("N.Helper").with_member(DeclaredMember::method("Util")));

        let report = apply_change(&mut tree, &change, &AttributeClassifier::default(), true)
            .expect("discover");
        assert_eq!(report.discovered.len(), 3);
        assert_eq!(tree.len(), 4);
        assert_eq!(method_names(&tree), vec!["A", "B"]);

        let skipped = tree
            .find(&IdentityKey::new("proj", "N.T", "B"))
            .expect("method B");
        assert_eq!(skipped.skip_reason(), "flaky");
        assert!(skipped.is_explicit());
    }

    #[test]
    fn test_filters_non_candidates() {
        let mut tree = ElementTree::new();
        let change = AssemblyChange::new("proj", ASSEMBLY).with_type(
            container(&["A"])
                .with_member(
                    DeclaredMember::method("Generic")
                        .with_attribute(fact())
                        .with_type_parameters(1),
                )
                .with_member(
                    DeclaredMember::method("Hidden")
                        .with_attribute(fact())
                        .with_accessibility(Accessibility::Private),
                ),
        );

        apply_change(&mut tree, &change, &AttributeClassifier::default(), true).expect("discover");
        assert_eq!(method_names(&tree), vec!["A"]);
    }

    #[test]
    fn test_rediscovery_is_idempotent_and_stable() {
        let mut tree = ElementTree::new();
        let change = AssemblyChange::new("proj", ASSEMBLY).with_type(container(&["A", "B"]));
        let classifier = AttributeClassifier::default();

        let first = apply_change(&mut tree, &change, &classifier, true).expect("first pass");
        let second = apply_change(&mut tree, &change, &classifier, true).expect("second pass");
        assert_eq!(first, second);
        assert!(second.pruned.is_empty());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_unreported_elements_are_pruned() {
        let mut tree = ElementTree::new();
        let classifier = AttributeClassifier::default();
        let before = AssemblyChange::new("proj", ASSEMBLY).with_type(container(&["A", "B"]));
        let after = AssemblyChange::new("proj", ASSEMBLY).with_type(container(&["A"]));

        apply_change(&mut tree, &before, &classifier, true).expect("first pass");
        let removed = tree
            .find(&IdentityKey::new("proj", "N.T", "B"))
            .map(|element| element.id().clone())
            .expect("method B");
        let report = apply_change(&mut tree, &after, &classifier, true).expect("second pass");
        assert_eq!(report.pruned, vec![removed]);
        assert_eq!(method_names(&tree), vec!["A"]);

        apply_change(&mut tree, &before, &classifier, false).expect("third pass");
        apply_change(&mut tree, &after, &classifier, false).expect("fourth pass");
        assert_eq!(method_names(&tree), vec!["A", "B"]);
    }

    #[test]
    fn test_rediscovery_refreshes_skip_reason() {
        let mut tree = ElementTree::new();
        let classifier = AttributeClassifier::default();
        let skipped = AssemblyChange::new("proj", ASSEMBLY).with_type(
            container(&["A"]).with_member(
                DeclaredMember::method("B").with_attribute(fact().with_named("Skip", "flaky")),
            ),
        );
        let fixed = AssemblyChange::new("proj", ASSEMBLY).with_type(container(&["A", "B"]));
        let identity = IdentityKey::new("proj", "N.T", "B");

        apply_change(&mut tree, &skipped, &classifier, true).expect("first pass");
        let before = tree.find(&identity).map(|element| element.id().clone());
        apply_change(&mut tree, &fixed, &classifier, true).expect("second pass");

        let method = tree.find(&identity).expect("method B");
        assert_eq!(Some(method.id()), before.as_ref());
        assert_eq!(method.skip_reason(), "");
        assert!(!method.is_explicit());

        apply_change(&mut tree, &skipped, &classifier, true).expect("third pass");
        let method = tree.find(&identity).expect("method B");
        assert_eq!(method.skip_reason(), "flaky");
        assert_eq!(method.explicit_reason(), "flaky");
    }

    #[test]
    fn test_moved_artifact_takes_its_containers() {
        const RELEASE: &str = "/build/Release/N.Tests.dll";
        let mut tree = ElementTree::new();
        let classifier = AttributeClassifier::default();
        let first = apply_change(
            &mut tree,
            &AssemblyChange::new("proj", ASSEMBLY).with_type(container(&["A"])),
            &classifier,
            true,
        )
        .expect("first pass");
        let report = apply_change(
            &mut tree,
            &AssemblyChange::new("proj", RELEASE).with_type(container(&["A"])),
            &classifier,
            true,
        )
        .expect("second pass");

        let old_assembly = first.assembly.expect("old assembly");
        assert_eq!(report.pruned, vec![old_assembly.clone()]);
        assert!(tree.get(&old_assembly).is_none());
        let roots: Vec<&str> = tree.roots().map(Element::assembly_location).collect();
        assert_eq!(roots, vec![RELEASE]);

        let class = tree
            .find(&IdentityKey::container("proj", "N.T"))
            .expect("class");
        assert_eq!(class.assembly_location(), RELEASE);
        assert_eq!(class.parent(), report.assembly.as_ref());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_assembly_without_tests_is_removed() {
        let mut tree = ElementTree::new();
        let classifier = AttributeClassifier::default();
        apply_change(
            &mut tree,
            &AssemblyChange::new("proj", ASSEMBLY).with_type(container(&["A"])),
            &classifier,
            true,
        )
        .expect("first pass");

        let report = apply_change(&mut tree, &AssemblyChange::new("proj", ASSEMBLY), &classifier, true)
            .expect("second pass");
        assert_eq!(report.assembly, None);
        assert_eq!(report.pruned.len(), 3);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_nested_containers_are_found() {
        let mut tree = ElementTree::new();
        let inner = DeclaredType::new("N.Outer+Inner")
            .with_member(DeclaredMember::method("A").with_attribute(fact()));
        let change = AssemblyChange::new("proj", ASSEMBLY)
            .with_type(DeclaredType::new("N.Outer").with_nested(inner));

        apply_change(&mut tree, &change, &AttributeClassifier::default(), true).expect("discover");
        let classes: Vec<&str> = tree
            .iter()
            .filter(|element| element.kind() == ElementKind::Class)
            .map(Element::presentation)
            .collect();
        assert_eq!(classes, vec!["N.Outer+Inner"]);
    }
}
