//! Expands one requested element into the tasks needed to run it.

use std::collections::HashSet;

use testplan_core::{
    Element, ElementId, ElementKey, ElementKind, ElementTree, Error, ParentKind, PlanConfig, Result,
};

use crate::task::{RunnerId, Task, UnitTask};

/// Elements the user selected directly.
///
/// Membership follows element equality, so an element selected under one
/// build scope counts as selected under every scope.
#[derive(Debug, Clone, Default)]
pub struct ExplicitSet {
    keys: HashSet<ElementKey>,
}

impl ExplicitSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the given elements.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if an id is not in `tree`.
    pub fn from_ids(tree: &ElementTree, ids: &[ElementId]) -> Result<Self> {
        let mut set = Self::new();
        for id in ids {
            set.insert(tree.element(id)?);
        }
        Ok(set)
    }

    /// Adds an element.
    pub fn insert(&mut self, element: &Element) {
        self.keys.insert(element.key());
    }

    /// Whether an element equal to `element` was selected.
    pub fn contains(&self, element: &Element) -> bool {
        self.keys.contains(&element.key())
    }

    /// Number of selected elements.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Builds ordered task sequences for requested elements.
#[derive(Debug, Clone)]
pub struct TaskSequenceBuilder {
    runner_id: RunnerId,
}

impl TaskSequenceBuilder {
    /// Creates a builder stamping tasks with `runner_id`.
    pub fn new(runner_id: RunnerId) -> Self {
        Self { runner_id }
    }

    /// Creates a builder for the configured runner.
    pub fn from_config(config: &PlanConfig) -> Self {
        Self::new(RunnerId::new(config.runner_id.clone()))
    }

    /// Runner stamped on every task.
    pub fn runner_id(&self) -> &RunnerId {
        &self.runner_id
    }

    /// Tasks required to run `element`.
    ///
    /// A method yields exactly an assembly load, a class load, and a method
    /// run, in that order. A class yields nothing: each of its methods brings
    /// the loads it needs and merging collapses them.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedElementKind`] for assemblies,
    /// [`Error::UnknownElement`] for unknown ids, and
    /// [`Error::MalformedParent`] if a method is not owned by a class.
    pub fn build(
        &self,
        tree: &ElementTree,
        element: &ElementId,
        explicit: &ExplicitSet,
    ) -> Result<Vec<UnitTask>> {
        let method = tree.element(element)?;
        match method.kind() {
            ElementKind::Class => Ok(Vec::new()),
            ElementKind::Assembly => Err(Error::UnsupportedElementKind {
                kind: ElementKind::Assembly,
            }),
            ElementKind::Method => {
                let class = match tree.parent_of(element)? {
                    Some(owner) if owner.kind() == ElementKind::Class => owner,
                    other => {
                        return Err(Error::MalformedParent {
                            expected: ParentKind::Element(ElementKind::Class),
                            found: ParentKind::from(other.map(Element::kind)),
                        });
                    }
                };

                Ok(vec![
                    UnitTask::new(
                        Task::assembly_load(self.runner_id.clone(), class.assembly_location()),
                        None,
                    ),
                    UnitTask::new(
                        Task::class_load(
                            self.runner_id.clone(),
                            class.identity(),
                            explicit.contains(class),
                        ),
                        Some(class.id().clone()),
                    ),
                    UnitTask::new(
                        Task::method_run(
                            self.runner_id.clone(),
                            method.identity(),
                            explicit.contains(method),
                        ),
                        Some(method.id().clone()),
                    ),
                ])
            }
        }
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
    use core::slice::from_ref;
    use crate::task::{TaskKind, TaskPayload};
    use testplan_core::{ElementAttrs, IdentityKey};

    const ASSEMBLY: &str = "/build/N.Tests.dll";

    fn method(tree: &mut ElementTree, scope: &str, name: &str) -> ElementId {
        tree.get_or_create(
            IdentityKey::new(scope, "N.T", name),
            ElementAttrs::method(ASSEMBLY, ""),
        )
        .expect("create method")
    }

    fn builder() -> TaskSequenceBuilder {
        TaskSequenceBuilder::from_config(&PlanConfig::default())
    }

    #[test]
    fn test_method_yields_three_ordered_tasks() {
        let mut tree = ElementTree::new();
        let run = method(&mut tree, "proj", "A");

        let selected = ExplicitSet::from_ids(&tree, from_ref(&run)).expect("set");
        for explicit in [ExplicitSet::new(), selected] {
            let tasks = builder().build(&tree, &run, &explicit).expect("build");
            let kinds: Vec<TaskKind> = tasks.iter().map(|unit| unit.task.kind()).collect();
            assert_eq!(
                kinds,
                vec![TaskKind::AssemblyLoad, TaskKind::ClassLoad, TaskKind::MethodRun]
            );
            assert!(tasks[0].element.is_none());
            assert_eq!(tasks[2].element.as_ref(), Some(&run));
        }
    }

    #[test]
    fn test_explicit_flags_follow_selection() {
        let mut tree = ElementTree::new();
        let run = method(&mut tree, "proj", "A");
        let class = tree
            .get(&run)
            .and_then(Element::parent)
            .cloned()
            .expect("owner");

        let explicit = ExplicitSet::from_ids(&tree, &[class]).expect("set");
        let tasks = builder().build(&tree, &run, &explicit).expect("build");
        assert!(tasks[1].task.explicitly());
        assert!(!tasks[2].task.explicitly());
        assert_eq!(
            tasks[0].task.payload(),
            &TaskPayload::AssemblyLoad {
                assembly_location: ASSEMBLY.to_owned()
            }
        );
    }

    #[test]
    fn test_explicit_selection_spans_scopes() {
        let mut tree = ElementTree::new();
        let debug = method(&mut tree, "debug", "A");
        let release = method(&mut tree, "release", "A");

        let explicit = ExplicitSet::from_ids(&tree, &[debug]).expect("set");
        let tasks = builder().build(&tree, &release, &explicit).expect("build");
        assert!(tasks[2].task.explicitly());
    }

    #[test]
    fn test_class_yields_nothing() {
        let mut tree = ElementTree::new();
        let run = method(&mut tree, "proj", "A");
        let class = tree.get(&run).and_then(Element::parent).cloned().expect("owner");

        let tasks = builder()
            .build(&tree, &class, &ExplicitSet::new())
            .expect("build");
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_assembly_is_unsupported() {
        let mut tree = ElementTree::new();
        method(&mut tree, "proj", "A");
        let assembly = tree.roots().next().map(|root| root.id().clone()).expect("root");

        let result = builder().build(&tree, &assembly, &ExplicitSet::new());
        assert!(matches!(
            result,
            Err(Error::UnsupportedElementKind {
                kind: ElementKind::Assembly
            })
        ));
    }

    #[test]
    fn test_unknown_element() {
        let tree = ElementTree::new();
        let result = builder().build(&tree, &ElementId::from("missing"), &ExplicitSet::new());
        assert!(matches!(result, Err(Error::UnknownElement(_))));
    }
}
