//! Deduplicated execution plan built from independently requested task
//! sequences.

use core::fmt;
use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use testplan_core::{ElementId, Error, Result};
use tracing::debug;

use crate::task::{Task, TaskKey, UnitTask};

/// One node of the merged plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    /// Work to perform
    pub task: Task,
    /// Element the task executes; `None` for assembly loads
    pub element: Option<ElementId>,
}

/// Forest of plan nodes where equal work appears once per position.
///
/// Roots are distinct assembly loads, their children distinct class loads, and
/// theirs distinct method runs. Tasks that differ only in their explicit flag
/// share a node whose flag is the logical OR of every occurrence.
#[derive(Debug, Clone, Default)]
pub struct TaskForest {
    graph: DiGraph<PlanNode, ()>,
    roots: Vec<NodeIndex>,
    index: HashMap<(Option<NodeIndex>, TaskKey), NodeIndex>,
}

impl TaskForest {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges task sequences into a single plan.
    ///
    /// # Errors
    /// Returns [`Error::InconsistentRunner`] if two tasks describing the same
    /// work name different runners.
    pub fn merge<S>(sequences: impl IntoIterator<Item = S>) -> Result<Self>
    where
        S: AsRef<[UnitTask]>,
    {
        let mut forest = Self::new();
        for sequence in sequences {
            forest.insert_sequence(sequence.as_ref())?;
        }
        debug!(
            "Merged plan: {} roots, {} nodes",
            forest.roots.len(),
            forest.len()
        );
        Ok(forest)
    }

    /// Adds one ordered sequence, reusing nodes for work already planned.
    ///
    /// The plan is unchanged when an error is returned.
    ///
    /// # Errors
    /// Returns [`Error::InconsistentRunner`] if a task matches planned work
    /// for a different runner.
    pub fn insert_sequence(&mut self, sequence: &[UnitTask]) -> Result<()> {
        self.check_runners(sequence)?;

        let mut position: Option<NodeIndex> = None;
        for unit in sequence {
            let key = (position, unit.task.key());
            let node = if let Some(&existing) = self.index.get(&key) {
                self.absorb(existing, unit);
                existing
            } else {
                let created = self.graph.add_node(PlanNode {
                    task: unit.task.clone(),
                    element: unit.element.clone(),
                });
                match position {
                    Some(parent) => {
                        self.graph.add_edge(parent, created, ());
                    }
                    None => self.roots.push(created),
                }
                self.index.insert(key, created);
                created
            };
            position = Some(node);
        }
        Ok(())
    }

    /// Root nodes in insertion order.
    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Children of a node in insertion order.
    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        children.sort_unstable();
        children
    }

    /// Looks up a node.
    pub fn node(&self, node: NodeIndex) -> Option<&PlanNode> {
        self.graph.node_weight(node)
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the plan holds no work.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every node with its depth, parents before children.
    pub fn preorder(&self) -> Vec<(usize, NodeIndex)> {
        let mut ordered = Vec::with_capacity(self.len());
        let mut pending: Vec<(usize, NodeIndex)> =
            self.roots.iter().rev().map(|root| (0, *root)).collect();
        while let Some((depth, node)) = pending.pop() {
            ordered.push((depth, node));
            pending.extend(
                self.children(node)
                    .into_iter()
                    .rev()
                    .map(|child| (depth + 1, child)),
            );
        }
        ordered
    }

    /// Nodes whose tasks report results.
    pub fn meaningful_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|node| node.task.is_meaningful())
            .count()
    }

    fn check_runners(&self, sequence: &[UnitTask]) -> Result<()> {
        let mut position: Option<NodeIndex> = None;
        for unit in sequence {
            let Some(&existing) = self.index.get(&(position, unit.task.key())) else {
                return Ok(());
            };
            let planned = &self.graph[existing].task;
            if planned.runner_id() != unit.task.runner_id() {
                return Err(Error::InconsistentRunner {
                    existing: planned.runner_id().to_string(),
                    incoming: unit.task.runner_id().to_string(),
                });
            }
            position = Some(existing);
        }
        Ok(())
    }

    fn absorb(&mut self, existing: NodeIndex, unit: &UnitTask) {
        let node = &mut self.graph[existing];
        if unit.task.explicitly() && !node.task.explicitly() {
            debug!("Marking {} explicit after merge", node.task);
            node.task.set_explicitly(true);
        }
        if node.element.is_none() {
            node.element.clone_from(&unit.element);
        }
    }
}

impl fmt::Display for TaskForest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, node) in self.preorder() {
            let task = &self.graph[node].task;
            let marker = if task.explicitly() { " [explicit]" } else { "" };
            writeln!(formatter, "{:indent$}{task}{marker}", "", indent = depth * 2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::assertions_on_result_states,
    reason = "Test code has different conventions"
)]
mod tests {
    use super::*;
    use crate::task::RunnerId;
    use testplan_core::IdentityKey;

    fn runner() -> RunnerId {
        RunnerId::new("xunit")
    }

    fn sequence(method: &str, class_explicit: bool, method_explicit: bool) -> Vec<UnitTask> {
        let identity = IdentityKey::new("proj", "N.T", method);
        vec![
            UnitTask::new(Task::assembly_load(runner(), "/bin/T.dll"), None),
            UnitTask::new(
                Task::class_load(runner(), &identity.container_key(), class_explicit),
                Some(ElementId::from("class")),
            ),
            UnitTask::new(
                Task::method_run(runner(), &identity, method_explicit),
                Some(ElementId::from(method)),
            ),
        ]
    }

    #[test]
    fn test_shared_prefix_is_collapsed() {
        let forest = match TaskForest::merge([sequence("A", false, false), sequence("B", false, false)]) {
            Ok(forest) => forest,
            Err(error) => panic!("merge failed: {error}"),
        };

        assert_eq!(forest.roots().len(), 1);
        assert_eq!(forest.len(), 4);
        assert_eq!(forest.meaningful_count(), 3);
        let class = forest.children(forest.roots()[0]);
        assert_eq!(class.len(), 1);
        let methods = forest.children(class[0]);
        let names: Vec<String> = methods
            .iter()
            .filter_map(|node| forest.node(*node))
            .map(|node| node.task.to_string())
            .collect();
        assert_eq!(names, vec!["MethodTask(N.T.A)", "MethodTask(N.T.B)"]);
    }

    #[test]
    fn test_explicit_flags_are_ored() {
        let forest = match TaskForest::merge([sequence("A", false, true), sequence("B", true, false)]) {
            Ok(forest) => forest,
            Err(error) => panic!("merge failed: {error}"),
        };

        assert_eq!(
            forest.to_string(),
            "AssemblyTask(/bin/T.dll)\n  ClassTask(N.T) [explicit]\n    MethodTask(N.T.A) [explicit]\n    MethodTask(N.T.B)\n"
        );
    }

    #[test]
    fn test_runner_conflict_leaves_plan_untouched() {
        let mut forest = TaskForest::new();
        assert!(forest.insert_sequence(&sequence("A", false, false)).is_ok());

        let mut foreign = sequence("A", true, true);
        for unit in &mut foreign {
            unit.task = Task::new(RunnerId::new("nunit"), unit.task.payload().clone());
        }
        let result = forest.insert_sequence(&foreign);
        assert!(matches!(
            result,
            Err(Error::InconsistentRunner { ref existing, ref incoming })
                if existing == "xunit" && incoming == "nunit"
        ));
        assert!(!forest.to_string().contains("[explicit]"));
    }

    #[test]
    fn test_element_binding_is_filled_in() {
        let mut unbound = sequence("A", false, false);
        unbound[1].element = None;
        let forest = match TaskForest::merge([unbound, sequence("A", false, false)]) {
            Ok(forest) => forest,
            Err(error) => panic!("merge failed: {error}"),
        };
        let class = forest.children(forest.roots()[0]);
        assert_eq!(
            forest.node(class[0]).and_then(|node| node.element.clone()),
            Some(ElementId::from("class"))
        );
    }

    #[test]
    fn test_empty_sequences() {
        let forest = match TaskForest::merge(Vec::<Vec<UnitTask>>::new()) {
            Ok(forest) => forest,
            Err(error) => panic!("merge failed: {error}"),
        };
        assert!(forest.is_empty());
        assert!(forest.preorder().is_empty());
    }
}
