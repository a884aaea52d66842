//! Execution tasks for discovered tests.
//!
//! Each requested element expands into an ordered task sequence; sequences
//! from one request are merged into a [`TaskForest`] so shared assembly and
//! class loads run once.

/// Deduplicated plan forest.
pub mod forest;
/// Plan composition.
pub mod plan;
/// Sequence building and explicit selection.
pub mod sequence;
/// Task model.
pub mod task;

pub use forest::{PlanNode, TaskForest};
pub use petgraph::graph::NodeIndex;
pub use plan::build_plan;
pub use sequence::{ExplicitSet, TaskSequenceBuilder};
pub use task::{RunnerId, Task, TaskKey, TaskKind, TaskPayload, UnitTask};
