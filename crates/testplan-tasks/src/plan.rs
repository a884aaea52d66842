//! Composition of sequence building and merging.

use testplan_core::{ElementId, ElementTree, Result};
use tracing::info;

use crate::forest::TaskForest;
use crate::sequence::{ExplicitSet, TaskSequenceBuilder};

/// Builds the merged plan for `selected`, marking elements equal to any of
/// `explicit` as explicitly requested.
///
/// `tree` must be a stable snapshot for the duration of the call.
///
/// # Errors
/// Fails on the first element that cannot be expanded, or if the merge finds
/// conflicting runners.
pub fn build_plan(
    tree: &ElementTree,
    selected: &[ElementId],
    explicit: &[ElementId],
    builder: &TaskSequenceBuilder,
) -> Result<TaskForest> {
    let explicit_set = ExplicitSet::from_ids(tree, explicit)?;
    let sequences = selected
        .iter()
        .map(|element| builder.build(tree, element, &explicit_set))
        .collect::<Result<Vec<_>>>()?;

    let forest = TaskForest::merge(&sequences)?;
    info!(
        "Built plan for {} selected elements ({} explicit): {} tasks",
        selected.len(),
        explicit_set.len(),
        forest.len()
    );
    Ok(forest)
}
