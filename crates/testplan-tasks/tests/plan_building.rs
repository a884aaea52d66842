//! Integration tests for plan building.
//!
//! Covers sequence ordering, deduplication across requests, and explicit-flag
//! normalization over a discovered element tree.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use core::slice::from_ref;

use testplan_core::{Element, ElementAttrs, ElementId, ElementTree, Error, IdentityKey};
use testplan_tasks::{
    ExplicitSet, NodeIndex, RunnerId, TaskForest, TaskKind, TaskSequenceBuilder, build_plan,
};
use tracing_subscriber::EnvFilter;

const ASSEMBLY: &str = "/build/N.Tests.dll";

fn init_tracing() {
    drop(
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init(),
    );
}

struct Fixture {
    tree: ElementTree,
    method_a: ElementId,
    method_b: ElementId,
    class: ElementId,
}

/// Container `N.T` with `A` (runs normally) and `B` (skipped as flaky).
fn fixture() -> Fixture {
    let mut tree = ElementTree::new();
    let method_a = tree
        .get_or_create(
            IdentityKey::new("proj", "N.T", "A"),
            ElementAttrs::method(ASSEMBLY, ""),
        )
        .expect("create A");
    let method_b = tree
        .get_or_create(
            IdentityKey::new("proj", "N.T", "B"),
            ElementAttrs::method(ASSEMBLY, "flaky"),
        )
        .expect("create B");
    let class = tree
        .get(&method_a)
        .and_then(Element::parent)
        .cloned()
        .expect("owning class");
    Fixture {
        tree,
        method_a,
        method_b,
        class,
    }
}

fn builder() -> TaskSequenceBuilder {
    TaskSequenceBuilder::new(RunnerId::new("xunit"))
}

fn only_child(forest: &TaskForest, node: NodeIndex) -> NodeIndex {
    let children = forest.children(node);
    assert_eq!(children.len(), 1, "expected a single child");
    children[0]
}

#[test]
fn test_scenario_two_methods_one_explicit() {
    init_tracing();
    let fixture = fixture();
    let forest = build_plan(
        &fixture.tree,
        &[fixture.method_a.clone(), fixture.method_b.clone()],
        from_ref(&fixture.method_b),
        &builder(),
    )
    .expect("plan");

    assert_eq!(forest.roots().len(), 1);
    let root = forest.roots()[0];
    assert_eq!(
        forest.node(root).map(|node| node.task.kind()),
        Some(TaskKind::AssemblyLoad)
    );

    let class = only_child(&forest, root);
    let class_node = forest.node(class).expect("class node");
    assert_eq!(class_node.task.kind(), TaskKind::ClassLoad);
    assert!(!class_node.task.explicitly());
    assert_eq!(class_node.element.as_ref(), Some(&fixture.class));

    let methods: Vec<(Option<ElementId>, bool)> = forest
        .children(class)
        .into_iter()
        .filter_map(|node| forest.node(node))
        .map(|node| (node.element.clone(), node.task.explicitly()))
        .collect();
    assert_eq!(
        methods,
        vec![(Some(fixture.method_a), false), (Some(fixture.method_b), true)]
    );
}

#[test]
fn test_merge_is_idempotent() {
    let fixture = fixture();
    let explicit = ExplicitSet::from_ids(&fixture.tree, from_ref(&fixture.method_a)).expect("set");
    let sequence = builder()
        .build(&fixture.tree, &fixture.method_a, &explicit)
        .expect("sequence");

    let once = TaskForest::merge([&sequence]).expect("merge once");
    let twice = TaskForest::merge([&sequence, &sequence]).expect("merge twice");
    assert_eq!(once.len(), twice.len());
    assert_eq!(once.to_string(), twice.to_string());
}

#[test]
fn test_explicit_or_normalization() {
    let fixture = fixture();
    let by_method = ExplicitSet::from_ids(&fixture.tree, from_ref(&fixture.method_a)).expect("set");
    let by_class = ExplicitSet::from_ids(&fixture.tree, from_ref(&fixture.class)).expect("set");

    let forest = TaskForest::merge([
        builder()
            .build(&fixture.tree, &fixture.method_a, &by_method)
            .expect("sequence A"),
        builder()
            .build(&fixture.tree, &fixture.method_b, &by_class)
            .expect("sequence B"),
    ])
    .expect("merge");

    let class = only_child(&forest, forest.roots()[0]);
    let class_node = forest.node(class).expect("class node");
    assert!(class_node.task.explicitly());
    assert_eq!(forest.children(class).len(), 2);
    assert_eq!(forest.len(), 4);
}

#[test]
fn test_sequences_are_load_before_use() {
    let fixture = fixture();
    let forest = build_plan(
        &fixture.tree,
        &[fixture.method_b.clone(), fixture.method_a.clone()],
        &[],
        &builder(),
    )
    .expect("plan");

    for (depth, node) in forest.preorder() {
        let kind = forest.node(node).map(|plan| plan.task.kind());
        let expected = match depth {
            0 => TaskKind::AssemblyLoad,
            1 => TaskKind::ClassLoad,
            _ => TaskKind::MethodRun,
        };
        assert_eq!(kind, Some(expected));
    }
}

#[test]
fn test_class_selection_contributes_no_tasks() {
    let fixture = fixture();
    let forest = build_plan(&fixture.tree, from_ref(&fixture.class), &[], &builder()).expect("plan");
    assert!(forest.is_empty());
}

#[test]
fn test_assembly_selection_fails() {
    let fixture = fixture();
    let assembly = fixture
        .tree
        .roots()
        .next()
        .map(|root| root.id().clone())
        .expect("assembly");
    let result = build_plan(&fixture.tree, &[assembly], &[], &builder());
    assert!(matches!(result, Err(Error::UnsupportedElementKind { .. })));
}

#[test]
fn test_inconsistent_runner_is_rejected() {
    let fixture = fixture();
    let explicit = ExplicitSet::new();
    let xunit = builder()
        .build(&fixture.tree, &fixture.method_a, &explicit)
        .expect("xunit sequence");
    let other = TaskSequenceBuilder::new(RunnerId::new("other"))
        .build(&fixture.tree, &fixture.method_b, &explicit)
        .expect("other sequence");

    let result = TaskForest::merge([xunit, other]);
    match result {
        Err(error @ Error::InconsistentRunner { .. }) => assert!(error.is_fatal()),
        other_result => panic!("expected runner conflict, got {other_result:?}"),
    }
}
