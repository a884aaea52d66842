//! Integration tests for the serialization boundary.
//!
//! Elements decoded from their own records under their own parent must equal
//! the originals; plans shipped across the channel must keep their shape.

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

use testplan_core::{
    Element, ElementAttrs, ElementId, ElementTree, IdentityKey, ProjectHandle, ProjectSet,
};
use testplan_tasks::{RunnerId, TaskSequenceBuilder, build_plan};
use testplan_wire::{
    PlanChannel, PlanEnvelope, RemoteTask, decode_element, encode_element, persist_subtree,
    restore_records,
};

const DEBUG_BUILD: &str = "/debug/N.Tests.dll";
const RELEASE_BUILD: &str = "/release/N.Tests.dll";

fn projects() -> ProjectSet {
    ProjectSet::new()
        .with_project(ProjectHandle::new("debug", "N.Tests (Debug)"))
        .with_project(ProjectHandle::new("release", "N.Tests (Release)"))
}

fn discovered() -> (ElementTree, Vec<ElementId>) {
    let mut tree = ElementTree::new();
    let mut methods = Vec::new();
    for (scope, location) in [("debug", DEBUG_BUILD), ("release", RELEASE_BUILD)] {
        for (type_name, method, skip) in [
            ("N.Alpha", "Adds", ""),
            ("N.Alpha", "Subtracts", "not implemented"),
            ("N.Beta", "Parses", ""),
        ] {
            methods.push(
                tree.get_or_create(
                    IdentityKey::new(scope, type_name, method),
                    ElementAttrs::method(location, skip),
                )
                .expect("create method"),
            );
        }
    }
    (tree, methods)
}

#[test]
fn test_every_element_round_trips_under_its_parent() {
    let (tree, _) = discovered();
    let projects = projects();

    for element in tree.iter() {
        let record = encode_element(element);
        let mut target = tree.clone();
        let decoded = decode_element(&mut target, &record, element.parent(), &projects)
            .expect("decode")
            .expect("project exists");

        let copy = target.get(&decoded).expect("decoded element");
        assert_eq!(copy, element);
        assert_eq!(copy.id(), element.id());
        assert_eq!(copy.identity(), element.identity());
        assert_eq!(copy.skip_reason(), element.skip_reason());
        assert_eq!(copy.explicit_reason(), element.explicit_reason());
        assert_eq!(copy.assembly_location(), element.assembly_location());
        assert_eq!(target.len(), tree.len());
    }
}

#[test]
fn test_restore_into_fresh_session_keeps_ids() {
    let (tree, methods) = discovered();
    let mut records = Vec::new();
    for root in tree.roots() {
        records.extend(persist_subtree(&tree, root.id()).expect("persist"));
    }

    let mut restored = ElementTree::new();
    let ids = restore_records(&mut restored, &records, None, &projects()).expect("restore");
    assert_eq!(ids.len(), tree.len());
    for method in &methods {
        let original = tree.get(method).expect("original");
        let copy = restored.get(method).expect("restored");
        assert_eq!(copy.identity(), original.identity());
        assert_eq!(
            restored.parent_of(method).expect("parent").map(Element::id),
            tree.parent_of(method).expect("parent").map(Element::id)
        );
    }
}

#[test]
fn test_restore_drops_only_vanished_project() {
    let (tree, _) = discovered();
    let mut records = Vec::new();
    for root in tree.roots() {
        records.extend(persist_subtree(&tree, root.id()).expect("persist"));
    }

    let only_release = ProjectSet::new().with_project(ProjectHandle::new("release", "N.Tests"));
    let mut restored = ElementTree::new();
    let ids = restore_records(&mut restored, &records, None, &only_release).expect("restore");

    assert_eq!(ids.len(), tree.len() / 2);
    assert!(
        restored
            .iter()
            .all(|element| element.identity().scope_id() == "release")
    );
}

fn outline(nodes: &[RemoteTask], depth: usize, lines: &mut Vec<String>) {
    for node in nodes {
        lines.push(format!("{}{}", "  ".repeat(depth), node.task));
        outline(&node.children, depth + 1, lines);
    }
}

#[tokio::test]
async fn test_plan_crosses_channel_intact() {
    let (tree, methods) = discovered();
    let runner = RunnerId::new("xunit");
    let forest = build_plan(
        &tree,
        &methods,
        from_ref(&methods[1]),
        &TaskSequenceBuilder::new(runner.clone()),
    )
    .expect("plan");

    let (channel, mut receiver) = PlanChannel::connected();
    channel
        .send(&PlanEnvelope::from_forest(&runner, &forest))
        .expect("send");

    let envelope = receiver
        .recv()
        .await
        .expect("message")
        .expect("valid envelope");
    assert_eq!(envelope.runner_id, "xunit");
    assert_eq!(envelope.task_count(), forest.len());

    let tasks = envelope.decode().expect("decode");
    let mut lines = Vec::new();
    outline(&tasks, 0, &mut lines);
    let remote = lines.join("\n") + "\n";
    let local = forest.to_string().replace(" [explicit]", "");
    assert_eq!(remote, local);

    let explicit_runs = tasks
        .iter()
        .flat_map(|assembly| &assembly.children)
        .flat_map(|class| &class.children)
        .filter(|method| method.task.explicitly())
        .count();
    assert_eq!(explicit_runs, 2, "explicit selection spans both scopes");
}
