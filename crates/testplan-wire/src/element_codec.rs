//! Element persistence through flat records.

use std::collections::{HashMap, HashSet};

use testplan_core::{
    Element, ElementAttrs, ElementId, ElementKind, ElementTree, Error, IdentityKey, ParentKind,
    ProjectRegistry, Result,
};
use tracing::{debug, info};

use crate::record::{Record, RecordKind, attr};

/// Encodes one element without its parent link.
pub fn encode_element(element: &Element) -> Record {
    let identity = element.identity();
    let base = |kind| {
        Record::new(kind)
            .with(attr::ID, element.id().as_str())
            .with(attr::PROJECT_ID, identity.scope_id())
    };
    match element.kind() {
        ElementKind::Assembly => base(RecordKind::AssemblyElement)
            .with(attr::ASSEMBLY_LOCATION, element.assembly_location()),
        ElementKind::Class => base(RecordKind::ClassElement)
            .with(attr::TYPE_NAME, identity.container_type_name())
            .with(attr::ASSEMBLY_LOCATION, element.assembly_location())
            .with(attr::EXPLICIT_REASON, element.explicit_reason()),
        ElementKind::Method => base(RecordKind::MethodElement)
            .with(attr::TYPE_NAME, identity.container_type_name())
            .with(attr::METHOD_NAME, identity.member_name())
            .with(attr::SKIP_REASON, element.skip_reason())
            .with(attr::EXPLICIT_REASON, element.explicit_reason()),
    }
}

/// Decodes a record into `tree` under `parent`.
///
/// Returns `Ok(None)` when the record's project no longer exists; callers drop
/// such records silently. A persisted id is reused unless another element
/// already holds it.
///
/// # Errors
/// Returns [`Error::MalformedParent`] if `parent` is not the container kind the
/// record requires, and [`Error::MalformedRecord`] for task records or missing
/// attributes.
pub fn decode_element(
    tree: &mut ElementTree,
    record: &Record,
    parent: Option<&ElementId>,
    projects: &dyn ProjectRegistry,
) -> Result<Option<ElementId>> {
    let kind = match record.kind() {
        RecordKind::AssemblyElement => ElementKind::Assembly,
        RecordKind::ClassElement => ElementKind::Class,
        RecordKind::MethodElement => ElementKind::Method,
        RecordKind::AssemblyTask | RecordKind::ClassTask | RecordKind::MethodTask => {
            return Err(Error::MalformedRecord(format!(
                "{:?} is not an element record",
                record.kind()
            )));
        }
    };
    let expected = match kind {
        ElementKind::Assembly => ParentKind::Root,
        ElementKind::Class => ParentKind::Element(ElementKind::Assembly),
        ElementKind::Method => ParentKind::Element(ElementKind::Class),
    };
    let owner = parent.map(|id| tree.element(id)).transpose()?;
    let found = ParentKind::from(owner.map(Element::kind));
    if found != expected {
        return Err(Error::MalformedParent { expected, found });
    }
    let owner_location = owner.map(|element| element.assembly_location().to_owned());

    let project_id = record.require(attr::PROJECT_ID)?;
    if projects.find_project_by_persistent_id(project_id).is_none() {
        debug!(
            "Dropping persisted {} record: project {} no longer exists",
            kind, project_id
        );
        return Ok(None);
    }

    let (identity, attrs) = match kind {
        ElementKind::Assembly => (
            IdentityKey::container(project_id, record.require(attr::ASSEMBLY_LOCATION)?),
            ElementAttrs::Assembly,
        ),
        ElementKind::Class => (
            IdentityKey::container(project_id, record.require(attr::TYPE_NAME)?),
            ElementAttrs::Class {
                assembly_location: record.get_or_empty(attr::ASSEMBLY_LOCATION).to_owned(),
                explicit_reason: record.get_or_empty(attr::EXPLICIT_REASON).to_owned(),
            },
        ),
        ElementKind::Method => (
            IdentityKey::new(
                project_id,
                record.require(attr::TYPE_NAME)?,
                record.require(attr::METHOD_NAME)?,
            ),
            ElementAttrs::method(
                owner_location.unwrap_or_default(),
                record.get_or_empty(attr::SKIP_REASON),
            ),
        ),
    };

    let persisted = record
        .get(attr::ID)
        .filter(|id| !id.is_empty())
        .map(ElementId::from);
    let id = tree.get_or_create_under(parent, identity, attrs, persisted)?;
    if kind == ElementKind::Method {
        tree.set_explicit_reason(&id, record.get_or_empty(attr::EXPLICIT_REASON))?;
    }
    Ok(Some(id))
}

/// Encodes an element and all its descendants, parents first.
///
/// Each record carries the persisted id of its owner in `parentId`, empty for
/// a top-level element.
///
/// # Errors
/// Returns [`Error::UnknownElement`] if `root` is not in `tree`.
pub fn persist_subtree(tree: &ElementTree, root: &ElementId) -> Result<Vec<Record>> {
    let records = tree
        .subtree(root)?
        .iter()
        .filter_map(|id| tree.get(id))
        .map(|element| {
            let parent_id = element.parent().map_or("", ElementId::as_str);
            encode_element(element).with(attr::PARENT_ID, parent_id)
        })
        .collect::<Vec<_>>();
    debug!("Persisted {} records under {}", records.len(), root);
    Ok(records)
}

/// Rebuilds persisted records into `tree`.
///
/// Records must be in the order [`persist_subtree`] writes them. A record whose
/// `parentId` names an earlier record is placed under that record's element;
/// any other record goes under `root`. Records of vanished projects are
/// dropped together with everything persisted beneath them.
///
/// # Errors
/// Fails on the first record that cannot be decoded for any reason other than
/// a missing project.
pub fn restore_records(
    tree: &mut ElementTree,
    records: &[Record],
    root: Option<&ElementId>,
    projects: &dyn ProjectRegistry,
) -> Result<Vec<ElementId>> {
    let mut restored_ids: HashMap<String, ElementId> = HashMap::new();
    let mut dropped: HashSet<String> = HashSet::new();
    let mut restored = Vec::with_capacity(records.len());

    for record in records {
        let persisted_id = record.get_or_empty(attr::ID).to_owned();
        let parent_id = record.get_or_empty(attr::PARENT_ID);

        if !parent_id.is_empty() && dropped.contains(parent_id) {
            debug!("Dropping persisted {:?} {}: owner was dropped", record.kind(), persisted_id);
            dropped.insert(persisted_id);
            continue;
        }
        let parent = restored_ids.get(parent_id).or(root).cloned();

        match decode_element(tree, record, parent.as_ref(), projects)? {
            Some(id) => {
                restored_ids.insert(persisted_id, id.clone());
                restored.push(id);
            }
            None => {
                dropped.insert(persisted_id);
            }
        }
    }

    info!(
        "Restored {} of {} persisted elements",
        restored.len(),
        records.len()
    );
    Ok(restored)
}

#[cfg(test)]
#[allow(
    clippy::missing_panics_doc,
    clippy::expect_used,
    reason = "Test code is allowed to use expect"
)]
mod tests {
    use super::*;
    use testplan_core::{ProjectHandle, ProjectSet};

    const ASSEMBLY: &str = "/build/N.Tests.dll";

    fn projects() -> ProjectSet {
        ProjectSet::new().with_project(ProjectHandle::new("proj", "N.Tests"))
    }

    fn populated() -> (ElementTree, ElementId) {
        let mut tree = ElementTree::new();
        let method = tree
            .get_or_create(
                IdentityKey::new("proj", "N.T", "B"),
                ElementAttrs::method(ASSEMBLY, "flaky"),
            )
            .expect("create method");
        (tree, method)
    }

    #[test]
    fn test_method_record_attributes() {
        let (tree, method) = populated();
        let record = encode_element(tree.get(&method).expect("method"));

        assert_eq!(record.kind(), RecordKind::MethodElement);
        assert_eq!(record.get(attr::PROJECT_ID), Some("proj"));
        assert_eq!(record.get(attr::TYPE_NAME), Some("N.T"));
        assert_eq!(record.get(attr::METHOD_NAME), Some("B"));
        assert_eq!(record.get(attr::SKIP_REASON), Some("flaky"));
        assert_eq!(record.get(attr::EXPLICIT_REASON), Some("flaky"));
    }

    #[test]
    fn test_method_explicit_reason_survives_decode() {
        let (mut tree, method) = populated();
        tree.set_explicit_reason(&method, "manual").expect("explicit reason");
        let class = tree.get(&method).and_then(Element::parent).cloned().expect("class");
        let record = encode_element(tree.get(&method).expect("method"));

        let mut target = tree.clone();
        target.set_explicit_reason(&method, "").expect("clear");
        let decoded = decode_element(&mut target, &record, Some(&class), &projects())
            .expect("decode")
            .expect("project exists");
        let copy = target.get(&decoded).expect("decoded");
        assert_eq!(copy.explicit_reason(), "manual");
        assert_eq!(copy.skip_reason(), "flaky");
    }

    #[test]
    fn test_empty_skip_reason_is_written() {
        let mut tree = ElementTree::new();
        let method = tree
            .get_or_create(IdentityKey::new("proj", "N.T", "A"), ElementAttrs::method(ASSEMBLY, ""))
            .expect("create method");
        let record = encode_element(tree.get(&method).expect("method"));
        assert_eq!(record.get(attr::SKIP_REASON), Some(""));
    }

    #[test]
    fn test_method_under_assembly_is_malformed() {
        let (tree, method) = populated();
        let record = encode_element(tree.get(&method).expect("method"));
        let assembly = tree.roots().next().map(|root| root.id().clone()).expect("root");

        let mut target = tree.clone();
        let result = decode_element(&mut target, &record, Some(&assembly), &projects());
        assert!(matches!(
            result,
            Err(Error::MalformedParent {
                expected: ParentKind::Element(ElementKind::Class),
                found: ParentKind::Element(ElementKind::Assembly),
            })
        ));
    }

    #[test]
    fn test_missing_project_decodes_to_none() {
        let (tree, method) = populated();
        let record = encode_element(tree.get(&method).expect("method"));
        let class = tree.get(&method).and_then(Element::parent).cloned().expect("class");

        let mut target = tree.clone();
        let before = target.len();
        let decoded = decode_element(&mut target, &record, Some(&class), &ProjectSet::new())
            .expect("decode");
        assert!(decoded.is_none());
        assert_eq!(target.len(), before);
    }

    #[test]
    fn test_task_record_is_not_an_element() {
        let mut tree = ElementTree::new();
        let record = Record::new(RecordKind::ClassTask);
        let result = decode_element(&mut tree, &record, None, &projects());
        assert!(matches!(result, Err(Error::MalformedRecord(_))));
    }

    #[test]
    fn test_persist_and_restore_round_trip() {
        let (mut tree, method) = populated();
        let class = tree.get(&method).and_then(Element::parent).cloned().expect("class");
        tree.set_explicit_reason(&class, "slow").expect("explicit reason");
        let assembly = tree.roots().next().map(|root| root.id().clone()).expect("root");

        let records = persist_subtree(&tree, &assembly).expect("persist");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get(attr::PARENT_ID), Some(""));
        assert_eq!(records[2].get(attr::PARENT_ID), Some(class.as_str()));

        let mut restored_tree = ElementTree::new();
        let restored = restore_records(&mut restored_tree, &records, None, &projects())
            .expect("restore");
        assert_eq!(restored, vec![assembly, class.clone(), method.clone()]);

        let original = tree.get(&method).expect("original");
        let copy = restored_tree.get(&method).expect("copy");
        assert_eq!(copy, original);
        assert_eq!(copy.identity(), original.identity());
        assert_eq!(copy.skip_reason(), "flaky");
        assert_eq!(copy.parent(), Some(&class));
        assert_eq!(
            restored_tree.get(&class).map(Element::explicit_reason),
            Some("slow")
        );
        assert_eq!(
            restored_tree.get(&class).map(Element::assembly_location),
            Some(ASSEMBLY)
        );
    }

    #[test]
    fn test_restore_drops_descendants_of_missing_project() {
        let (tree, _) = populated();
        let assembly = tree.roots().next().map(|root| root.id().clone()).expect("root");
        let records = persist_subtree(&tree, &assembly).expect("persist");

        let mut restored_tree = ElementTree::new();
        let restored = restore_records(&mut restored_tree, &records, None, &ProjectSet::new())
            .expect("restore");
        assert!(restored.is_empty());
        assert!(restored_tree.is_empty());
    }
}
