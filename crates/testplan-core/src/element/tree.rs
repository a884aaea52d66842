use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::{Element, ElementData, ElementId, ElementKind, ElementState};
use crate::error::ParentKind;
use crate::{Error, IdentityKey, Result};

/// Attributes supplied when an element is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementAttrs {
    /// Assembly element; its identity names the artifact location
    Assembly,
    /// Class element
    Class {
        /// Artifact declaring the class
        assembly_location: String,
        /// Reason the class must be run explicitly, empty when it need not be
        explicit_reason: String,
    },
    /// Method element
    Method {
        /// Artifact declaring the owning class
        assembly_location: String,
        /// Why the test is skipped, empty when it is not
        skip_reason: String,
    },
}

impl ElementAttrs {
    /// Class attributes without an explicit reason.
    pub fn class(assembly_location: impl Into<String>) -> Self {
        Self::Class {
            assembly_location: assembly_location.into(),
            explicit_reason: String::new(),
        }
    }

    /// Method attributes.
    pub fn method(assembly_location: impl Into<String>, skip_reason: impl Into<String>) -> Self {
        Self::Method {
            assembly_location: assembly_location.into(),
            skip_reason: skip_reason.into(),
        }
    }

    /// Kind of element these attributes create.
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Assembly => ElementKind::Assembly,
            Self::Class { .. } => ElementKind::Class,
            Self::Method { .. } => ElementKind::Method,
        }
    }
}

/// Arena of test elements with get-or-create identity semantics.
///
/// Every element is reachable by id and by identity key. No two elements share
/// an identity key, so no parent can own two children with equal identity.
#[derive(Debug, Clone, Default)]
pub struct ElementTree {
    elements: HashMap<ElementId, Element>,
    by_identity: HashMap<IdentityKey, ElementId>,
    roots: Vec<ElementId>,
}

impl ElementTree {
    /// Creates an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the hierarchy holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Looks up an element by id.
    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    /// Looks up an element by id, failing when it does not exist.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn element(&self, id: &ElementId) -> Result<&Element> {
        self.get(id).ok_or_else(|| Error::UnknownElement(id.clone()))
    }

    /// Looks up an element by identity key.
    pub fn find(&self, identity: &IdentityKey) -> Option<&Element> {
        self.by_identity
            .get(identity)
            .and_then(|id| self.elements.get(id))
    }

    /// Top-level (assembly) elements in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = &Element> {
        self.roots.iter().filter_map(|id| self.elements.get(id))
    }

    /// Children of an element in insertion order.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn children_of(&self, id: &ElementId) -> Result<Vec<&Element>> {
        Ok(self
            .element(id)?
            .children
            .iter()
            .filter_map(|child| self.elements.get(child))
            .collect())
    }

    /// Owner of an element, `None` for top-level elements.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn parent_of(&self, id: &ElementId) -> Result<Option<&Element>> {
        Ok(self
            .element(id)?
            .parent
            .as_ref()
            .and_then(|parent| self.elements.get(parent)))
    }

    /// Ids of an element and all its descendants, parents before children.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn subtree(&self, id: &ElementId) -> Result<Vec<ElementId>> {
        self.element(id)?;
        let mut ordered = Vec::new();
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            if let Some(element) = self.elements.get(&next) {
                pending.extend(element.children.iter().rev().cloned());
                ordered.push(next);
            }
        }
        Ok(ordered)
    }

    /// All elements, parents before children, roots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.roots
            .iter()
            .filter_map(|root| self.subtree(root).ok())
            .flatten()
            .filter_map(|id| self.elements.get(&id))
    }

    /// Returns the element with this identity, creating it and any missing
    /// ancestors when absent.
    ///
    /// An existing element keeps its id and is refreshed from `attrs`; being
    /// reported again makes it valid.
    ///
    /// # Errors
    /// Returns [`Error::InvalidIdentity`] if the identity does not fit the kind.
    pub fn get_or_create(&mut self, identity: IdentityKey, attrs: ElementAttrs) -> Result<ElementId> {
        Self::validate(&identity, &attrs)?;

        let parent = match &attrs {
            ElementAttrs::Assembly => None,
            ElementAttrs::Class {
                assembly_location, ..
            } => Some(self.get_or_create(
                IdentityKey::container(identity.scope_id(), assembly_location.clone()),
                ElementAttrs::Assembly,
            )?),
            ElementAttrs::Method {
                assembly_location, ..
            } => Some(self.get_or_create(
                identity.container_key(),
                ElementAttrs::class(assembly_location.clone()),
            )?),
        };

        self.get_or_create_under(parent.as_ref(), identity, attrs, None)
    }

    /// Returns the element with this identity placed under `parent`, creating
    /// it when absent.
    ///
    /// `id` is used for a newly created element (persisted ids); a fresh id is
    /// generated when it is `None` or already taken.
    ///
    /// # Errors
    /// Returns [`Error::InvalidIdentity`] if the identity does not fit the kind,
    /// and [`Error::InvalidHierarchy`] if `parent` cannot own the element.
    pub fn get_or_create_under(
        &mut self,
        parent: Option<&ElementId>,
        identity: IdentityKey,
        attrs: ElementAttrs,
        id: Option<ElementId>,
    ) -> Result<ElementId> {
        Self::validate(&identity, &attrs)?;
        let parent_kind = self.kind_of(parent)?;
        Self::check_placement(parent_kind, attrs.kind())?;

        if let Some(existing) = self.by_identity.get(&identity).cloned() {
            self.set_parent(&existing, parent)?;
            self.refresh(&existing, attrs);
            return Ok(existing);
        }

        let id = match id {
            Some(requested) if !self.elements.contains_key(&requested) => requested,
            Some(taken) => {
                warn!("Element id {} already in use, assigning a fresh id to {}", taken, identity);
                ElementId::generate()
            }
            None => ElementId::generate(),
        };

        let order = parent
            .and_then(|owner| self.elements.get(owner))
            .map_or(0, |owner| owner.children.len());
        let (data, explicit_reason) = match attrs {
            ElementAttrs::Assembly => (
                ElementData::Assembly {
                    location: identity.container_type_name().to_owned(),
                },
                String::new(),
            ),
            ElementAttrs::Class {
                assembly_location,
                explicit_reason,
            } => (ElementData::Class { assembly_location }, explicit_reason),
            ElementAttrs::Method { skip_reason, .. } => (
                ElementData::Method {
                    short_name: identity.member_name().to_owned(),
                    skip_reason: skip_reason.clone(),
                    order,
                },
                skip_reason,
            ),
        };

        let element = Element {
            id: id.clone(),
            identity: identity.clone(),
            state: ElementState::Valid,
            explicit_reason,
            parent: None,
            children: Vec::new(),
            data,
        };
        debug!("Created {} element {} ({})", element.kind(), identity, id);
        self.elements.insert(id.clone(), element);
        self.by_identity.insert(identity, id.clone());
        self.attach(&id, parent);
        Ok(id)
    }

    /// Moves an element under a new owner.
    ///
    /// Does nothing if `new_parent` already owns the element. Otherwise the
    /// element leaves its old owner's children and joins the new owner's.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] for unknown ids and
    /// [`Error::InvalidHierarchy`] if `new_parent` cannot own the element.
    pub fn set_parent(&mut self, id: &ElementId, new_parent: Option<&ElementId>) -> Result<()> {
        let element = self.element(id)?;
        if element.parent.as_ref() == new_parent {
            return Ok(());
        }
        let kind = element.kind();
        let parent_kind = self.kind_of(new_parent)?;
        Self::check_placement(parent_kind, kind)?;

        self.detach(id);
        self.attach(id, new_parent);
        Ok(())
    }

    /// Records a new resolution state, returning the previous one.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn set_state(&mut self, id: &ElementId, state: ElementState) -> Result<ElementState> {
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| Error::UnknownElement(id.clone()))?;
        let previous = element.state;
        element.state = state;
        Ok(previous)
    }

    /// Replaces the explicit reason of an element.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn set_explicit_reason(&mut self, id: &ElementId, reason: impl Into<String>) -> Result<()> {
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| Error::UnknownElement(id.clone()))?;
        element.explicit_reason = reason.into();
        Ok(())
    }

    /// Destroys an element and everything it owns, returning the removed ids.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if no element has this id.
    pub fn remove(&mut self, id: &ElementId) -> Result<Vec<ElementId>> {
        let removed = self.subtree(id)?;
        self.detach(id);
        for gone in &removed {
            if let Some(element) = self.elements.remove(gone) {
                self.by_identity.remove(&element.identity);
            }
        }
        Ok(removed)
    }

    /// Removes every descendant of `root` that is not in `keep`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownElement`] if `root` does not exist.
    pub fn prune(&mut self, root: &ElementId, keep: &BTreeSet<ElementId>) -> Result<Vec<ElementId>> {
        let mut removed = Vec::new();
        for candidate in self.subtree(root)?.into_iter().skip(1) {
            if !keep.contains(&candidate) && self.elements.contains_key(&candidate) {
                removed.extend(self.remove(&candidate)?);
            }
        }
        Ok(removed)
    }

    /// Removes top-level elements of `scope_id` that own nothing, returning
    /// the removed ids.
    pub fn remove_empty_roots(&mut self, scope_id: &str) -> Vec<ElementId> {
        let empty: Vec<ElementId> = self
            .roots()
            .filter(|root| root.identity.scope_id() == scope_id && root.children.is_empty())
            .map(|root| root.id.clone())
            .collect();
        for id in &empty {
            self.detach(id);
            if let Some(element) = self.elements.remove(id) {
                debug!("Removed empty {} element {}", element.kind(), element.identity);
                self.by_identity.remove(&element.identity);
            }
        }
        empty
    }

    /// Brings a re-reported element up to date with freshly discovered
    /// attributes.
    ///
    /// A method's explicit reason follows its skip reason only while the two
    /// agree; a reason set by hand survives. A class's explicit reason is
    /// replaced only by a non-empty one.
    fn refresh(&mut self, id: &ElementId, attrs: ElementAttrs) {
        let Some(element) = self.elements.get_mut(id) else {
            return;
        };
        element.state = ElementState::Valid;
        match (&mut element.data, attrs) {
            (
                ElementData::Class { assembly_location },
                ElementAttrs::Class {
                    assembly_location: location,
                    explicit_reason,
                },
            ) => {
                if *assembly_location != location {
                    debug!("{} moved from {} to {}", element.identity, assembly_location, location);
                    *assembly_location = location;
                }
                if !explicit_reason.is_empty() {
                    element.explicit_reason = explicit_reason;
                }
            }
            (ElementData::Method { skip_reason, .. }, ElementAttrs::Method { skip_reason: reported, .. }) => {
                if *skip_reason != reported {
                    if element.explicit_reason == *skip_reason {
                        element.explicit_reason.clone_from(&reported);
                    }
                    *skip_reason = reported;
                }
            }
            _ => {}
        }
    }

    fn kind_of(&self, id: Option<&ElementId>) -> Result<Option<ElementKind>> {
        id.map(|parent| self.element(parent).map(Element::kind))
            .transpose()
    }

    fn check_placement(parent: Option<ElementKind>, child: ElementKind) -> Result<()> {
        let allowed = parent.map_or_else(|| child.is_root(), |owner| owner.can_contain(child));
        if allowed {
            Ok(())
        } else {
            Err(Error::InvalidHierarchy {
                parent: ParentKind::from(parent),
                child,
            })
        }
    }

    fn validate(identity: &IdentityKey, attrs: &ElementAttrs) -> Result<()> {
        if identity.container_type_name().is_empty() {
            return Err(Error::InvalidIdentity(format!(
                "{} element without a container name: {identity}",
                attrs.kind()
            )));
        }
        let needs_member = attrs.kind() == ElementKind::Method;
        if identity.has_member() != needs_member {
            return Err(Error::InvalidIdentity(format!(
                "{} element {} a member name: {identity}",
                attrs.kind(),
                if needs_member { "requires" } else { "must not have" }
            )));
        }
        Ok(())
    }

    fn attach(&mut self, id: &ElementId, parent: Option<&ElementId>) {
        if let Some(element) = self.elements.get_mut(id) {
            element.parent = parent.cloned();
        }
        match parent.and_then(|owner| self.elements.get_mut(owner)) {
            Some(owner) => owner.children.push(id.clone()),
            None => self.roots.push(id.clone()),
        }
    }

    fn detach(&mut self, id: &ElementId) {
        let previous = self
            .elements
            .get_mut(id)
            .and_then(|element| element.parent.take());
        let siblings = match previous.and_then(|owner| self.elements.get_mut(&owner)) {
            Some(owner) => &mut owner.children,
            None => &mut self.roots,
        };
        siblings.retain(|sibling| sibling != id);
    }
}

#[cfg(test)]
#[allow(
    clippy::missing_panics_doc,
    clippy::assertions_on_result_states,
    reason = "Test code has different conventions"
)]
mod tests {
    use super::*;

    const ASSEMBLY: &str = "/build/Tests.dll";

    fn method_identity(name: &str) -> IdentityKey {
        IdentityKey::new("proj", "N.T", name)
    }

    fn create_method(tree: &mut ElementTree, name: &str) -> ElementId {
        match tree.get_or_create(method_identity(name), ElementAttrs::method(ASSEMBLY, "")) {
            Ok(id) => id,
            Err(error) => panic!("create failed: {error}"),
        }
    }

    #[test]
    fn test_get_or_create_builds_ancestors() {
        let mut tree = ElementTree::new();
        let method = create_method(&mut tree, "A");

        assert_eq!(tree.len(), 3);
        let class = tree.parent_of(&method).ok().flatten();
        assert_eq!(class.map(Element::kind), Some(ElementKind::Class));
        let class_id = class.map(|owner| owner.id().clone());
        let assembly = class_id
            .as_ref()
            .and_then(|owner| tree.parent_of(owner).ok().flatten());
        assert_eq!(assembly.map(Element::assembly_location), Some(ASSEMBLY));
        assert_eq!(tree.roots().count(), 1);
    }

    #[test]
    fn test_get_or_create_preserves_id_and_explicit_reason() {
        let mut tree = ElementTree::new();
        let first = create_method(&mut tree, "A");
        assert!(tree.set_explicit_reason(&first, "manual only").is_ok());
        assert!(tree.set_state(&first, ElementState::Invalid).is_ok());

        let second = create_method(&mut tree, "A");
        assert_eq!(first, second);
        assert_eq!(tree.len(), 3);
        let element = tree.get(&second);
        assert_eq!(element.map(Element::explicit_reason), Some("manual only"));
        assert_eq!(element.map(Element::state), Some(ElementState::Valid));
    }

    #[test]
    fn test_method_order_and_skip_reason() {
        let mut tree = ElementTree::new();
        create_method(&mut tree, "A");
        let skipped = tree
            .get_or_create(method_identity("B"), ElementAttrs::method(ASSEMBLY, "flaky"))
            .ok();
        let element = skipped.as_ref().and_then(|id| tree.get(id));
        assert_eq!(element.map(Element::skip_reason), Some("flaky"));
        assert_eq!(element.map(Element::explicit_reason), Some("flaky"));
        assert!(matches!(
            element.map(Element::data),
            Some(ElementData::Method { order: 1, .. })
        ));
    }

    #[test]
    fn test_rediscovery_refreshes_skip_reason() {
        let mut tree = ElementTree::new();
        let skipped = tree
            .get_or_create(method_identity("B"), ElementAttrs::method(ASSEMBLY, "flaky"))
            .ok();
        let manual = create_method(&mut tree, "A");
        assert!(tree.set_explicit_reason(&manual, "manual only").is_ok());

        let again = tree
            .get_or_create(method_identity("B"), ElementAttrs::method(ASSEMBLY, ""))
            .ok();
        assert_eq!(again, skipped);
        let element = again.as_ref().and_then(|id| tree.get(id));
        assert_eq!(element.map(Element::skip_reason), Some(""));
        assert_eq!(element.map(Element::explicit_reason), Some(""));

        assert!(tree
            .get_or_create(method_identity("A"), ElementAttrs::method(ASSEMBLY, "slow"))
            .is_ok());
        let element = tree.get(&manual);
        assert_eq!(element.map(Element::skip_reason), Some("slow"));
        assert_eq!(element.map(Element::explicit_reason), Some("manual only"));
    }

    #[test]
    fn test_reparented_class_takes_new_location() {
        let mut tree = ElementTree::new();
        let method = create_method(&mut tree, "A");
        let moved = tree
            .get_or_create(method_identity("A"), ElementAttrs::method("/build/Release/Tests.dll", ""))
            .ok();
        assert_eq!(moved.as_ref(), Some(&method));

        let class = tree.parent_of(&method).ok().flatten();
        assert_eq!(class.map(Element::assembly_location), Some("/build/Release/Tests.dll"));
        assert_eq!(tree.roots().count(), 2);

        let removed = tree.remove_empty_roots("proj");
        assert_eq!(removed.len(), 1);
        let locations: Vec<&str> = tree.roots().map(Element::assembly_location).collect();
        assert_eq!(locations, vec!["/build/Release/Tests.dll"]);
        assert!(tree.find(&IdentityKey::container("proj", ASSEMBLY)).is_none());
        assert!(tree.remove_empty_roots("other").is_empty());
    }

    #[test]
    fn test_identity_validation() {
        let mut tree = ElementTree::new();
        let result = tree.get_or_create(IdentityKey::container("proj", "N.T"), ElementAttrs::method(ASSEMBLY, ""));
        assert!(matches!(result, Err(Error::InvalidIdentity(_))));

        let result = tree.get_or_create(method_identity("A"), ElementAttrs::class(ASSEMBLY));
        assert!(matches!(result, Err(Error::InvalidIdentity(_))));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_set_parent_moves_between_owners() {
        let mut tree = ElementTree::new();
        let method = create_method(&mut tree, "A");
        let old_owner = tree.parent_of(&method).ok().flatten().map(|owner| owner.id().clone());
        let new_owner = tree
            .get_or_create(IdentityKey::container("proj", "N.Other"), ElementAttrs::class(ASSEMBLY))
            .ok();

        assert!(tree.set_parent(&method, new_owner.as_ref()).is_ok());

        let old_children = old_owner
            .as_ref()
            .and_then(|owner| tree.get(owner))
            .map(|owner| owner.children().to_vec());
        assert_eq!(old_children, Some(Vec::new()));
        let new_children = new_owner
            .as_ref()
            .and_then(|owner| tree.get(owner))
            .map(|owner| owner.children().to_vec());
        assert_eq!(new_children, Some(vec![method.clone()]));
        assert_eq!(tree.get(&method).and_then(Element::parent), new_owner.as_ref());
    }

    #[test]
    fn test_set_parent_same_owner_is_noop() {
        let mut tree = ElementTree::new();
        let method = create_method(&mut tree, "A");
        let owner = tree.get(&method).and_then(Element::parent).cloned();
        assert!(tree.set_parent(&method, owner.as_ref()).is_ok());
        let children = owner
            .as_ref()
            .and_then(|id| tree.get(id))
            .map(|element| element.children().len());
        assert_eq!(children, Some(1));
    }

    #[test]
    fn test_set_parent_rejects_method_under_method() {
        let mut tree = ElementTree::new();
        let first = create_method(&mut tree, "A");
        let second = create_method(&mut tree, "B");

        let result = tree.set_parent(&second, Some(&first));
        assert!(matches!(
            result,
            Err(Error::InvalidHierarchy {
                parent: ParentKind::Element(ElementKind::Method),
                child: ElementKind::Method,
            })
        ));
        assert_eq!(tree.get(&first).map(|element| element.children().len()), Some(0));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = ElementTree::new();
        let method = create_method(&mut tree, "A");
        let owner = tree.get(&method).and_then(Element::parent).cloned();

        let removed = owner.as_ref().map(|id| tree.remove(id));
        assert!(matches!(removed, Some(Ok(ref ids)) if ids.len() == 2));
        assert_eq!(tree.len(), 1);
        assert!(tree.find(&method_identity("A")).is_none());
        assert_eq!(tree.roots().map(|root| root.children().len()).sum::<usize>(), 0);
    }

    #[test]
    fn test_prune_keeps_listed() {
        let mut tree = ElementTree::new();
        let kept = create_method(&mut tree, "A");
        let dropped = create_method(&mut tree, "B");
        let owner = tree.get(&kept).and_then(Element::parent).cloned();
        let root = tree.roots().next().map(|root| root.id().clone());

        let mut keep = BTreeSet::new();
        keep.insert(kept.clone());
        if let Some(class_id) = owner {
            keep.insert(class_id);
        }

        let removed = root.as_ref().map(|id| tree.prune(id, &keep));
        assert!(matches!(removed, Some(Ok(ref ids)) if ids == &vec![dropped.clone()]));
        assert!(tree.get(&kept).is_some());
        assert!(tree.get(&dropped).is_none());
    }

    #[test]
    fn test_iter_is_preorder() {
        let mut tree = ElementTree::new();
        create_method(&mut tree, "A");
        create_method(&mut tree, "B");
        let kinds: Vec<ElementKind> = tree.iter().map(Element::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ElementKind::Assembly,
                ElementKind::Class,
                ElementKind::Method,
                ElementKind::Method
            ]
        );
    }

    #[test]
    fn test_requested_id_is_used_once() {
        let mut tree = ElementTree::new();
        let requested = ElementId::from("persisted-1");
        let assembly = tree
            .get_or_create_under(
                None,
                IdentityKey::container("proj", ASSEMBLY),
                ElementAttrs::Assembly,
                Some(requested.clone()),
            )
            .ok();
        assert_eq!(assembly, Some(requested.clone()));

        let other = tree
            .get_or_create_under(
                None,
                IdentityKey::container("proj", "/build/Other.dll"),
                ElementAttrs::Assembly,
                Some(requested.clone()),
            )
            .ok();
        assert!(other.is_some());
        assert_ne!(other, Some(requested));
    }
}
