use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{Element, ElementKind, ElementState};
use crate::source::{
    Accessibility, DeclaredMember, Disposition, MemberKind, SourceIndex, SourceTarget,
};

/// Whether a declared member can be run as a test method: a concrete,
/// non-generic method visible outside its type's module boundary.
pub fn is_test_method_candidate(member: &DeclaredMember) -> bool {
    member.kind == MemberKind::Method
        && !member.is_abstract
        && member.type_parameter_count == 0
        && matches!(
            member.accessibility,
            Accessibility::Public | Accessibility::Internal
        )
}

/// Resolves the declared method behind a method element.
///
/// When several declarations qualify the first one in enumeration order wins.
/// Containers never resolve to a member.
pub fn resolve_declared_member(element: &Element, index: &dyn SourceIndex) -> Option<DeclaredMember> {
    if element.kind() != ElementKind::Method {
        return None;
    }
    let identity = element.identity();
    index
        .enumerate_members(&identity.container_key(), identity.member_name())?
        .into_iter()
        .find(is_test_method_candidate)
}

/// Resolves the declaration sites of an element.
///
/// Locations are ordered by file path, then by offset. An element with no
/// resolvable declaration is [`Disposition::Invalid`].
pub fn resolve_disposition(element: &Element, index: &dyn SourceIndex) -> Disposition {
    let mut locations = match element.kind() {
        ElementKind::Method => match resolve_declared_member(element, index) {
            Some(member) => index.locations_of(&member),
            None => return Disposition::Invalid,
        },
        ElementKind::Class => index.container_locations(&element.identity().container_key()),
        ElementKind::Assembly => return Disposition::Invalid,
    };

    if locations.is_empty() {
        return Disposition::Invalid;
    }
    locations.sort_by(|left, right| {
        left.file
            .cmp(&right.file)
            .then(left.name_range.start.cmp(&right.name_range.start))
    });
    Disposition::Locations(locations)
}

/// Files an element is declared in.
///
/// Prefers the container's file when the container lives in exactly one file,
/// otherwise falls back to the files of the resolved member.
pub fn source_files(element: &Element, index: &dyn SourceIndex) -> BTreeSet<PathBuf> {
    if element.kind() == ElementKind::Assembly {
        return BTreeSet::new();
    }

    let container = element.identity().container_key();
    let container_files = index.source_files_of(SourceTarget::Container(&container));
    if container_files.len() == 1 || element.kind() == ElementKind::Class {
        return container_files;
    }

    resolve_declared_member(element, index).map_or_else(BTreeSet::new, |member| {
        index.source_files_of(SourceTarget::Member(&member))
    })
}

/// Computes the state an element should be in against the current source.
pub fn resolve_state(element: &Element, index: &dyn SourceIndex) -> ElementState {
    let identity = element.identity();
    match element.kind() {
        ElementKind::Assembly => ElementState::Valid,
        ElementKind::Class => {
            if index.container_locations(&identity.container_key()).is_empty() {
                ElementState::NotFound
            } else {
                ElementState::Valid
            }
        }
        ElementKind::Method => {
            match index.enumerate_members(&identity.container_key(), identity.member_name()) {
                None => ElementState::NotFound,
                Some(members) if members.iter().any(is_test_method_candidate) => ElementState::Valid,
                Some(_) => ElementState::Invalid,
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::missing_panics_doc,
    reason = "Test code has different conventions"
)]
mod tests {
    use super::*;
    use crate::element::{ElementAttrs, ElementTree};
    use crate::source::{SourceLocation, TextRange};
    use crate::IdentityKey;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeIndex {
        members: HashMap<String, Vec<DeclaredMember>>,
        containers: HashMap<String, Vec<SourceLocation>>,
        member_locations: HashMap<String, Vec<SourceLocation>>,
    }

    impl SourceIndex for FakeIndex {
        fn enumerate_members(
            &self,
            container: &IdentityKey,
            member_name: &str,
        ) -> Option<Vec<DeclaredMember>> {
            self.containers.get(container.container_type_name())?;
            Some(
                self.members
                    .get(container.container_type_name())
                    .map(|members| {
                        members
                            .iter()
                            .filter(|member| member.name == member_name)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default(),
            )
        }

        fn container_locations(&self, container: &IdentityKey) -> Vec<SourceLocation> {
            self.containers
                .get(container.container_type_name())
                .cloned()
                .unwrap_or_default()
        }

        fn locations_of(&self, member: &DeclaredMember) -> Vec<SourceLocation> {
            self.member_locations
                .get(&member.handle)
                .cloned()
                .unwrap_or_default()
        }

        fn source_files_of(&self, target: SourceTarget<'_>) -> BTreeSet<PathBuf> {
            let locations = match target {
                SourceTarget::Container(container) => self.container_locations(container),
                SourceTarget::Member(member) => self.locations_of(member),
            };
            locations.into_iter().map(|location| location.file).collect()
        }
    }

    fn location(file: &str, start: usize) -> SourceLocation {
        SourceLocation {
            file: PathBuf::from(file),
            name_range: TextRange::new(start, start + 4),
            full_range: TextRange::new(start, start + 40),
        }
    }

    fn method_element(tree: &mut ElementTree, name: &str) -> Element {
        let id = tree
            .get_or_create(
                IdentityKey::new("proj", "N.T", name),
                ElementAttrs::method("/bin/T.dll", ""),
            )
            .ok();
        match id.as_ref().and_then(|created| tree.get(created)) {
            Some(element) => element.clone(),
            None => panic!("method element was not created"),
        }
    }

    fn index_with(members: Vec<DeclaredMember>) -> FakeIndex {
        let mut index = FakeIndex::default();
        index
            .containers
            .insert("N.T".to_owned(), vec![location("b.cs", 0), location("a.cs", 10)]);
        index.members.insert("N.T".to_owned(), members);
        index
    }

    #[test]
    fn test_candidate_filter() {
        assert!(is_test_method_candidate(&DeclaredMember::method("A")));
        assert!(is_test_method_candidate(
            &DeclaredMember::method("A").with_accessibility(Accessibility::Internal)
        ));
        assert!(!is_test_method_candidate(
            &DeclaredMember::method("A").with_type_parameters(1)
        ));
        assert!(!is_test_method_candidate(&DeclaredMember::method("A").with_abstract(true)));
        assert!(!is_test_method_candidate(
            &DeclaredMember::method("A").with_accessibility(Accessibility::Private)
        ));
        assert!(!is_test_method_candidate(
            &DeclaredMember::method("A").with_accessibility(Accessibility::Protected)
        ));
        assert!(!is_test_method_candidate(&DeclaredMember::property("A")));
    }

    #[test]
    fn test_resolve_declared_member_takes_first_candidate() {
        let mut tree = ElementTree::new();
        let element = method_element(&mut tree, "Run");
        let index = index_with(vec![
            DeclaredMember::method("Run").with_type_parameters(1).with_handle("generic"),
            DeclaredMember::method("Run").with_handle("first"),
            DeclaredMember::method("Run").with_handle("second"),
        ]);

        let resolved = resolve_declared_member(&element, &index);
        assert_eq!(resolved.map(|member| member.handle), Some("first".to_owned()));
    }

    #[test]
    fn test_resolve_declared_member_rejects_filtered() {
        let mut tree = ElementTree::new();
        let element = method_element(&mut tree, "Run");
        let index = index_with(vec![
            DeclaredMember::method("Run").with_abstract(true),
            DeclaredMember::method("Run").with_accessibility(Accessibility::Private),
        ]);

        assert!(resolve_declared_member(&element, &index).is_none());
        assert_eq!(resolve_state(&element, &index), ElementState::Invalid);
        assert_eq!(resolve_disposition(&element, &index), Disposition::Invalid);
    }

    #[test]
    fn test_disposition_sorted_by_file_then_offset() {
        let mut tree = ElementTree::new();
        let element = method_element(&mut tree, "Run");
        let mut index = index_with(vec![DeclaredMember::method("Run").with_handle("run")]);
        index.member_locations.insert(
            "run".to_owned(),
            vec![location("b.cs", 5), location("a.cs", 90), location("a.cs", 30)],
        );

        let Disposition::Locations(locations) = resolve_disposition(&element, &index) else {
            panic!("expected locations");
        };
        let order: Vec<(String, usize)> = locations
            .iter()
            .map(|site| (site.file.display().to_string(), site.name_range.start))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.cs".to_owned(), 30),
                ("a.cs".to_owned(), 90),
                ("b.cs".to_owned(), 5)
            ]
        );
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let mut tree = ElementTree::new();
        let element = method_element(&mut tree, "Run");
        let index = FakeIndex::default();
        assert_eq!(resolve_state(&element, &index), ElementState::NotFound);
        assert!(source_files(&element, &index).is_empty());
    }

    #[test]
    fn test_source_files_falls_back_to_member() {
        let mut tree = ElementTree::new();
        let element = method_element(&mut tree, "Run");
        let mut index = index_with(vec![DeclaredMember::method("Run").with_handle("run")]);
        index
            .member_locations
            .insert("run".to_owned(), vec![location("a.cs", 30)]);

        let files = source_files(&element, &index);
        assert_eq!(files.into_iter().collect::<Vec<_>>(), vec![PathBuf::from("a.cs")]);
    }
}
