//! Project registry collaborator used when rehydrating persisted elements.

use std::collections::BTreeMap;

/// Live handle to a project in the current session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectHandle {
    persistent_id: String,
    name: String,
}

impl ProjectHandle {
    /// Creates a handle.
    pub fn new(persistent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            persistent_id: persistent_id.into(),
            name: name.into(),
        }
    }

    /// Identifier that survives across sessions.
    pub fn persistent_id(&self) -> &str {
        &self.persistent_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolves persisted project ids to live projects.
pub trait ProjectRegistry: Send + Sync {
    /// Finds the project with this persistent id, `None` if it no longer exists.
    fn find_project_by_persistent_id(&self, id: &str) -> Option<ProjectHandle>;
}

/// Registry backed by a fixed set of projects.
#[derive(Debug, Clone, Default)]
pub struct ProjectSet {
    projects: BTreeMap<String, ProjectHandle>,
}

impl ProjectSet {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project, replacing any with the same persistent id.
    #[must_use]
    pub fn with_project(mut self, project: ProjectHandle) -> Self {
        self.insert(project);
        self
    }

    /// Adds a project, replacing any with the same persistent id.
    pub fn insert(&mut self, project: ProjectHandle) {
        self.projects
            .insert(project.persistent_id().to_owned(), project);
    }

    /// Removes a project, returning it if it was registered.
    pub fn remove(&mut self, persistent_id: &str) -> Option<ProjectHandle> {
        self.projects.remove(persistent_id)
    }
}

impl ProjectRegistry for ProjectSet {
    fn find_project_by_persistent_id(&self, id: &str) -> Option<ProjectHandle> {
        self.projects.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_set_lookup() {
        let mut projects = ProjectSet::new().with_project(ProjectHandle::new("p-1", "Core.Tests"));
        assert_eq!(
            projects
                .find_project_by_persistent_id("p-1")
                .map(|project| project.name().to_owned()),
            Some("Core.Tests".to_owned())
        );
        assert!(projects.find_project_by_persistent_id("p-2").is_none());

        assert!(projects.remove("p-1").is_some());
        assert!(projects.find_project_by_persistent_id("p-1").is_none());
    }
}
