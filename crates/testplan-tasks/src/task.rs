//! Execution tasks shipped to the isolated runner.

use core::fmt;
use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use testplan_core::{ElementId, IdentityKey};

/// Identifier of the runner that executes a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerId(String);

impl RunnerId {
    /// Creates a runner id.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrows the id text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Kind of execution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Load a compiled artifact
    AssemblyLoad,
    /// Load a test container type
    ClassLoad,
    /// Run one test method
    MethodRun,
}

/// Kind-specific task fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskPayload {
    /// Load a compiled artifact
    AssemblyLoad {
        /// Absolute path to the artifact
        assembly_location: String,
    },
    /// Load a test container type
    ClassLoad {
        /// Build scope of the container
        scope_id: String,
        /// Fully qualified container type name
        container_type_name: String,
        /// Whether the container was selected explicitly
        explicitly: bool,
    },
    /// Run one test method
    MethodRun {
        /// Build scope of the container
        scope_id: String,
        /// Fully qualified container type name
        container_type_name: String,
        /// Method name
        member_name: String,
        /// Whether the method was selected explicitly
        explicitly: bool,
    },
}

/// Task fields with the explicit flag stripped; tasks with equal keys are
/// merged into one plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Key of an assembly load
    AssemblyLoad(String),
    /// Key of a class load: scope and container type
    ClassLoad(String, String),
    /// Key of a method run: scope, container type, and method
    MethodRun(String, String, String),
}

/// One unit of remote execution work.
///
/// Equality covers the kind and every payload field, `explicitly` included.
/// The runner id is not part of equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    runner_id: RunnerId,
    payload: TaskPayload,
}

impl Task {
    /// Creates a task from its parts.
    pub fn new(runner_id: RunnerId, payload: TaskPayload) -> Self {
        Self { runner_id, payload }
    }

    /// Task loading the artifact at `assembly_location`.
    pub fn assembly_load(runner_id: RunnerId, assembly_location: impl Into<String>) -> Self {
        Self::new(
            runner_id,
            TaskPayload::AssemblyLoad {
                assembly_location: assembly_location.into(),
            },
        )
    }

    /// Task loading the container named by `identity`.
    pub fn class_load(runner_id: RunnerId, identity: &IdentityKey, explicitly: bool) -> Self {
        Self::new(
            runner_id,
            TaskPayload::ClassLoad {
                scope_id: identity.scope_id().to_owned(),
                container_type_name: identity.container_type_name().to_owned(),
                explicitly,
            },
        )
    }

    /// Task running the method named by `identity`.
    pub fn method_run(runner_id: RunnerId, identity: &IdentityKey, explicitly: bool) -> Self {
        Self::new(
            runner_id,
            TaskPayload::MethodRun {
                scope_id: identity.scope_id().to_owned(),
                container_type_name: identity.container_type_name().to_owned(),
                member_name: identity.member_name().to_owned(),
                explicitly,
            },
        )
    }

    /// Runner executing the task.
    pub fn runner_id(&self) -> &RunnerId {
        &self.runner_id
    }

    /// Kind-specific fields.
    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Task kind.
    pub fn kind(&self) -> TaskKind {
        match self.payload {
            TaskPayload::AssemblyLoad { .. } => TaskKind::AssemblyLoad,
            TaskPayload::ClassLoad { .. } => TaskKind::ClassLoad,
            TaskPayload::MethodRun { .. } => TaskKind::MethodRun,
        }
    }

    /// Whether the task's element was selected explicitly. Assembly loads never are.
    pub fn explicitly(&self) -> bool {
        match self.payload {
            TaskPayload::AssemblyLoad { .. } => false,
            TaskPayload::ClassLoad { explicitly, .. } | TaskPayload::MethodRun { explicitly, .. } => {
                explicitly
            }
        }
    }

    /// Sets the explicit flag; no effect on assembly loads.
    pub fn set_explicitly(&mut self, value: bool) {
        match &mut self.payload {
            TaskPayload::AssemblyLoad { .. } => {}
            TaskPayload::ClassLoad { explicitly, .. } | TaskPayload::MethodRun { explicitly, .. } => {
                *explicitly = value;
            }
        }
    }

    /// Fields that decide whether two tasks describe the same work.
    pub fn key(&self) -> TaskKey {
        match &self.payload {
            TaskPayload::AssemblyLoad { assembly_location } => {
                TaskKey::AssemblyLoad(assembly_location.clone())
            }
            TaskPayload::ClassLoad {
                scope_id,
                container_type_name,
                ..
            } => TaskKey::ClassLoad(scope_id.clone(), container_type_name.clone()),
            TaskPayload::MethodRun {
                scope_id,
                container_type_name,
                member_name,
                ..
            } => TaskKey::MethodRun(
                scope_id.clone(),
                container_type_name.clone(),
                member_name.clone(),
            ),
        }
    }

    /// Whether the runner reports a result for this task.
    pub fn is_meaningful(&self) -> bool {
        self.kind() != TaskKind::AssemblyLoad
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}

impl fmt::Display for Task {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            TaskPayload::AssemblyLoad { assembly_location } => {
                write!(formatter, "AssemblyTask({assembly_location})")
            }
            TaskPayload::ClassLoad {
                container_type_name,
                ..
            } => write!(formatter, "ClassTask({container_type_name})"),
            TaskPayload::MethodRun {
                container_type_name,
                member_name,
                ..
            } => write!(formatter, "MethodTask({container_type_name}.{member_name})"),
        }
    }
}

/// A task paired with the element it executes, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitTask {
    /// Work to perform
    pub task: Task,
    /// Element the task belongs to; `None` for assembly loads
    pub element: Option<ElementId>,
}

impl UnitTask {
    /// Pairs a task with its element.
    pub fn new(task: Task, element: Option<ElementId>) -> Self {
        Self { task, element }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> RunnerId {
        RunnerId::new("xunit")
    }

    #[test]
    fn test_explicit_flag_is_part_of_equality() {
        let identity = IdentityKey::container("proj", "N.T");
        let implicit = Task::class_load(runner(), &identity, false);
        let explicit = Task::class_load(runner(), &identity, true);

        assert_ne!(implicit, explicit);
        assert_eq!(implicit.key(), explicit.key());
    }

    #[test]
    fn test_runner_is_not_part_of_equality() {
        let identity = IdentityKey::new("proj", "N.T", "M");
        let xunit = Task::method_run(runner(), &identity, false);
        let other = Task::method_run(RunnerId::new("other"), &identity, false);
        assert_eq!(xunit, other);
    }

    #[test]
    fn test_kinds_never_equal() {
        let identity = IdentityKey::new("proj", "N.T", "M");
        let class = Task::class_load(runner(), &identity.container_key(), false);
        let method = Task::method_run(runner(), &identity, false);
        assert_ne!(class, method);
        assert_ne!(class.key(), method.key());
        assert_eq!(class.kind(), TaskKind::ClassLoad);
        assert_eq!(method.kind(), TaskKind::MethodRun);
    }

    #[test]
    fn test_set_explicitly() {
        let mut assembly = Task::assembly_load(runner(), "/bin/T.dll");
        assembly.set_explicitly(true);
        assert!(!assembly.explicitly());
        assert!(!assembly.is_meaningful());

        let mut method = Task::method_run(runner(), &IdentityKey::new("proj", "N.T", "M"), false);
        method.set_explicitly(true);
        assert!(method.explicitly());
        assert!(method.is_meaningful());
    }

    #[test]
    fn test_display() {
        let identity = IdentityKey::new("proj", "N.T", "M");
        assert_eq!(
            Task::assembly_load(runner(), "/bin/T.dll").to_string(),
            "AssemblyTask(/bin/T.dll)"
        );
        assert_eq!(
            Task::class_load(runner(), &identity.container_key(), true).to_string(),
            "ClassTask(N.T)"
        );
        assert_eq!(
            Task::method_run(runner(), &identity, false).to_string(),
            "MethodTask(N.T.M)"
        );
    }
}
