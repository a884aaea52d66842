//! Task encoding for the isolated runner.

use testplan_core::{Error, Result};
use testplan_tasks::{RunnerId, Task, TaskPayload};

use crate::record::{Record, RecordKind, attr, format_bool};

/// Encodes a task.
pub fn encode_task(task: &Task) -> Record {
    let runner = task.runner_id().as_str();
    match task.payload() {
        TaskPayload::AssemblyLoad { assembly_location } => Record::new(RecordKind::AssemblyTask)
            .with(attr::RUNNER_ID, runner)
            .with(attr::ASSEMBLY_LOCATION, assembly_location.as_str()),
        TaskPayload::ClassLoad {
            scope_id,
            container_type_name,
            explicitly,
        } => Record::new(RecordKind::ClassTask)
            .with(attr::RUNNER_ID, runner)
            .with(attr::PROJECT_ID, scope_id.as_str())
            .with(attr::TYPE_NAME, container_type_name.as_str())
            .with(attr::EXPLICITLY, format_bool(*explicitly)),
        TaskPayload::MethodRun {
            scope_id,
            container_type_name,
            member_name,
            explicitly,
        } => Record::new(RecordKind::MethodTask)
            .with(attr::RUNNER_ID, runner)
            .with(attr::PROJECT_ID, scope_id.as_str())
            .with(attr::TYPE_NAME, container_type_name.as_str())
            .with(attr::METHOD_NAME, member_name.as_str())
            .with(attr::EXPLICITLY, format_bool(*explicitly)),
    }
}

/// Decodes a task record.
///
/// # Errors
/// Returns [`Error::MalformedRecord`] for element records, missing
/// attributes, and unparsable booleans.
pub fn decode_task(record: &Record) -> Result<Task> {
    let runner_id = RunnerId::new(record.require(attr::RUNNER_ID)?);
    let payload = match record.kind() {
        RecordKind::AssemblyTask => TaskPayload::AssemblyLoad {
            assembly_location: record.require(attr::ASSEMBLY_LOCATION)?.to_owned(),
        },
        RecordKind::ClassTask => TaskPayload::ClassLoad {
            scope_id: record.get_or_empty(attr::PROJECT_ID).to_owned(),
            container_type_name: record.require(attr::TYPE_NAME)?.to_owned(),
            explicitly: record.get_bool(attr::EXPLICITLY)?,
        },
        RecordKind::MethodTask => TaskPayload::MethodRun {
            scope_id: record.get_or_empty(attr::PROJECT_ID).to_owned(),
            container_type_name: record.require(attr::TYPE_NAME)?.to_owned(),
            member_name: record.require(attr::METHOD_NAME)?.to_owned(),
            explicitly: record.get_bool(attr::EXPLICITLY)?,
        },
        RecordKind::AssemblyElement | RecordKind::ClassElement | RecordKind::MethodElement => {
            return Err(Error::MalformedRecord(format!(
                "{:?} is not a task record",
                record.kind()
            )));
        }
    };
    Ok(Task::new(runner_id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testplan_core::IdentityKey;

    fn runner() -> RunnerId {
        RunnerId::new("xunit")
    }

    #[test]
    fn test_method_task_record() {
        let task = Task::method_run(runner(), &IdentityKey::new("proj", "N.T", "A"), true);
        let record = encode_task(&task);

        assert_eq!(record.kind(), RecordKind::MethodTask);
        assert_eq!(record.get(attr::RUNNER_ID), Some("xunit"));
        assert_eq!(record.get(attr::PROJECT_ID), Some("proj"));
        assert_eq!(record.get(attr::TYPE_NAME), Some("N.T"));
        assert_eq!(record.get(attr::METHOD_NAME), Some("A"));
        assert_eq!(record.get(attr::EXPLICITLY), Some("true"));

        match decode_task(&record) {
            Ok(decoded) => {
                assert_eq!(decoded, task);
                assert_eq!(decoded.runner_id(), &runner());
            }
            Err(error) => panic!("decode failed: {error}"),
        }
    }

    #[test]
    fn test_explicit_flag_parses_any_case() {
        let record = Record::new(RecordKind::ClassTask)
            .with(attr::RUNNER_ID, "xunit")
            .with(attr::PROJECT_ID, "proj")
            .with(attr::TYPE_NAME, "N.T")
            .with(attr::EXPLICITLY, "True");
        let decoded = decode_task(&record).map(|task| task.explicitly());
        assert!(matches!(decoded, Ok(true)));
    }

    #[test]
    fn test_assembly_task_has_no_flag() {
        let record = encode_task(&Task::assembly_load(runner(), "/bin/T.dll"));
        assert_eq!(record.get(attr::EXPLICITLY), None);
        assert_eq!(record.get(attr::ASSEMBLY_LOCATION), Some("/bin/T.dll"));
    }

    #[test]
    fn test_rejects_element_records_and_bad_flags() {
        let element = Record::new(RecordKind::MethodElement).with(attr::RUNNER_ID, "xunit");
        assert!(matches!(decode_task(&element), Err(Error::MalformedRecord(_))));

        let bad_flag = Record::new(RecordKind::ClassTask)
            .with(attr::RUNNER_ID, "xunit")
            .with(attr::TYPE_NAME, "N.T")
            .with(attr::EXPLICITLY, "maybe");
        assert!(matches!(decode_task(&bad_flag), Err(Error::MalformedRecord(_))));

        let no_runner = Record::new(RecordKind::AssemblyTask).with(attr::ASSEMBLY_LOCATION, "/bin/T.dll");
        assert!(matches!(decode_task(&no_runner), Err(Error::MalformedRecord(_))));
    }
}
