//! Flat, attribute-keyed records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use testplan_core::{Error, Result};

/// Attribute names used by element and task records.
pub mod attr {
    /// Persisted element id
    pub const ID: &str = "id";
    /// Persisted id of the owning element, empty at the top of a subtree
    pub const PARENT_ID: &str = "parentId";
    /// Persistent id of the build scope
    pub const PROJECT_ID: &str = "projectId";
    /// Fully qualified container type name
    pub const TYPE_NAME: &str = "typeName";
    /// Method name
    pub const METHOD_NAME: &str = "methodName";
    /// Skip reason, empty when the test runs
    pub const SKIP_REASON: &str = "skipReason";
    /// Explicit reason of a class, empty when it runs in sweeps
    pub const EXPLICIT_REASON: &str = "explicitReason";
    /// Absolute artifact path
    pub const ASSEMBLY_LOCATION: &str = "assemblyLocation";
    /// Runner executing a task
    pub const RUNNER_ID: &str = "runnerId";
    /// Whether a task was requested explicitly
    pub const EXPLICITLY: &str = "explicitly";
}

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Assembly element
    AssemblyElement,
    /// Class element
    ClassElement,
    /// Method element
    MethodElement,
    /// Assembly load task
    AssemblyTask,
    /// Class load task
    ClassTask,
    /// Method run task
    MethodTask,
}

/// A versionless record of string attributes.
///
/// Every attribute a kind defines is always written; empty values stand for
/// absent ones, so decoding never distinguishes the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    kind: RecordKind,
    attributes: BTreeMap<String, String>,
}

impl Record {
    /// Creates a record without attributes.
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_owned(), value.into());
    }

    /// Kind of the record.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Attribute value, `None` if it was never written.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute value, empty if it was never written.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    /// Attribute value that must be present and non-empty.
    ///
    /// # Errors
    /// Returns [`Error::MalformedRecord`] if the attribute is missing or empty.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::MalformedRecord(format!(
                "{:?} record without {name}",
                self.kind
            ))),
        }
    }

    /// Boolean attribute, `false` when never written.
    ///
    /// # Errors
    /// Returns [`Error::MalformedRecord`] if the value is not a boolean.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.get(name).map_or(Ok(false), parse_bool)
    }

    /// All attributes, sorted by name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Writes a boolean attribute value.
pub fn format_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Reads a boolean attribute value, ignoring case and surrounding whitespace.
///
/// # Errors
/// Returns [`Error::MalformedRecord`] for anything but `true` or `false`.
pub fn parse_bool(value: &str) -> Result<bool> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::MalformedRecord(format!(
            "'{value}' is not a boolean"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_parsing() {
        assert!(matches!(parse_bool("True"), Ok(true)));
        assert!(matches!(parse_bool(" FALSE "), Ok(false)));
        assert!(matches!(parse_bool("yes"), Err(Error::MalformedRecord(_))));
        assert_eq!(format_bool(true), "true");
        assert_eq!(format_bool(false), "false");
    }

    #[test]
    fn test_require_rejects_empty() {
        let record = Record::new(RecordKind::ClassTask)
            .with(attr::TYPE_NAME, "N.T")
            .with(attr::PROJECT_ID, "");
        assert!(matches!(record.require(attr::TYPE_NAME), Ok("N.T")));
        assert!(matches!(
            record.require(attr::PROJECT_ID),
            Err(Error::MalformedRecord(_))
        ));
        assert_eq!(record.get_or_empty(attr::METHOD_NAME), "");
        assert_eq!(record.get(attr::METHOD_NAME), None);
    }

    #[test]
    fn test_missing_bool_is_false() {
        let record = Record::new(RecordKind::MethodTask);
        assert!(matches!(record.get_bool(attr::EXPLICITLY), Ok(false)));
    }

    #[test]
    fn test_json_shape() {
        let record = Record::new(RecordKind::AssemblyTask)
            .with(attr::RUNNER_ID, "xunit")
            .with(attr::ASSEMBLY_LOCATION, "/bin/T.dll");
        let json = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(error) => panic!("serialize failed: {error}"),
        };
        assert_eq!(json["kind"], "AssemblyTask");
        assert_eq!(json["attributes"]["runnerId"], "xunit");
    }
}
