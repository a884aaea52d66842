//! Error taxonomy shared by every `testplan` crate.

use core::fmt;
use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::element::{ElementId, ElementKind};

/// Result type for test plan operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors raised while building, merging, or transporting test plans.
///
/// A declared member that can no longer be found is not an error: the element
/// moves to [`crate::ElementState::Invalid`] or [`crate::ElementState::NotFound`].
/// A persisted element whose project is gone is not an error either: decoding
/// yields `None`.
#[derive(Debug, Error)]
pub enum Error {
    /// An element cannot be placed under the requested parent.
    #[error("{child} element cannot be placed under {parent}")]
    InvalidHierarchy {
        /// Kind of the would-be parent, or `None` for the root level
        parent: ParentKind,
        /// Kind of the element being placed
        child: ElementKind,
    },

    /// The element kind is not handled by the requested operation.
    #[error("element kind {kind:?} is not supported here")]
    UnsupportedElementKind {
        /// Kind that was rejected
        kind: ElementKind,
    },

    /// A record was decoded under a parent of the wrong kind.
    #[error("expected parent of kind {expected}, found {found}")]
    MalformedParent {
        /// Kind the record requires as its parent
        expected: ParentKind,
        /// Kind that was supplied
        found: ParentKind,
    },

    /// Two otherwise equal tasks were produced for different runners.
    #[error("task runner mismatch: existing '{existing}', incoming '{incoming}'")]
    InconsistentRunner {
        /// Runner of the task already in the plan
        existing: String,
        /// Runner of the task being merged
        incoming: String,
    },

    /// An identity key does not fit the element kind it was used for.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// No element with this id exists in the hierarchy.
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    /// A flat record is missing an attribute or carries an unparsable value.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Configuration is invalid or could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),
}

impl Error {
    /// Determines whether this error is a programmer or integration error.
    ///
    /// Fatal errors abort the current operation and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidHierarchy { .. }
                | Self::UnsupportedElementKind { .. }
                | Self::MalformedParent { .. }
                | Self::InconsistentRunner { .. }
                | Self::InvalidIdentity(_)
        )
    }
}

/// Kind of a parent slot: an element kind, or the hierarchy root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    /// Top level of the hierarchy
    Root,
    /// An element of the given kind
    Element(ElementKind),
}

impl From<Option<ElementKind>> for ParentKind {
    fn from(kind: Option<ElementKind>) -> Self {
        kind.map_or(Self::Root, Self::Element)
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => formatter.write_str("root"),
            Self::Element(kind) => formatter.write_str(kind.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, from_str};
    use std::io;

    #[test]
    fn test_error_display() {
        let error1 = Error::InconsistentRunner {
            existing: "xunit".to_owned(),
            incoming: "nunit".to_owned(),
        };
        assert_eq!(
            error1.to_string(),
            "task runner mismatch: existing 'xunit', incoming 'nunit'"
        );

        let error2 = Error::MalformedParent {
            expected: ParentKind::Element(ElementKind::Class),
            found: ParentKind::Root,
        };
        assert_eq!(error2.to_string(), "expected parent of kind class, found root");

        let error3 = Error::Config("bad runner".to_owned());
        assert_eq!(error3.to_string(), "Configuration error: bad runner");
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(
            Error::UnsupportedElementKind {
                kind: ElementKind::Assembly
            }
            .is_fatal()
        );
        assert!(
            Error::InvalidHierarchy {
                parent: ParentKind::Element(ElementKind::Method),
                child: ElementKind::Method,
            }
            .is_fatal()
        );

        assert!(!Error::MalformedRecord("typeName".to_owned()).is_fatal());
        assert!(!Error::Config("missing".to_owned()).is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert!(matches!(error, Error::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_error = from_str::<JsonValue>("invalid json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }

    #[test]
    fn test_parent_kind_from_option() {
        assert_eq!(ParentKind::from(None), ParentKind::Root);
        assert_eq!(
            ParentKind::from(Some(ElementKind::Class)),
            ParentKind::Element(ElementKind::Class)
        );
    }
}
