//! Core model for test discovery plans.
//!
//! This crate provides identity keys, the test element hierarchy, the
//! collaborator traits consulted while resolving elements, configuration, and
//! the error taxonomy shared by every `testplan` crate.

/// Test classification capability.
pub mod classify;
/// Configuration types.
pub mod config;
/// Element hierarchy and lazy source resolution.
pub mod element;
/// Error types and result definitions.
pub mod error;
/// Identity keys for test entities.
pub mod identity;
/// Project registry collaborator.
pub mod project;
/// Source index collaborator.
pub mod source;

pub use classify::{AttributeClassifier, Declaration, TestClassifier, TestRole};
pub use config::{ClassifierConfig, DiscoveryConfig, PlanConfig};
pub use element::{
    Element, ElementAttrs, ElementData, ElementId, ElementKey, ElementKind, ElementState,
    ElementTree, compare_elements,
};
pub use error::{Error, ParentKind, Result};
pub use identity::IdentityKey;
pub use project::{ProjectHandle, ProjectRegistry, ProjectSet};
pub use source::{
    Accessibility, AttributeUsage, DeclaredMember, DeclaredType, Disposition, MemberKind,
    SourceIndex, SourceLocation, SourceTarget, TextRange,
};
