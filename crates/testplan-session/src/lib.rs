//! Test session services: discovery, revalidation, planning, and persistence
//! over a shared element hierarchy.

/// Assembly discovery.
pub mod discovery;
/// Session state and its operations.
pub mod session;

pub use discovery::{AssemblyChange, DiscoveryReport, apply_change};
pub use session::{RevalidationReport, StateTransition, TestSession};
