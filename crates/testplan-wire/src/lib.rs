//! Serialization boundary for test plans.
//!
//! Elements and tasks are written as flat, attribute-keyed [`Record`]s. Element
//! records persist the hierarchy across sessions; task records carry a merged
//! plan to an isolated runner that shares no memory with the caller.

/// Element records and subtree persistence.
pub mod element_codec;
/// Flat record format.
pub mod record;
/// Task records.
pub mod task_codec;
/// Plan envelopes and the channel carrying them.
pub mod transport;

pub use element_codec::{decode_element, encode_element, persist_subtree, restore_records};
pub use record::{Record, RecordKind, attr, format_bool, parse_bool};
pub use task_codec::{decode_task, encode_task};
pub use transport::{PlanChannel, PlanEnvelope, PlanReceiver, RemoteNode, RemoteTask};
