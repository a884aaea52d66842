//! Moving a merged plan to the isolated execution side.
//!
//! The plan crosses as JSON text only; the receiving side rebuilds plain
//! [`Task`] trees and never sees elements or the caller's graph.

use serde::{Deserialize, Serialize};
use testplan_core::Result;
use testplan_tasks::{NodeIndex, RunnerId, Task, TaskForest};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::record::Record;
use crate::task_codec::{decode_task, encode_task};

/// Encoded plan node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Encoded task
    pub task: Record,
    /// Encoded children in plan order
    #[serde(default)]
    pub children: Vec<RemoteNode>,
}

/// Encoded plan for one runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEnvelope {
    /// Runner expected to execute the plan
    pub runner_id: String,
    /// Encoded root nodes
    pub roots: Vec<RemoteNode>,
}

/// Decoded plan node on the execution side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    /// Task to execute
    pub task: Task,
    /// Tasks to execute once this one succeeded
    pub children: Vec<RemoteTask>,
}

impl PlanEnvelope {
    /// Encodes a plan forest.
    pub fn from_forest(runner_id: &RunnerId, forest: &TaskForest) -> Self {
        let roots = forest
            .roots()
            .iter()
            .filter_map(|root| encode_node(forest, *root))
            .collect();
        Self {
            runner_id: runner_id.to_string(),
            roots,
        }
    }

    /// Serializes the envelope to JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses an envelope from JSON.
    ///
    /// # Errors
    /// Returns an error if `json` is not a valid envelope.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuilds the task trees.
    ///
    /// # Errors
    /// Returns [`testplan_core::Error::MalformedRecord`] if any node does not
    /// decode to a task.
    pub fn decode(&self) -> Result<Vec<RemoteTask>> {
        self.roots.iter().map(decode_node).collect()
    }

    /// Number of encoded tasks.
    pub fn task_count(&self) -> usize {
        fn count(node: &RemoteNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }
}

fn encode_node(forest: &TaskForest, node: NodeIndex) -> Option<RemoteNode> {
    let plan = forest.node(node)?;
    Some(RemoteNode {
        task: encode_task(&plan.task),
        children: forest
            .children(node)
            .into_iter()
            .filter_map(|child| encode_node(forest, child))
            .collect(),
    })
}

fn decode_node(node: &RemoteNode) -> Result<RemoteTask> {
    Ok(RemoteTask {
        task: decode_task(&node.task)?,
        children: node
            .children
            .iter()
            .map(decode_node)
            .collect::<Result<Vec<_>>>()?,
    })
}

/// Sending half of the plan channel.
#[derive(Clone)]
pub struct PlanChannel {
    sender: mpsc::UnboundedSender<String>,
}

/// Receiving half of the plan channel, held by the execution side.
pub struct PlanReceiver {
    receiver: mpsc::UnboundedReceiver<String>,
}

impl PlanChannel {
    /// Creates a connected channel pair.
    pub fn connected() -> (Self, PlanReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, PlanReceiver { receiver })
    }

    /// Wraps a sender whose receiving end reads raw JSON envelopes.
    pub fn from_sender(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    /// Encodes and sends an envelope.
    ///
    /// Envelopes are dropped if the receiver has been closed.
    ///
    /// # Errors
    /// Returns an error if the envelope cannot be serialized.
    pub fn send(&self, envelope: &PlanEnvelope) -> Result<()> {
        let json = envelope.to_json()?;
        debug!(
            "Sending plan for runner {} ({} tasks, {} bytes)",
            envelope.runner_id,
            envelope.task_count(),
            json.len()
        );
        if let Err(error) = self.sender.send(json) {
            warn!("Failed to send plan envelope: {}", error);
        }
        Ok(())
    }
}

impl PlanReceiver {
    /// Waits for the next envelope; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Result<PlanEnvelope>> {
        let json = self.receiver.recv().await?;
        Some(PlanEnvelope::from_json(&json))
    }
}

#[cfg(test)]
#[allow(
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::assertions_on_result_states,
    reason = "Test code is allowed to use expect"
)]
mod tests {
    use super::*;
    use testplan_core::{Error, IdentityKey};
    use testplan_tasks::UnitTask;

    fn forest() -> TaskForest {
        let runner = RunnerId::new("xunit");
        let sequence = |method: &str, explicitly: bool| {
            let identity = IdentityKey::new("proj", "N.T", method);
            vec![
                UnitTask::new(Task::assembly_load(runner.clone(), "/bin/T.dll"), None),
                UnitTask::new(
                    Task::class_load(runner.clone(), &identity.container_key(), false),
                    None,
                ),
                UnitTask::new(Task::method_run(runner.clone(), &identity, explicitly), None),
            ]
        };
        TaskForest::merge([sequence("A", false), sequence("B", true)]).expect("merge")
    }

    #[test]
    fn test_envelope_mirrors_forest() {
        let envelope = PlanEnvelope::from_forest(&RunnerId::new("xunit"), &forest());
        assert_eq!(envelope.task_count(), 4);
        assert_eq!(envelope.roots.len(), 1);
        assert_eq!(envelope.roots[0].children[0].children.len(), 2);

        let decoded = envelope.decode().expect("decode");
        let methods = &decoded[0].children[0].children;
        assert_eq!(methods[0].task.to_string(), "MethodTask(N.T.A)");
        assert!(!methods[0].task.explicitly());
        assert!(methods[1].task.explicitly());
    }

    #[test]
    fn test_json_round_trip() {
        let envelope = PlanEnvelope::from_forest(&RunnerId::new("xunit"), &forest());
        let json = envelope.to_json().expect("encode");
        let parsed = PlanEnvelope::from_json(&json).expect("parse");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_garbage_json_is_rejected() {
        assert!(matches!(
            PlanEnvelope::from_json("{\"roots\": 3}"),
            Err(Error::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_delivers_envelope() {
        let (channel, mut receiver) = PlanChannel::connected();
        let envelope = PlanEnvelope::from_forest(&RunnerId::new("xunit"), &forest());

        channel.send(&envelope).expect("send");
        drop(channel);

        let received = receiver.recv().await.expect("message").expect("decode");
        assert_eq!(received, envelope);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_wrapped_sender_receives_raw_json() {
        let (sender, mut raw) = mpsc::unbounded_channel();
        let channel = PlanChannel::from_sender(sender);
        let envelope = PlanEnvelope::from_forest(&RunnerId::new("xunit"), &forest());
        channel.send(&envelope).expect("send");

        let json = raw.recv().await.expect("message");
        assert_eq!(PlanEnvelope::from_json(&json).expect("parse"), envelope);
    }

    #[tokio::test]
    async fn test_send_after_receiver_closed_is_not_an_error() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let channel = PlanChannel::from_sender(sender);
        let envelope = PlanEnvelope::from_forest(&RunnerId::new("xunit"), &forest());
        assert!(channel.send(&envelope).is_ok());
    }
}
