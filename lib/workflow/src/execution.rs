//! Run state.
//!
//! A run is one execution of an executable graph document. Only the engine
//! mutates a run; handlers propose variable updates and a port through
//! [`crate::handler::HandlerResult`].
//!
//! History is append-only: the last entry is the node the run currently sits
//! in and is closed in place when the run leaves it. Earlier entries never
//! change.

use crate::node::NodeId;
use crate::port::PortId;
use chrono::{DateTime, Utc};
use nodeflow_core::{DocumentId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Variable bindings of a run.
pub type Variables = serde_json::Map<String, JsonValue>;

/// The state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// The engine is stepping the run.
    Running,
    /// Parked at a delay node until its resume time.
    WaitingOnTimer,
    /// Parked at a business node until its action responds.
    WaitingOnAction,
    /// Reached the end of the graph.
    Completed,
    /// A node failed; the run is frozen at that node.
    Failed,
    /// Cancelled by an external request.
    Cancelled,
}

impl RunStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How a run left (or is still in) a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeOutcome {
    /// The run is still in this node.
    Active,
    /// Left through `port` to a successor.
    Exited { port: PortId },
    /// Left with no successor, completing the run.
    Completed { port: Option<PortId> },
    /// The node failed.
    Failed { error: String },
    /// The run was cancelled while in this node.
    Cancelled,
}

/// One step of a run's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub node_id: NodeId,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
    pub outcome: NodeOutcome,
}

/// A single execution of a graph document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Unique identifier for this run.
    pub id: RunId,
    /// The document being executed.
    pub document_id: DocumentId,
    /// The node the run is in.
    pub current_node_id: NodeId,
    /// Current state.
    pub status: RunStatus,
    /// Variable bindings, seeded by the triggering event.
    pub variables: Variables,
    /// Nodes visited, in order of entry.
    pub history: Vec<HistoryEntry>,
    /// When a run waiting on a timer may resume.
    pub resume_at: Option<DateTime<Utc>>,
    /// Action attempts made at the current business node.
    pub action_attempts: u32,
    /// Why the run failed.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Creates a running run positioned at its trigger node.
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        trigger_node_id: NodeId,
        variables: Variables,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::new(),
            document_id,
            current_node_id: trigger_node_id.clone(),
            status: RunStatus::Running,
            variables,
            history: vec![HistoryEntry {
                node_id: trigger_node_id,
                entered_at: now,
                exited_at: None,
                outcome: NodeOutcome::Active,
            }],
            resume_at: None,
            action_attempts: 0,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Returns true if the run accepts no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merges handler or action variable updates into the bindings.
    pub fn apply_updates(&mut self, updates: Variables) {
        self.variables.extend(updates);
    }

    /// Leaves the current node through `port` and enters `next`.
    pub fn advance(&mut self, port: PortId, next: NodeId, now: DateTime<Utc>) {
        self.close_current(NodeOutcome::Exited { port }, now);
        self.history.push(HistoryEntry {
            node_id: next.clone(),
            entered_at: now,
            exited_at: None,
            outcome: NodeOutcome::Active,
        });
        self.current_node_id = next;
        self.status = RunStatus::Running;
        self.resume_at = None;
        self.action_attempts = 0;
        self.updated_at = now;
    }

    /// Parks the run until `resume_at`.
    pub fn wait_on_timer(&mut self, resume_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = RunStatus::WaitingOnTimer;
        self.resume_at = Some(resume_at);
        self.updated_at = now;
    }

    /// Parks the run until its business action responds.
    pub fn wait_on_action(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::WaitingOnAction;
        self.updated_at = now;
    }

    /// Records one more action attempt at the current node.
    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.action_attempts += 1;
        self.updated_at = now;
    }

    /// Marks the run as running again after a wait.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Running;
        self.resume_at = None;
        self.updated_at = now;
    }

    /// Completes the run at the current node.
    ///
    /// `port` is the port that was taken, if the node has one.
    pub fn complete(&mut self, port: Option<PortId>, now: DateTime<Utc>) {
        self.close_current(NodeOutcome::Completed { port }, now);
        self.finish(RunStatus::Completed, now);
    }

    /// Fails the run, freezing it at the current node.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        let error = error.into();
        self.close_current(
            NodeOutcome::Failed {
                error: error.clone(),
            },
            now,
        );
        self.error = Some(error);
        self.finish(RunStatus::Failed, now);
    }

    /// Cancels the run.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.close_current(NodeOutcome::Cancelled, now);
        self.finish(RunStatus::Cancelled, now);
    }

    fn finish(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.status = status;
        self.resume_at = None;
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    fn close_current(&mut self, outcome: NodeOutcome, now: DateTime<Utc>) {
        match self.history.last_mut() {
            Some(entry) if entry.outcome == NodeOutcome::Active => {
                entry.exited_at = Some(now);
                entry.outcome = outcome;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn run_at(now: DateTime<Utc>) -> Run {
        Run::new(DocumentId::new(), NodeId::new("start"), Variables::new(), now)
    }

    #[test]
    fn terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::WaitingOnTimer.is_terminal());
        assert!(!RunStatus::WaitingOnAction.is_terminal());
    }

    #[test]
    fn new_run_sits_in_trigger() {
        let now = Utc::now();
        let run = run_at(now);

        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.history.len(), 1);
        assert_eq!(run.history[0].outcome, NodeOutcome::Active);
        assert_eq!(run.history[0].entered_at, now);
    }

    #[test]
    fn advance_closes_previous_entry() {
        let start = Utc::now();
        let later = start + Duration::seconds(1);
        let mut run = run_at(start);
        run.advance(PortId::output(), NodeId::new("wait"), later);

        assert_eq!(run.current_node_id.as_str(), "wait");
        assert_eq!(run.history.len(), 2);
        assert_eq!(run.history[0].exited_at, Some(later));
        assert_eq!(
            run.history[0].outcome,
            NodeOutcome::Exited {
                port: PortId::output()
            }
        );
        assert!(run.history[0].exited_at <= Some(run.history[1].entered_at));
    }

    #[test]
    fn fail_freezes_current_node() {
        let now = Utc::now();
        let mut run = run_at(now);
        run.advance(PortId::output(), NodeId::new("remind"), now);
        run.fail("action failed", now);

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_node_id.as_str(), "remind");
        assert_eq!(run.error.as_deref(), Some("action failed"));
        assert_eq!(run.finished_at, Some(now));
        assert!(matches!(run.history[1].outcome, NodeOutcome::Failed { .. }));
    }

    #[test]
    fn closing_twice_keeps_first_outcome() {
        let now = Utc::now();
        let mut run = run_at(now);
        run.complete(None, now);
        run.cancel(now);

        assert_eq!(run.history[0].outcome, NodeOutcome::Completed { port: None });
    }

    #[test]
    fn updates_overwrite_existing_bindings() {
        let mut run = run_at(Utc::now());
        run.variables.insert("age".into(), 16.into());

        let mut updates = Variables::new();
        updates.insert("age".into(), 17.into());
        updates.insert("reminded".into(), true.into());
        run.apply_updates(updates);

        assert_eq!(run.variables["age"], 17);
        assert_eq!(run.variables["reminded"], true);
    }

    #[test]
    fn run_serializes_camel_case() {
        let run = run_at(Utc::now());
        let json = serde_json::to_value(&run).expect("serialize");

        assert!(json.get("currentNodeId").is_some());
        assert_eq!(json["status"], "running");
        assert_eq!(json["history"][0]["outcome"]["kind"], "active");
    }

    #[test]
    fn multi_word_statuses_serialize_camel_case() {
        let json = serde_json::to_value([RunStatus::WaitingOnTimer, RunStatus::WaitingOnAction])
            .expect("serialize");
        assert_eq!(json, serde_json::json!(["waitingOnTimer", "waitingOnAction"]));
    }
}
