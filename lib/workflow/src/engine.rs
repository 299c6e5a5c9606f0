//! The execution engine.
//!
//! The engine owns every mutation of a run. Each entry point takes the run's
//! lease, loads it, applies one transition (or a chain of synchronous steps)
//! and saves the whole run before letting go.
//!
//! A run suspends in exactly two places:
//! - Entering a delay node parks it in the timer service
//! - Entering a business node spawns the action and parks it until the
//!   action reports back
//!
//! Trigger and decision nodes never suspend.

use crate::action::{ActionInvoker, ActionOutcome, ActionRequest, RetryPolicy};
use crate::clock::{Clock, SystemClock};
use crate::definition::{DocumentMetadata, DocumentStatus, DocumentStore, StoredDocument};
use crate::document::GraphDocument;
use crate::error::{DocumentError, EngineError};
use crate::execution::{Run, RunStatus, Variables};
use crate::graph::WorkflowGraph;
use crate::handler::{self, Effect};
use crate::lease::{RunLease, RunLeases};
use crate::node::NodeId;
use crate::port::PortId;
use crate::store::RunStore;
use crate::timer::{ResumeTarget, TimerService};
use crate::trigger::TriggerRecord;
use crate::validation::{ValidationResult, validate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nodeflow_core::{DocumentId, RunId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry policy for business actions.
    pub retry: RetryPolicy,
    /// Upper bound on a single action attempt.
    pub action_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            action_timeout_ms: 30_000,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

/// Assembles an [`Engine`] from its collaborators.
pub struct EngineBuilder {
    documents: Arc<dyn DocumentStore>,
    runs: Arc<dyn RunStore>,
    actions: Arc<dyn ActionInvoker>,
    timer: Arc<dyn TimerService>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Replaces the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(EngineInner {
                documents: self.documents,
                runs: self.runs,
                actions: self.actions,
                timer: self.timer,
                clock: self.clock,
                config: self.config,
                graphs: DashMap::new(),
                leases: RunLeases::new(),
            }),
        }
    }
}

/// The workflow execution engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    documents: Arc<dyn DocumentStore>,
    runs: Arc<dyn RunStore>,
    actions: Arc<dyn ActionInvoker>,
    timer: Arc<dyn TimerService>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Graphs of executable documents; immutable once cached.
    graphs: DashMap<DocumentId, Arc<WorkflowGraph>>,
    leases: RunLeases,
}

impl Engine {
    /// Starts building an engine over the given stores and services.
    #[must_use]
    pub fn builder(
        documents: Arc<dyn DocumentStore>,
        runs: Arc<dyn RunStore>,
        actions: Arc<dyn ActionInvoker>,
        timer: Arc<dyn TimerService>,
    ) -> EngineBuilder {
        EngineBuilder {
            documents,
            runs,
            actions,
            timer,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    // Documents

    /// Saves a new draft, which may be invalid but must be well-formed.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Malformed` for duplicate node ids or dangling
    /// edges, or a storage error.
    #[instrument(skip(self, document), fields(name = %metadata.name))]
    pub async fn save_draft(
        &self,
        metadata: DocumentMetadata,
        document: GraphDocument,
    ) -> Result<DocumentId, EngineError> {
        WorkflowGraph::from_document(&document)?;
        let stored = StoredDocument::draft(metadata, document, self.now());
        self.inner.documents.insert(&stored).await?;
        debug!(document_id = %stored.id, "draft saved");
        Ok(stored.id)
    }

    /// Saves `document` as a new draft revising `document_id`.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::NotFound` if the predecessor does not exist,
    /// or `DocumentError::Malformed` for a malformed document.
    #[instrument(skip(self, document), fields(predecessor = %document_id))]
    pub async fn revise(
        &self,
        document_id: DocumentId,
        document: GraphDocument,
    ) -> Result<DocumentId, EngineError> {
        WorkflowGraph::from_document(&document)?;
        let previous = self.inner.documents.get(document_id).await?;
        let revision = previous.revision(document, self.now());
        self.inner.documents.insert(&revision).await?;
        debug!(document_id = %revision.id, version = revision.version, "revision saved");
        Ok(revision.id)
    }

    /// Replaces the content of a draft.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Immutable` once the document is executable.
    #[instrument(skip(self, document), fields(document_id = %document_id))]
    pub async fn update_draft(
        &self,
        document_id: DocumentId,
        document: GraphDocument,
    ) -> Result<(), EngineError> {
        WorkflowGraph::from_document(&document)?;
        let mut stored = self.inner.documents.get(document_id).await?;
        stored.replace(document, self.now())?;
        self.inner.documents.update(&stored).await?;
        Ok(())
    }

    /// Validates a document and, if valid, makes it executable.
    ///
    /// Publishing a revision moves the event subscription from every earlier
    /// published version to the revision. Earlier versions become
    /// `Superseded`: runs already in flight finish on them, new events do not
    /// reach them. Publishing an executable document again returns `Valid`
    /// and restores its trigger record if that was lost.
    ///
    /// # Errors
    ///
    /// Returns an error only if the document cannot be loaded or stored;
    /// validation problems are reported in the `ValidationResult`.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn publish(&self, document_id: DocumentId) -> Result<ValidationResult, EngineError> {
        let mut stored = self.inner.documents.get(document_id).await?;
        let graph = match stored.status {
            DocumentStatus::Superseded => {
                debug!("document already replaced by a published revision");
                return Ok(ValidationResult::Valid);
            }
            DocumentStatus::Executable => self
                .executable_graph(document_id)
                .await?
                .ok_or(DocumentError::NotFound { document_id })?,
            DocumentStatus::Draft => {
                let graph = WorkflowGraph::from_document(&stored.document)?;
                let result = validate(&graph);
                if !result.is_valid() {
                    debug!(errors = result.errors().len(), "document rejected by validator");
                    return Ok(result);
                }

                stored.mark_executable(self.now());
                self.inner.documents.update(&stored).await?;
                let graph = Arc::new(graph);
                self.inner.graphs.insert(document_id, Arc::clone(&graph));
                graph
            }
        };

        let trigger = self.subscribe(&stored, &graph).await?;
        info!(event_kind = %trigger.event_kind, version = stored.version, "document published");
        Ok(ValidationResult::Valid)
    }

    /// Points the document's event kind at `stored`, retiring the trigger
    /// records of its published predecessors in the same store write.
    async fn subscribe(
        &self,
        stored: &StoredDocument,
        graph: &WorkflowGraph,
    ) -> Result<TriggerRecord, EngineError> {
        let trigger = graph
            .trigger_node()
            .and_then(|node| Some(TriggerRecord::new(node.event_kind()?, stored.id, node.id.clone())))
            .ok_or_else(|| DocumentError::malformed("valid document has no trigger"))?;

        let mut superseded = Vec::new();
        let mut predecessor = stored.predecessor;
        while let Some(previous_id) = predecessor {
            let mut previous = self.inner.documents.get(previous_id).await?;
            predecessor = previous.predecessor;
            if previous.status == DocumentStatus::Executable {
                previous.mark_superseded(self.now());
                superseded.push(previous);
            }
        }

        let retired: Vec<DocumentId> = superseded.iter().map(|previous| previous.id).collect();
        self.inner.documents.put_trigger(&trigger, &retired).await?;
        for previous in &superseded {
            self.inner.documents.update(previous).await?;
            info!(superseded = %previous.id, version = previous.version, "earlier version stops receiving events");
        }
        Ok(trigger)
    }

    /// Loads a stored document.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::NotFound` if no such document exists.
    pub async fn load_document(&self, document_id: DocumentId) -> Result<StoredDocument, EngineError> {
        Ok(self.inner.documents.get(document_id).await?)
    }

    async fn executable_graph(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<Arc<WorkflowGraph>>, EngineError> {
        if let Some(graph) = self.inner.graphs.get(&document_id) {
            return Ok(Some(Arc::clone(graph.value())));
        }

        let stored = self.inner.documents.get(document_id).await?;
        if !stored.is_executable() {
            return Ok(None);
        }
        let graph = Arc::new(WorkflowGraph::from_document(&stored.document)?);
        self.inner.graphs.insert(document_id, Arc::clone(&graph));
        Ok(Some(graph))
    }

    async fn run_graph(&self, run: &Run) -> Result<Arc<WorkflowGraph>, EngineError> {
        self.executable_graph(run.document_id)
            .await?
            .ok_or(EngineError::Document(DocumentError::NotFound {
                document_id: run.document_id,
            }))
    }

    // Runs

    /// Starts one run per executable document triggered by `event_kind`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoMatchingGraph` if no published document
    /// listens for the event; no run is created in that case.
    #[instrument(skip(self, variables))]
    pub async fn dispatch_event(
        &self,
        event_kind: &str,
        variables: Variables,
    ) -> Result<Vec<RunId>, EngineError> {
        let triggers = self.inner.documents.triggers_for(event_kind).await?;
        if triggers.is_empty() {
            warn!("dropping event: no published graph is triggered by it");
            return Err(EngineError::NoMatchingGraph {
                event_kind: event_kind.to_string(),
            });
        }

        let mut run_ids = Vec::with_capacity(triggers.len());
        for trigger in &triggers {
            run_ids.push(self.start_from(trigger, variables.clone()).await?);
        }
        Ok(run_ids)
    }

    /// Starts a run of a published document and steps it until it first
    /// suspends or finishes.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoMatchingGraph` unless the document currently
    /// receives `event_kind`: drafts, superseded versions and documents with
    /// a different trigger are all rejected.
    #[instrument(skip(self, variables), fields(document_id = %document_id))]
    pub async fn start_run(
        &self,
        document_id: DocumentId,
        event_kind: &str,
        variables: Variables,
    ) -> Result<RunId, EngineError> {
        let trigger = self
            .inner
            .documents
            .triggers_for(event_kind)
            .await?
            .into_iter()
            .find(|trigger| trigger.document_id == document_id)
            .ok_or_else(|| EngineError::NoMatchingGraph {
                event_kind: event_kind.to_string(),
            })?;
        self.start_from(&trigger, variables).await
    }

    async fn start_from(&self, trigger: &TriggerRecord, variables: Variables) -> Result<RunId, EngineError> {
        let graph = self
            .executable_graph(trigger.document_id)
            .await?
            .ok_or_else(|| EngineError::NoMatchingGraph {
                event_kind: trigger.event_kind.clone(),
            })?;

        let mut run = Run::new(trigger.document_id, trigger.node_id.clone(), variables, self.now());
        let lease = self.inner.leases.acquire(run.id).await;
        if let Err(e) = self.inner.runs.create(&run).await {
            self.inner.leases.forget(lease);
            return Err(e.into());
        }
        info!(run_id = %run.id, document_id = %trigger.document_id, "run started");

        let result = self.drive(&mut run, &graph).await;
        self.release(lease, &run);
        result.map(|()| run.id)
    }

    /// Cancels a run. Cancelling a finished run reports its status.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RunNotFound` if no such run exists.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn cancel_run(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
        let (lease, mut run) = self.lease_run(run_id).await?;
        if run.is_terminal() {
            debug!(status = ?run.status, "run already finished");
            self.release(lease, &run);
            return Ok(run.status);
        }

        run.cancel(self.now());
        self.inner.runs.save(&run).await?;
        info!(node_id = %run.current_node_id, "run cancelled");
        self.release(lease, &run);
        Ok(run.status)
    }

    /// Returns a snapshot of a run.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RunNotFound` if no such run exists.
    pub async fn get_run(&self, run_id: RunId) -> Result<Run, EngineError> {
        Ok(self.inner.runs.load(run_id).await?)
    }

    /// Resumes a run parked at a delay node.
    ///
    /// Finished runs and runs not waiting on a timer are left untouched. A
    /// call before the run's resume time re-arms the timer.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::RunNotFound` if no such run exists.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn resume(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
        let (lease, mut run) = self.lease_run(run_id).await?;
        if run.is_terminal() {
            debug!(status = ?run.status, "resume of finished run ignored");
            self.release(lease, &run);
            return Ok(run.status);
        }
        if run.status != RunStatus::WaitingOnTimer {
            warn!(status = ?run.status, "timer misfire: run is not waiting on a timer");
            return Ok(run.status);
        }

        let now = self.now();
        if let Some(resume_at) = run.resume_at.filter(|at| *at > now) {
            debug!(%resume_at, "timer fired early, re-arming");
            self.arm_timer(run_id, resume_at).await;
            return Ok(run.status);
        }

        run.resume(now);
        let result = self.continue_from(&mut run, PortId::output()).await;
        self.release(lease, &run);
        result.map(|()| run.status)
    }

    /// Resumes every run whose timer is due.
    ///
    /// # Errors
    ///
    /// Returns an error if the waiting runs cannot be listed.
    #[instrument(skip(self))]
    pub async fn resume_due(&self) -> Result<usize, EngineError> {
        let due = self.inner.runs.list_waiting(self.now()).await?;
        let mut resumed = 0;
        for run in due {
            match self.resume(run.id).await {
                Ok(_) => resumed += 1,
                Err(e) => warn!(run_id = %run.id, error = %e, "failed to resume due run"),
            }
        }
        if resumed > 0 {
            debug!(resumed, "resumed due runs");
        }
        Ok(resumed)
    }

    /// Takes the lease of `run_id` and loads the run under it. The lease entry
    /// is dropped again if the run cannot be loaded.
    async fn lease_run(&self, run_id: RunId) -> Result<(RunLease, Run), EngineError> {
        let lease = self.inner.leases.acquire(run_id).await;
        match self.inner.runs.load(run_id).await {
            Ok(run) => Ok((lease, run)),
            Err(e) => {
                self.inner.leases.forget(lease);
                Err(e.into())
            }
        }
    }

    fn release(&self, lease: RunLease, run: &Run) {
        if run.is_terminal() {
            self.inner.leases.forget(lease);
        }
    }

    /// Steps a running run from its current node until it suspends or ends.
    async fn drive(&self, run: &mut Run, graph: &WorkflowGraph) -> Result<(), EngineError> {
        loop {
            let now = self.now();
            let Some(node) = graph.node_by_id(&run.current_node_id) else {
                let error = EngineError::UnknownNode {
                    run_id: run.id,
                    node_id: run.current_node_id.clone(),
                };
                run.fail(error.to_string(), now);
                self.inner.runs.save(run).await?;
                return Err(error);
            };

            let result = match handler::handle(node, &run.variables) {
                Ok(result) => result,
                Err(e) => {
                    warn!(run_id = %run.id, node_id = %node.id, error = %e, "node handler failed");
                    run.fail(e.to_string(), now);
                    self.inner.runs.save(run).await?;
                    return Ok(());
                }
            };
            run.apply_updates(result.variable_updates);

            match result.effect {
                Effect::Continue => {
                    if !Self::follow(run, graph, result.next_port, now) {
                        self.inner.runs.save(run).await?;
                        return Ok(());
                    }
                }
                Effect::Pause { duration } => return self.park_on_timer(run, duration, now).await,
                Effect::InvokeAction {
                    action_kind,
                    action_parameters,
                } => {
                    run.wait_on_action(now);
                    self.inner.runs.save(run).await?;
                    self.spawn_action(run.id, node.id.clone(), action_kind, action_parameters);
                    return Ok(());
                }
            }
        }
    }

    /// Leaves the current node through `port`, then keeps stepping.
    async fn continue_from(&self, run: &mut Run, port: PortId) -> Result<(), EngineError> {
        let graph = self.run_graph(run).await?;
        if Self::follow(run, &graph, port, self.now()) {
            self.drive(run, &graph).await
        } else {
            self.inner.runs.save(run).await?;
            Ok(())
        }
    }

    /// Moves the run along `port`. Returns false if the port is unattached and
    /// the run completed instead.
    fn follow(run: &mut Run, graph: &WorkflowGraph, port: PortId, now: DateTime<Utc>) -> bool {
        match graph.successor(&run.current_node_id, &port) {
            Some(next) => {
                run.advance(port, next.id.clone(), now);
                true
            }
            None => {
                run.complete(Some(port), now);
                info!(run_id = %run.id, node_id = %run.current_node_id, "run completed");
                false
            }
        }
    }

    async fn park_on_timer(
        &self,
        run: &mut Run,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let resume_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay));
        let Some(resume_at) = resume_at else {
            run.fail(format!("delay of {}s is out of range", duration.as_secs()), now);
            self.inner.runs.save(run).await?;
            return Ok(());
        };

        run.wait_on_timer(resume_at, now);
        self.inner.runs.save(run).await?;
        self.arm_timer(run.id, resume_at).await;
        Ok(())
    }

    async fn arm_timer(&self, run_id: RunId, resume_at: DateTime<Utc>) {
        if let Err(e) = self.inner.timer.schedule_resume(run_id, resume_at).await {
            warn!(run_id = %run_id, error = %e, "timer rejected resume request; run left for the sweeper");
        }
    }

    /// Runs the action in its own task, watched by a supervisor that fails
    /// the run if the task panics or gives up on an engine error.
    fn spawn_action(
        &self,
        run_id: RunId,
        node_id: NodeId,
        action_kind: String,
        action_parameters: JsonValue,
    ) {
        let worker = {
            let engine = self.clone();
            let node_id = node_id.clone();
            tokio::spawn(async move {
                engine
                    .run_action(run_id, node_id, action_kind, action_parameters)
                    .await
            })
        };

        let engine = self.clone();
        tokio::spawn(async move {
            let error = match worker.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(e) if e.is_panic() => {
                    format!("action panicked: {}", panic_message(e.into_panic().as_ref()))
                }
                Err(e) => e.to_string(),
            };
            engine.abandon_action(run_id, &node_id, error).await;
        });
    }

    /// Invokes a business action with retries, outside the run's lease.
    #[instrument(skip(self, action_parameters), fields(run_id = %run_id, node_id = %node_id))]
    async fn run_action(
        &self,
        run_id: RunId,
        node_id: NodeId,
        action_kind: String,
        action_parameters: JsonValue,
    ) -> Result<(), EngineError> {
        let timeout = self.inner.config.action_timeout();
        let retry = &self.inner.config.retry;

        loop {
            let Some((attempt, variables)) = self.begin_attempt(run_id, &node_id).await? else {
                debug!("run is no longer waiting on this action, abandoning");
                return Ok(());
            };

            let request = ActionRequest {
                run_id,
                node_id: node_id.clone(),
                action_kind: action_kind.clone(),
                action_parameters: action_parameters.clone(),
                attempt,
            };
            let outcome =
                match tokio::time::timeout(timeout, self.inner.actions.invoke(&request, &variables)).await {
                    Ok(outcome) => outcome,
                    Err(_) => ActionOutcome::retryable(format!(
                        "action timed out after {}ms",
                        timeout.as_millis()
                    )),
                };

            if !outcome.success && outcome.retryable_error && retry.allows_retry_after(attempt) {
                let backoff = retry.backoff(attempt);
                warn!(attempt, error = %outcome.error_message(), ?backoff, "action failed, retrying");
                tokio::time::sleep(backoff).await;
                continue;
            }

            return self.finish_action(run_id, &node_id, outcome).await;
        }
    }

    /// Fails a run whose action task died without reporting an outcome.
    async fn abandon_action(&self, run_id: RunId, node_id: &NodeId, error: String) {
        warn!(run_id = %run_id, node_id = %node_id, %error, "action task failed, failing run");
        let recorded = async {
            let (lease, mut run) = self.lease_run(run_id).await?;
            if Self::awaits_action(&run, node_id) {
                run.fail(error, self.now());
                self.inner.runs.save(&run).await?;
            }
            self.release(lease, &run);
            Ok::<_, EngineError>(())
        }
        .await;

        if let Err(e) = recorded {
            warn!(run_id = %run_id, error = %e, "could not record failed action; run left waiting");
        }
    }

    fn awaits_action(run: &Run, node_id: &NodeId) -> bool {
        run.status == RunStatus::WaitingOnAction && run.current_node_id == *node_id
    }

    /// Records a new attempt. `None` if the run moved on (e.g. was cancelled).
    async fn begin_attempt(
        &self,
        run_id: RunId,
        node_id: &NodeId,
    ) -> Result<Option<(u32, Variables)>, EngineError> {
        let (lease, mut run) = self.lease_run(run_id).await?;
        if !Self::awaits_action(&run, node_id) {
            self.release(lease, &run);
            return Ok(None);
        }

        run.record_attempt(self.now());
        self.inner.runs.save(&run).await?;
        Ok(Some((run.action_attempts, run.variables)))
    }

    async fn finish_action(
        &self,
        run_id: RunId,
        node_id: &NodeId,
        outcome: ActionOutcome,
    ) -> Result<(), EngineError> {
        let (lease, mut run) = self.lease_run(run_id).await?;
        if !Self::awaits_action(&run, node_id) {
            info!(status = ?run.status, "discarding action outcome for a run that moved on");
            self.release(lease, &run);
            return Ok(());
        }

        let now = self.now();
        let result = if outcome.success {
            if let Some(updates) = outcome.result_variables {
                run.apply_updates(updates);
            }
            run.resume(now);
            self.continue_from(&mut run, PortId::output()).await
        } else {
            let error = outcome.error_message();
            warn!(attempts = run.action_attempts, %error, "action failed, failing run");
            run.fail(error, now);
            self.inner.runs.save(&run).await.map_err(EngineError::from)
        };
        self.release(lease, &run);
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[async_trait]
impl ResumeTarget for Engine {
    async fn resume_run(&self, run_id: RunId) -> Result<RunStatus, EngineError> {
        self.resume(run_id).await
    }

    async fn resume_due(&self) -> Result<usize, EngineError> {
        Engine::resume_due(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::definition::InMemoryDocumentStore;
    use crate::edge::Edge;
    use crate::error::{StoreError, TimerError};
    use crate::execution::NodeOutcome;
    use crate::node::Node;
    use crate::store::InMemoryRunStore;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingTimer {
        scheduled: Mutex<Vec<(RunId, DateTime<Utc>)>>,
    }

    impl RecordingTimer {
        fn scheduled(&self) -> Vec<(RunId, DateTime<Utc>)> {
            self.scheduled.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl TimerService for RecordingTimer {
        async fn schedule_resume(
            &self,
            run_id: RunId,
            resume_at: DateTime<Utc>,
        ) -> Result<(), TimerError> {
            self.scheduled.lock().expect("lock").push((run_id, resume_at));
            Ok(())
        }
    }

    /// Replays scripted outcomes, succeeding once the script runs out.
    #[derive(Default)]
    struct ScriptedActions {
        script: Mutex<VecDeque<ActionOutcome>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedActions {
        fn with_script(outcomes: impl IntoIterator<Item = ActionOutcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into_iter().collect()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl ActionInvoker for ScriptedActions {
        async fn invoke(&self, request: &ActionRequest, _variables: &Variables) -> ActionOutcome {
            self.calls.lock().expect("lock").push(request.action_kind.clone());
            self.script
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(ActionOutcome::succeeded)
        }
    }

    /// Blocks every invocation until released.
    #[derive(Default)]
    struct GatedActions {
        invoked: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl ActionInvoker for GatedActions {
        async fn invoke(&self, _request: &ActionRequest, _variables: &Variables) -> ActionOutcome {
            self.invoked.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            let mut updates = Variables::new();
            updates.insert("late".into(), json!(true));
            ActionOutcome::with_variables(updates)
        }
    }

    /// Never responds.
    #[derive(Default)]
    struct StalledActions {
        invoked: AtomicUsize,
    }

    #[async_trait]
    impl ActionInvoker for StalledActions {
        async fn invoke(&self, _request: &ActionRequest, _variables: &Variables) -> ActionOutcome {
            self.invoked.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    struct Harness {
        engine: Engine,
        runs: Arc<InMemoryRunStore>,
        timer: Arc<RecordingTimer>,
        clock: Arc<ManualClock>,
    }

    fn harness(actions: Arc<dyn ActionInvoker>) -> Harness {
        harness_with(actions, EngineConfig::default())
    }

    fn harness_with(actions: Arc<dyn ActionInvoker>, config: EngineConfig) -> Harness {
        let runs = Arc::new(InMemoryRunStore::new());
        let timer = Arc::new(RecordingTimer::default());
        let clock = Arc::new(ManualClock::default());
        let engine = Engine::builder(
            Arc::new(InMemoryDocumentStore::new()),
            runs.clone(),
            actions,
            timer.clone(),
        )
        .clock(clock.clone())
        .config(config)
        .build();

        Harness {
            engine,
            runs,
            timer,
            clock,
        }
    }

    fn vars(value: JsonValue) -> Variables {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    /// Trigger -> Delay(5s) -> Business("sendReminder")
    fn reminder() -> GraphDocument {
        GraphDocument::new(
            vec![
                Node::trigger("start", "signup"),
                Node::delay("wait", 5),
                Node::business("remind", "sendReminder", json!({ "channel": "email" })),
            ],
            vec![Edge::output("start", "wait"), Edge::output("wait", "remind")],
        )
    }

    /// Trigger -> Decision(age >= 18) yes -> adultFlow, no -> minorFlow
    fn age_check() -> GraphDocument {
        GraphDocument::new(
            vec![
                Node::trigger("start", "signup"),
                Node::decision("check", "age >= 18"),
                Node::business("adult", "adultFlow", JsonValue::Null),
                Node::business("minor", "minorFlow", JsonValue::Null),
            ],
            vec![
                Edge::output("start", "check"),
                Edge::new("check", PortId::yes(), "adult"),
                Edge::new("check", PortId::no(), "minor"),
            ],
        )
    }

    /// Trigger -> Business("notify")
    fn single_action(kind: &str) -> GraphDocument {
        GraphDocument::new(
            vec![
                Node::trigger("start", "signup"),
                Node::business("act", kind, JsonValue::Null),
            ],
            vec![Edge::output("start", "act")],
        )
    }

    async fn publish(engine: &Engine, document: GraphDocument) -> DocumentId {
        let id = engine
            .save_draft(DocumentMetadata::new("test"), document)
            .await
            .expect("save draft");
        let result = engine.publish(id).await.expect("publish");
        assert!(result.is_valid(), "unexpected validation errors: {result:?}");
        id
    }

    async fn wait_for(engine: &Engine, run_id: RunId, done: impl Fn(&Run) -> bool) -> Run {
        for _ in 0..1_000 {
            let run = engine.get_run(run_id).await.expect("get run");
            if done(&run) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} did not reach the expected state");
    }

    async fn wait_until_finished(engine: &Engine, run_id: RunId) -> Run {
        wait_for(engine, run_id, Run::is_terminal).await
    }

    fn assert_history_ordered(run: &Run) {
        for pair in run.history.windows(2) {
            let exited = pair[0].exited_at.expect("earlier entries are closed");
            assert!(exited <= pair[1].entered_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delay_parks_run_then_action_completes_it() {
        let actions = Arc::new(ScriptedActions::default());
        let h = harness(actions.clone());
        let document_id = publish(&h.engine, reminder()).await;

        let started = h.clock.now();
        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = h.engine.get_run(run_id).await.expect("get");
        assert_eq!(run.status, RunStatus::WaitingOnTimer);
        assert_eq!(run.current_node_id.as_str(), "wait");
        assert_eq!(
            h.timer.scheduled(),
            vec![(run_id, started + chrono::Duration::seconds(5))]
        );

        h.clock.advance(chrono::Duration::seconds(4));
        let status = h.engine.resume(run_id).await.expect("early resume");
        assert_eq!(status, RunStatus::WaitingOnTimer);
        assert_eq!(h.timer.scheduled().len(), 2);
        assert!(actions.calls().is_empty());

        h.clock.advance(chrono::Duration::seconds(1));
        h.engine.resume(run_id).await.expect("resume");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(actions.calls(), vec!["sendReminder"]);

        let visited: Vec<_> = run.history.iter().map(|e| e.node_id.as_str()).collect();
        assert_eq!(visited, vec!["start", "wait", "remind"]);
        assert_eq!(
            run.history[2].outcome,
            NodeOutcome::Completed {
                port: Some(PortId::output())
            }
        );
        assert_history_ordered(&run);
    }

    #[tokio::test(start_paused = true)]
    async fn decision_takes_no_branch_for_minors() {
        let actions = Arc::new(ScriptedActions::default());
        let h = harness(actions.clone());
        let document_id = publish(&h.engine, age_check()).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", vars(json!({ "age": 16 })))
            .await
            .expect("start");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(actions.calls(), vec!["minorFlow"]);
        assert_eq!(
            run.history[1].outcome,
            NodeOutcome::Exited { port: PortId::no() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unattached_branch_completes_run() {
        let actions = Arc::new(ScriptedActions::default());
        let h = harness(actions.clone());
        let document = GraphDocument::new(
            vec![
                Node::trigger("start", "signup"),
                Node::decision("check", "age >= 18").with_terminal_port(PortId::yes()),
                Node::business("minor", "minorFlow", JsonValue::Null),
            ],
            vec![
                Edge::output("start", "check"),
                Edge::new("check", PortId::no(), "minor"),
            ],
        );
        let document_id = publish(&h.engine, document).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", vars(json!({ "age": 30 })))
            .await
            .expect("start");

        let run = h.engine.get_run(run_id).await.expect("get");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.current_node_id.as_str(), "check");
        assert_eq!(
            run.history.last().map(|e| &e.outcome),
            Some(&NodeOutcome::Completed {
                port: Some(PortId::yes())
            })
        );
        assert!(actions.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_exhaust_attempts() {
        let actions = Arc::new(ScriptedActions::with_script(
            (0..3).map(|_| ActionOutcome::retryable("service unavailable")),
        ));
        let h = harness(actions.clone());
        let document_id = publish(&h.engine, single_action("notify")).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(actions.calls().len(), 3);
        assert_eq!(run.action_attempts, 3);
        assert_eq!(run.current_node_id.as_str(), "act");
        assert_eq!(run.error.as_deref(), Some("service unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_is_not_retried() {
        let actions = Arc::new(ScriptedActions::with_script([ActionOutcome::fatal(
            "invalid recipient",
        )]));
        let h = harness(actions.clone());
        let document_id = publish(&h.engine, single_action("notify")).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(actions.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_success_continues() {
        let mut updates = Variables::new();
        updates.insert("reminded".into(), json!(true));
        let actions = Arc::new(ScriptedActions::with_script([
            ActionOutcome::retryable("busy"),
            ActionOutcome::with_variables(updates),
        ]));
        let h = harness(actions.clone());
        let document_id = publish(&h.engine, single_action("notify")).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(actions.calls().len(), 2);
        assert_eq!(run.variables["reminded"], json!(true));
    }

    #[tokio::test(start_paused = true)]
    async fn action_timeout_counts_as_retryable() {
        let actions = Arc::new(StalledActions::default());
        let config = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
            action_timeout_ms: 1_000,
        };
        let h = harness_with(actions.clone(), config);
        let document_id = publish(&h.engine, single_action("notify")).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(actions.invoked.load(Ordering::SeqCst), 2);
        assert!(run.error.unwrap_or_default().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_event_creates_no_run() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let document_id = publish(&h.engine, reminder()).await;

        let err = h
            .engine
            .dispatch_event("payment", Variables::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::NoMatchingGraph {
                event_kind: "payment".to_string()
            }
        );

        let err = h
            .engine
            .start_run(document_id, "payment", Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoMatchingGraph { .. }));
        assert!(h.runs.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn drafts_cannot_start_runs() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let document_id = h
            .engine
            .save_draft(DocumentMetadata::new("draft"), reminder())
            .await
            .expect("save");

        let err = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoMatchingGraph { .. }));
        assert!(h.runs.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn event_starts_a_run_per_matching_document() {
        let h = harness(Arc::new(ScriptedActions::default()));
        publish(&h.engine, reminder()).await;
        publish(&h.engine, reminder()).await;

        let run_ids = h
            .engine
            .dispatch_event("signup", Variables::new())
            .await
            .expect("dispatch");
        assert_eq!(run_ids.len(), 2);
        assert_eq!(h.runs.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let document_id = publish(&h.engine, reminder()).await;
        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        assert_eq!(h.engine.cancel_run(run_id).await, Ok(RunStatus::Cancelled));
        assert_eq!(h.engine.cancel_run(run_id).await, Ok(RunStatus::Cancelled));

        let run = h.engine.get_run(run_id).await.expect("get");
        assert_eq!(run.history.len(), 2);
        assert_eq!(run.history[1].outcome, NodeOutcome::Cancelled);

        h.clock.advance(chrono::Duration::seconds(10));
        assert_eq!(h.engine.resume(run_id).await, Ok(RunStatus::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn late_action_result_is_discarded_after_cancel() {
        let actions = Arc::new(GatedActions::default());
        let h = harness(actions.clone());
        let document_id = publish(&h.engine, single_action("notify")).await;
        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        while actions.invoked.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // A stray timer callback must not disturb a run waiting on its action.
        assert_eq!(h.engine.resume(run_id).await, Ok(RunStatus::WaitingOnAction));

        assert_eq!(h.engine.cancel_run(run_id).await, Ok(RunStatus::Cancelled));
        actions.release.notify_one();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let run = h.engine.get_run(run_id).await.expect("get");
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(!run.variables.contains_key("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_due_only_touches_due_runs() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let document_id = publish(&h.engine, reminder()).await;
        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        assert_eq!(h.engine.resume_due().await, Ok(0));

        h.clock.advance(chrono::Duration::seconds(5));
        assert_eq!(h.engine.resume_due().await, Ok(1));

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_condition_fails_run() {
        let actions = Arc::new(ScriptedActions::default());
        let h = harness(actions.clone());
        let mut document = age_check();
        document.nodes[1] = Node::decision("check", "age >=");
        let document_id = publish(&h.engine, document).await;

        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = h.engine.get_run(run_id).await.expect("get");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.current_node_id.as_str(), "check");
        assert!(run.error.unwrap_or_default().contains("could not be evaluated"));
        assert!(actions.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_document_stays_draft() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let mut document = age_check();
        document.edges.pop();
        let document_id = h
            .engine
            .save_draft(DocumentMetadata::new("broken"), document)
            .await
            .expect("draft save accepts invalid graphs");

        let result = h.engine.publish(document_id).await.expect("publish");
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 2);

        let stored = h.engine.load_document(document_id).await.expect("load");
        assert_eq!(stored.status, DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn publishing_twice_is_harmless() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let document_id = publish(&h.engine, reminder()).await;

        assert_eq!(h.engine.publish(document_id).await, Ok(ValidationResult::Valid));
        let run_ids = h
            .engine
            .dispatch_event("signup", Variables::new())
            .await
            .expect("dispatch");
        assert_eq!(run_ids.len(), 1);
    }

    #[tokio::test]
    async fn executable_documents_are_revised_not_edited() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let draft_id = h
            .engine
            .save_draft(DocumentMetadata::new("reminders"), reminder())
            .await
            .expect("save");
        h.engine
            .update_draft(draft_id, reminder())
            .await
            .expect("drafts are editable");
        assert!(h.engine.publish(draft_id).await.expect("publish").is_valid());

        let err = h.engine.update_draft(draft_id, age_check()).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::Document(DocumentError::Immutable {
                document_id: draft_id
            })
        );

        let revision_id = h.engine.revise(draft_id, age_check()).await.expect("revise");
        let revision = h.engine.load_document(revision_id).await.expect("load");
        assert_eq!(revision.version, 2);
        assert_eq!(revision.predecessor, Some(draft_id));
        assert_eq!(revision.status, DocumentStatus::Draft);
        assert_eq!(revision.metadata.name, "reminders");
    }

    #[tokio::test]
    async fn malformed_drafts_are_rejected() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let mut document = reminder();
        document.edges.push(Edge::output("remind", "ghost"));

        let err = h
            .engine
            .save_draft(DocumentMetadata::new("broken"), document)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Document(DocumentError::Malformed { .. })));
    }

    #[tokio::test]
    async fn unknown_run_is_reported() {
        let h = harness(Arc::new(ScriptedActions::default()));
        let run_id = RunId::new();
        assert_eq!(
            h.engine.cancel_run(run_id).await,
            Err(EngineError::Store(StoreError::RunNotFound { run_id }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn published_revision_takes_over_the_event() {
        let actions = Arc::new(ScriptedActions::default());
        let h = harness(actions.clone());
        let first = publish(&h.engine, single_action("welcomeV1")).await;
        let second = h
            .engine
            .revise(first, single_action("welcomeV2"))
            .await
            .expect("revise");
        assert!(h.engine.publish(second).await.expect("publish").is_valid());

        let run_ids = h
            .engine
            .dispatch_event("signup", Variables::new())
            .await
            .expect("dispatch");
        assert_eq!(run_ids.len(), 1);

        let run = wait_until_finished(&h.engine, run_ids[0]).await;
        assert_eq!(run.document_id, second);
        assert_eq!(actions.calls(), vec!["welcomeV2"]);

        let replaced = h.engine.load_document(first).await.expect("load");
        assert_eq!(replaced.status, DocumentStatus::Superseded);
        assert_eq!(h.engine.publish(first).await, Ok(ValidationResult::Valid));
        let err = h
            .engine
            .start_run(first, "signup", Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoMatchingGraph { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_run_finishes_on_superseded_version() {
        let actions = Arc::new(ScriptedActions::default());
        let h = harness(actions.clone());
        let first = publish(&h.engine, reminder()).await;
        let run_id = h
            .engine
            .start_run(first, "signup", Variables::new())
            .await
            .expect("start");

        let second = h
            .engine
            .revise(first, single_action("welcome"))
            .await
            .expect("revise");
        assert!(h.engine.publish(second).await.expect("publish").is_valid());

        h.clock.advance(chrono::Duration::seconds(5));
        h.engine.resume(run_id).await.expect("resume");
        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.document_id, first);
        assert_eq!(actions.calls(), vec!["sendReminder"]);
    }

    /// Wraps the in-memory store, refusing trigger writes while `down` is set.
    #[derive(Default)]
    struct TriggerOutage {
        inner: InMemoryDocumentStore,
        down: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for TriggerOutage {
        async fn insert(&self, document: &StoredDocument) -> Result<(), DocumentError> {
            self.inner.insert(document).await
        }

        async fn get(&self, document_id: DocumentId) -> Result<StoredDocument, DocumentError> {
            self.inner.get(document_id).await
        }

        async fn update(&self, document: &StoredDocument) -> Result<(), DocumentError> {
            self.inner.update(document).await
        }

        async fn put_trigger(
            &self,
            trigger: &crate::trigger::TriggerRecord,
            retired: &[DocumentId],
        ) -> Result<(), DocumentError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(DocumentError::Storage {
                    message: "trigger table unavailable".to_string(),
                });
            }
            self.inner.put_trigger(trigger, retired).await
        }

        async fn triggers_for(
            &self,
            event_kind: &str,
        ) -> Result<Vec<crate::trigger::TriggerRecord>, DocumentError> {
            self.inner.triggers_for(event_kind).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn republishing_restores_a_lost_trigger() {
        let documents = Arc::new(TriggerOutage::default());
        documents.down.store(true, Ordering::SeqCst);
        let engine = Engine::builder(
            documents.clone(),
            Arc::new(InMemoryRunStore::new()),
            Arc::new(ScriptedActions::default()),
            Arc::new(RecordingTimer::default()),
        )
        .clock(Arc::new(ManualClock::default()))
        .build();

        let document_id = engine
            .save_draft(DocumentMetadata::new("welcome"), single_action("welcome"))
            .await
            .expect("save");
        assert!(engine.publish(document_id).await.is_err());
        let stored = engine.load_document(document_id).await.expect("load");
        assert_eq!(stored.status, DocumentStatus::Executable);
        assert!(engine.dispatch_event("signup", Variables::new()).await.is_err());

        documents.down.store(false, Ordering::SeqCst);
        assert_eq!(engine.publish(document_id).await, Ok(ValidationResult::Valid));
        let run_ids = engine
            .dispatch_event("signup", Variables::new())
            .await
            .expect("dispatch");
        assert_eq!(run_ids.len(), 1);
    }

    #[tokio::test]
    async fn unknown_run_ids_leave_no_leases_behind() {
        let h = harness(Arc::new(ScriptedActions::default()));
        for _ in 0..1_000 {
            assert!(h.engine.cancel_run(RunId::new()).await.is_err());
            assert!(h.engine.resume(RunId::new()).await.is_err());
        }
        assert!(h.engine.inner.leases.is_empty());
    }

    struct PanickingActions;

    #[async_trait]
    impl ActionInvoker for PanickingActions {
        async fn invoke(&self, _request: &ActionRequest, _variables: &Variables) -> ActionOutcome {
            panic!("invoker exploded");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_action_fails_the_run() {
        let h = harness(Arc::new(PanickingActions));
        let document_id = publish(&h.engine, single_action("explode")).await;
        let run_id = h
            .engine
            .start_run(document_id, "signup", Variables::new())
            .await
            .expect("start");

        let run = wait_until_finished(&h.engine, run_id).await;
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.error.expect("failure is recorded");
        assert!(error.contains("invoker exploded"), "unexpected error: {error}");
        assert!(h.engine.inner.leases.is_empty());
    }
}
