//! Execution context store.
//!
//! Runs are stored whole: `save` always replaces the entire run. The store
//! does not serialize access to a run; the engine holds a per-run lease for
//! that. Terminal runs stay in the store as an archive.

use crate::error::StoreError;
use crate::execution::{Run, RunStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::RunId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable storage of run state keyed by run id.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Stores a new run.
    async fn create(&self, run: &Run) -> Result<(), StoreError>;

    /// Loads a run by id.
    async fn load(&self, run_id: RunId) -> Result<Run, StoreError>;

    /// Replaces a stored run.
    async fn save(&self, run: &Run) -> Result<(), StoreError>;

    /// Returns runs waiting on a timer due at or before `before`.
    async fn list_waiting(&self, before: DateTime<Utc>) -> Result<Vec<Run>, StoreError>;
}

/// A run store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, Run>>,
}

impl InMemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored runs, terminal ones included.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Returns true if no run has been stored.
    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.id) {
            return Err(StoreError::RunAlreadyExists { run_id: run.id });
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn load(&self, run_id: RunId) -> Result<Run, StoreError> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(StoreError::RunNotFound { run_id })
    }

    async fn save(&self, run: &Run) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(StoreError::RunNotFound { run_id: run.id }),
        }
    }

    async fn list_waiting(&self, before: DateTime<Utc>) -> Result<Vec<Run>, StoreError> {
        let runs = self.runs.read().await;
        let mut waiting: Vec<Run> = runs
            .values()
            .filter(|run| run.status == RunStatus::WaitingOnTimer)
            .filter(|run| run.resume_at.is_some_and(|at| at <= before))
            .cloned()
            .collect();
        waiting.sort_by_key(|run| (run.resume_at, run.id));
        Ok(waiting)
    }
}
