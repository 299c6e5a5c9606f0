//! Stored graph documents.
//!
//! A stored document is a graph document plus metadata, a version and a
//! status. Executable documents are never edited in place: a revision creates
//! a new document that points at its predecessor.

use crate::document::GraphDocument;
use crate::error::DocumentError;
use crate::trigger::TriggerRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Descriptive information about a document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Human-readable name.
    pub name: String,
    /// What the workflow does.
    #[serde(default)]
    pub description: Option<String>,
    /// Tags for organization/filtering.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DocumentMetadata {
    /// Creates metadata with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Whether a document can start runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentStatus {
    /// Editable; may be invalid.
    Draft,
    /// Validated and frozen; eligible to start runs.
    Executable,
    /// Frozen, but a published revision now receives its events. Runs
    /// already in flight keep executing against it.
    Superseded,
}

/// A graph document as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: DocumentId,
    /// 1 for a new document, predecessor's version + 1 for a revision.
    pub version: u32,
    /// The document this one revises.
    pub predecessor: Option<DocumentId>,
    pub status: DocumentStatus,
    pub metadata: DocumentMetadata,
    pub document: GraphDocument,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    /// Creates a first-version draft.
    #[must_use]
    pub fn draft(metadata: DocumentMetadata, document: GraphDocument, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentId::new(),
            version: 1,
            predecessor: None,
            status: DocumentStatus::Draft,
            metadata,
            document,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a draft revising this document.
    #[must_use]
    pub fn revision(&self, document: GraphDocument, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentId::new(),
            version: self.version + 1,
            predecessor: Some(self.id),
            status: DocumentStatus::Draft,
            metadata: self.metadata.clone(),
            document,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the document has been published, whether or not a
    /// later revision has replaced it.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Executable | DocumentStatus::Superseded
        )
    }

    /// Replaces the content of a draft.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError::Immutable` if the document is executable.
    pub fn replace(&mut self, document: GraphDocument, now: DateTime<Utc>) -> Result<(), DocumentError> {
        if self.is_executable() {
            return Err(DocumentError::Immutable {
                document_id: self.id,
            });
        }
        self.document = document;
        self.updated_at = now;
        Ok(())
    }

    /// Freezes the document.
    pub fn mark_executable(&mut self, now: DateTime<Utc>) {
        self.status = DocumentStatus::Executable;
        self.updated_at = now;
    }

    /// Stops the document from receiving new events.
    pub fn mark_superseded(&mut self, now: DateTime<Utc>) {
        self.status = DocumentStatus::Superseded;
        self.updated_at = now;
    }
}

/// Persistence of graph documents and their denormalized trigger records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new document.
    async fn insert(&self, document: &StoredDocument) -> Result<(), DocumentError>;

    /// Loads a document by id.
    async fn get(&self, document_id: DocumentId) -> Result<StoredDocument, DocumentError>;

    /// Replaces a stored document.
    async fn update(&self, document: &StoredDocument) -> Result<(), DocumentError>;

    /// Records the trigger of an executable document and, in the same step,
    /// drops the trigger records of the `retired` documents.
    async fn put_trigger(
        &self,
        trigger: &TriggerRecord,
        retired: &[DocumentId],
    ) -> Result<(), DocumentError>;

    /// Returns the triggers listening for `event_kind`.
    async fn triggers_for(&self, event_kind: &str) -> Result<Vec<TriggerRecord>, DocumentError>;
}

/// A document store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, StoredDocument>>,
    triggers: RwLock<Vec<TriggerRecord>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, document: &StoredDocument) -> Result<(), DocumentError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&document.id) {
            return Err(DocumentError::Storage {
                message: format!("document {} already exists", document.id),
            });
        }
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get(&self, document_id: DocumentId) -> Result<StoredDocument, DocumentError> {
        self.documents
            .read()
            .await
            .get(&document_id)
            .cloned()
            .ok_or(DocumentError::NotFound { document_id })
    }

    async fn update(&self, document: &StoredDocument) -> Result<(), DocumentError> {
        let mut documents = self.documents.write().await;
        match documents.get_mut(&document.id) {
            Some(stored) => {
                *stored = document.clone();
                Ok(())
            }
            None => Err(DocumentError::NotFound {
                document_id: document.id,
            }),
        }
    }

    async fn put_trigger(
        &self,
        trigger: &TriggerRecord,
        retired: &[DocumentId],
    ) -> Result<(), DocumentError> {
        let mut triggers = self.triggers.write().await;
        triggers.retain(|existing| !retired.contains(&existing.document_id));
        if !triggers.contains(trigger) {
            triggers.push(trigger.clone());
        }
        Ok(())
    }

    async fn triggers_for(&self, event_kind: &str) -> Result<Vec<TriggerRecord>, DocumentError> {
        Ok(self
            .triggers
            .read()
            .await
            .iter()
            .filter(|trigger| trigger.matches(event_kind))
            .cloned()
            .collect())
    }
}
