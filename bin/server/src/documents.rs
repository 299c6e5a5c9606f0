//! Startup loading of graph documents.

use crate::error::DaemonError;
use nodeflow_core::DocumentId;
use nodeflow_workflow::{DocumentMetadata, Engine, GraphDocument, ValidationError};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// What happened to the documents found at startup.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents that validated and now accept events, by file name.
    pub published: Vec<(String, DocumentId)>,
    /// Documents saved as drafts because they failed validation.
    pub rejected: Vec<(String, Vec<ValidationError>)>,
    /// Files that could not be read or parsed.
    pub unreadable: Vec<String>,
}

/// Saves and publishes every `*.json` document in `dir`, in file name order.
///
/// # Errors
///
/// Returns an error only if the directory itself cannot be listed; bad
/// documents are logged and recorded in the report.
#[instrument(skip(engine, dir), fields(dir = %dir.display()))]
pub async fn load_documents(
    engine: &Engine,
    dir: &Path,
) -> nodeflow_core::Result<LoadReport, DaemonError> {
    let mut report = LoadReport::default();
    for path in json_files(dir).await? {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => GraphDocument::from_slice(&bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let document = match document {
            Ok(document) => document,
            Err(error) => {
                warn!(file = %path.display(), %error, "skipping unreadable document");
                report.unreadable.push(name);
                continue;
            }
        };

        let published = async {
            let document_id = engine
                .save_draft(DocumentMetadata::new(name.clone()), document)
                .await?;
            let result = engine.publish(document_id).await?;
            Ok::<_, nodeflow_workflow::EngineError>((document_id, result))
        }
        .await;

        match published {
            Ok((document_id, result)) if result.is_valid() => {
                info!(document = %name, %document_id, "document published");
                report.published.push((name, document_id));
            }
            Ok((document_id, result)) => {
                let errors: Vec<String> = result.errors().iter().map(ToString::to_string).collect();
                warn!(document = %name, %document_id, errors = ?errors, "document failed validation");
                report.rejected.push((name, result.errors().to_vec()));
            }
            Err(error) => {
                warn!(document = %name, %error, "skipping document");
                report.unreadable.push(name);
            }
        }
    }
    Ok(report)
}

async fn json_files(dir: &Path) -> nodeflow_core::Result<Vec<PathBuf>, DaemonError> {
    let dir_error = |e: std::io::Error| DaemonError::DocumentsDir {
        path: dir.to_path_buf(),
        details: e.to_string(),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
