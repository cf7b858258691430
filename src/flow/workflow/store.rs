// SPDX-License-Identifier: MIT

//! Workflow file storage
//!
//! One JSON document per workflow, named `<id>.json`. Writes go through a
//! temporary file and a rename so readers never see half a document; readers
//! still retry a few times in case another process is mid-write.

use super::types::WorkflowDefinition;
use super::validator::{is_valid_workflow_id, validate_workflow, ValidationOptions};
use crate::adk::error::{EngineError, WorkflowError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const READ_ATTEMPTS: usize = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Write `bytes` to `path` through a sibling temp file and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let dir = path
        .parent()
        .ok_or_else(|| EngineError::other(format!("No parent directory for {}", path.display())))?;
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Read and parse a JSON file, re-reading on parse failure.
/// A missing file is `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, EngineError> {
    let mut attempt = 1;
    loop {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<T>(&text) {
            Ok(value) => return Ok(Some(value)),
            Err(e) if attempt >= READ_ATTEMPTS => return Err(e.into()),
            Err(e) => {
                log::debug!(
                    "Parse of {} failed (attempt {}): {}; retrying",
                    path.display(),
                    attempt,
                    e
                );
                attempt += 1;
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

/// Directory of persisted workflow definitions
#[derive(Debug, Clone)]
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a workflow id, rejecting ids that would escape the directory
    pub fn path_for(&self, id: &str) -> Result<PathBuf, WorkflowError> {
        if !is_valid_workflow_id(id) {
            return Err(WorkflowError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    pub async fn save(&self, workflow: &WorkflowDefinition) -> Result<PathBuf, EngineError> {
        let path = self.path_for(&workflow.id)?;
        write_json(&path, workflow).await?;
        log::info!("Saved workflow '{}' to {}", workflow.id, path.display());
        Ok(path)
    }

    /// Load a workflow and run it through the validator.
    /// Code nodes are allowed since the file is already trusted.
    pub async fn load(&self, id: &str) -> Result<WorkflowDefinition, EngineError> {
        let path = self.path_for(id)?;
        let value: serde_json::Value = read_json(&path)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;

        let validated = validate_workflow(&value, ValidationOptions::allow_code(true))
            .map_err(WorkflowError::from)?;
        for warning in &validated.warnings {
            log::debug!("Workflow '{}': {}", id, warning);
        }
        Ok(validated.workflow)
    }

    pub async fn exists(&self, id: &str) -> bool {
        match self.path_for(id) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Ids of every stored workflow, sorted
    pub async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(".json") {
                if is_valid_workflow_id(id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WorkflowError::NotFound(id.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
