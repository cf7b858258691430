// SPDX-License-Identifier: MIT

//! File runner: vault reads for source nodes, writes for sink nodes

use super::ExecutionError;
use crate::adk::command::Attachment;
use crate::flow::workflow::store::write_atomic;
use crate::flow::workflow::validator::is_vault_relative;
use crate::flow::workflow::FileData;
use serde_json::Value;
use std::path::{Path, PathBuf};

fn file_error(node_id: &str, message: impl Into<String>) -> ExecutionError {
    ExecutionError::File {
        node_id: node_id.to_string(),
        message: message.into(),
    }
}

/// Join a vault-relative path onto the vault root
pub fn resolve(vault: &Path, node_id: &str, path: &str) -> Result<PathBuf, ExecutionError> {
    if !is_vault_relative(path) {
        return Err(file_error(
            node_id,
            format!("path '{}' must be relative to the vault and stay inside it", path),
        ));
    }
    Ok(vault.join(path.trim()))
}

/// Text written for an upstream value
pub fn render_for_file(value: &Value) -> Result<String, serde_json::Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string_pretty(other),
    }
}

/// Read a source node's file
pub async fn read_source(vault: &Path, node_id: &str, data: &FileData) -> Result<Attachment, ExecutionError> {
    let path = resolve(vault, node_id, &data.path)?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| file_error(node_id, format!("cannot read '{}': {}", data.path, e)))?;

    log::debug!("[{}] Read {} bytes from {}", node_id, content.len(), data.path);
    Ok(Attachment {
        node_id: node_id.to_string(),
        path: data.path.clone(),
        content,
    })
}

/// Write `value` to a sink node's file and return the text written
pub async fn write_sink(
    vault: &Path,
    node_id: &str,
    data: &FileData,
    value: &Value,
) -> Result<String, ExecutionError> {
    let path = resolve(vault, node_id, &data.path)?;
    let text = render_for_file(value).map_err(|e| file_error(node_id, e.to_string()))?;

    write_atomic(&path, text.as_bytes())
        .await
        .map_err(|e| file_error(node_id, format!("cannot write '{}': {}", data.path, e)))?;

    log::info!("[{}] Wrote {} bytes to {}", node_id, text.len(), data.path);
    Ok(text)
}
