// SPDX-License-Identifier: MIT

//! Typed error handling for vaultflow
//!
//! `EngineError` is the top-level error returned by the pipelines and the
//! CLI plumbing. Provider failures carry a machine-readable code so the chat
//! pipeline can turn them into user-facing suggestions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for vaultflow
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failure reported by the AI completion or command-execution collaborator
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Workflow persistence or validation errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request or reply payloads
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No workflow file exists for the id
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// The id cannot be used as a file name inside the vault
    #[error("Invalid workflow id: {0:?}")]
    InvalidId(String),

    /// The definition failed structural validation
    #[error("Workflow is invalid:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Coarse classification of provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    RateLimited,
    Unauthorized,
    ContextLength,
    Timeout,
    Network,
    ModelNotFound,
    InvalidResponse,
    Other,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorCode::RateLimited => "rate_limited",
            ProviderErrorCode::Unauthorized => "unauthorized",
            ProviderErrorCode::ContextLength => "context_length",
            ProviderErrorCode::Timeout => "timeout",
            ProviderErrorCode::Network => "network",
            ProviderErrorCode::ModelNotFound => "model_not_found",
            ProviderErrorCode::InvalidResponse => "invalid_response",
            ProviderErrorCode::Other => "other",
        }
    }
}

/// Error returned by a `Model` or `CommandExecutor`
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Other, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }
}

impl EngineError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a malformed-input error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_workflow_lists_every_error() {
        let err = WorkflowError::Invalid(vec!["- a".to_string(), "- b".to_string()]);
        assert_eq!(err.to_string(), "Workflow is invalid:\n- a\n- b");
    }

    #[test]
    fn test_provider_error_displays_message_only() {
        let err = ProviderError::new(ProviderErrorCode::RateLimited, "slow down");
        assert_eq!(err.to_string(), "slow down");
        assert_eq!(err.code.as_str(), "rate_limited");
    }

    #[test]
    fn test_engine_error_from_provider() {
        let err: EngineError = ProviderError::other("boom").into();
        assert!(matches!(err, EngineError::Provider(_)));
    }
}
