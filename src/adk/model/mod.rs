// SPDX-License-Identifier: MIT

//! Model module - the AI completion collaborator
//!
//! The engine only ever needs one operation from a language model: turn a
//! prompt into text. Everything it gets back is treated as untrusted.
//! - [openai] - OpenAI-compatible chat-completions backend

pub mod openai;

use crate::adk::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single completion request
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// Overrides the backend's configured model for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Raw text returned by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub content: String,
}

/// Core trait for completion backends
#[async_trait]
pub trait Model: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
}
