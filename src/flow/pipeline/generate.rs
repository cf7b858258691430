// SPDX-License-Identifier: MIT

//! Generation pipeline: a description in, a persisted workflow out

use super::prompts::generation_prompt;
use super::queue::{Outcome, QueueHandler, Reporter, Stage};
use super::repair::{validate_with_repair, RepairOutcome, MAX_VALIDATION_ATTEMPTS};
use super::reply::{interpret_generation_reply, GenerationReply};
use crate::adk::error::EngineError;
use crate::adk::json::extract_json;
use crate::adk::model::{CompletionRequest, Model};
use crate::flow::config::QueueKind;
use crate::flow::workflow::layout::layout_workflow;
use crate::flow::workflow::validator::bullet_list;
use crate::flow::workflow::{ValidationOptions, WorkflowStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::sync::Arc;

/// An answer to a question the model asked earlier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clarification {
    pub question: String,
    pub answer: String,
}

/// Queue file of the generation pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub request_id: String,
    pub prompt: String,
    #[serde(default)]
    pub allow_code: bool,
    #[serde(default)]
    pub clarifications: Vec<Clarification>,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Client-side retry counter, echoed in logs only
    #[serde(default)]
    pub attempt: Option<u32>,
}

pub struct GenerationPipeline {
    model: Arc<dyn Model>,
    store: WorkflowStore,
}

impl GenerationPipeline {
    pub fn new(model: Arc<dyn Model>, store: WorkflowStore) -> Self {
        Self { model, store }
    }
}

#[async_trait]
impl QueueHandler for GenerationPipeline {
    type Request = GenerationRequest;

    fn kind(&self) -> QueueKind {
        QueueKind::Generate
    }

    fn first_stage(&self) -> Stage {
        Stage::Generating
    }

    async fn handle(
        &self,
        request: GenerationRequest,
        reporter: &Reporter,
    ) -> Result<Outcome, EngineError> {
        if request.prompt.trim().is_empty() {
            return Err(EngineError::malformed("Generation request has an empty prompt"));
        }
        log::info!(
            "[{}] Generating workflow (thread {:?}, client attempt {:?})",
            request.request_id,
            request.thread_id,
            request.attempt
        );

        let completion = self
            .model
            .complete(
                CompletionRequest::new(generation_prompt(&request))
                    .with_model(request.model_override.clone()),
            )
            .await?;

        let value = extract_json(&completion.content)
            .map_err(|e| EngineError::malformed(format!("Model reply is not valid JSON: {}", e)))?;
        let candidate = match interpret_generation_reply(value).map_err(EngineError::malformed)? {
            GenerationReply::NeedsClarification(questions) => {
                log::info!("[{}] Model asked {} question(s)", request.request_id, questions.len());
                return Ok(Outcome::NeedsClarification(questions));
            }
            GenerationReply::Workflow(candidate) => candidate,
        };

        let options = ValidationOptions::allow_code(request.allow_code);
        let validated = match validate_with_repair(
            self.model.as_ref(),
            request.model_override.as_deref(),
            candidate,
            options,
            reporter,
        )
        .await?
        {
            RepairOutcome::Valid { validated, .. } => validated,
            RepairOutcome::Exhausted { errors } => {
                return Ok(Outcome::Failed(format!(
                    "The generated workflow is still invalid after {} attempts:\n{}",
                    MAX_VALIDATION_ATTEMPTS,
                    bullet_list(&errors)
                )));
            }
        };

        reporter.stage(Stage::Layout).await;
        let mut workflow = validated.workflow;
        layout_workflow(&mut workflow);

        reporter.stage(Stage::Writing).await;
        self.store.save(&workflow).await?;

        let mut payload = Map::new();
        payload.insert("workflowId".into(), json!(workflow.id));
        payload.insert("workflowName".into(), json!(workflow.name));
        payload.insert("warnings".into(), json!(validated.warnings));
        Ok(Outcome::Completed(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "requestId": "r1",
            "prompt": "Summarise my inbox"
        }))
        .unwrap();
        assert!(!request.allow_code);
        assert!(request.clarifications.is_empty());
        assert!(request.model_override.is_none());
    }

    #[test]
    fn test_request_with_clarifications() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "requestId": "r1",
            "prompt": "Summarise",
            "allowCode": true,
            "clarifications": [{"question": "Which folder?", "answer": "inbox/"}],
            "modelOverride": "gpt-4o"
        }))
        .unwrap();
        assert!(request.allow_code);
        assert_eq!(request.clarifications[0].answer, "inbox/");
        assert!(generation_prompt(&request).contains("A: inbox/"));
    }
}
