// SPDX-License-Identifier: MIT

//! Edit pipeline: chat about a workflow, and replace it when the model
//! returns a new version
//!
//! The model always returns a complete definition; it is validated and laid
//! out like a generated one. The edited workflow keeps its id and creation
//! time.

use super::prompts::edit_prompt;
use super::queue::{Outcome, QueueHandler, Reporter, Stage};
use super::repair::{validate_with_repair, RepairOutcome, MAX_VALIDATION_ATTEMPTS};
use super::reply::{interpret_edit_reply, EditReply};
use crate::adk::command::ChatTurn;
use crate::adk::error::EngineError;
use crate::adk::json::extract_json;
use crate::adk::model::{CompletionRequest, Model};
use crate::flow::config::QueueKind;
use crate::flow::workflow::layout::layout_workflow;
use crate::flow::workflow::validator::{bullet_list, is_valid_workflow_id};
use crate::flow::workflow::{now_timestamp, ValidationOptions, WorkflowStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Queue file of the edit pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub request_id: String,
    pub workflow_id: String,
    /// The workflow as the client currently shows it
    pub workflow: Value,
    #[serde(default)]
    pub selected_node_id: Option<String>,
    #[serde(default)]
    pub recent_runs: Vec<Value>,
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
    /// Defaults to whether the current workflow already has code nodes
    #[serde(default)]
    pub allow_code: Option<bool>,
    #[serde(default)]
    pub model_override: Option<String>,
}

impl EditRequest {
    fn current_has_code(&self) -> bool {
        self.workflow
            .get("nodes")
            .and_then(Value::as_array)
            .is_some_and(|nodes| {
                nodes
                    .iter()
                    .any(|n| n.get("type").and_then(Value::as_str) == Some("code"))
            })
    }

    pub fn effective_allow_code(&self) -> bool {
        self.allow_code.unwrap_or_else(|| self.current_has_code())
    }
}

pub struct EditPipeline {
    model: Arc<dyn Model>,
    store: WorkflowStore,
}

impl EditPipeline {
    pub fn new(model: Arc<dyn Model>, store: WorkflowStore) -> Self {
        Self { model, store }
    }
}

#[async_trait]
impl QueueHandler for EditPipeline {
    type Request = EditRequest;

    fn kind(&self) -> QueueKind {
        QueueKind::Edit
    }

    fn first_stage(&self) -> Stage {
        Stage::Processing
    }

    async fn handle(&self, request: EditRequest, reporter: &Reporter) -> Result<Outcome, EngineError> {
        if !is_valid_workflow_id(&request.workflow_id) {
            return Err(EngineError::malformed(format!(
                "Invalid workflow id {:?}",
                request.workflow_id
            )));
        }
        if request.message.trim().is_empty() {
            return Err(EngineError::malformed("Edit request has an empty message"));
        }

        let allow_code = request.effective_allow_code();
        let completion = self
            .model
            .complete(
                CompletionRequest::new(edit_prompt(&request, allow_code))
                    .with_model(request.model_override.clone()),
            )
            .await?;

        let value = extract_json(&completion.content)
            .map_err(|e| EngineError::malformed(format!("Model reply is not valid JSON: {}", e)))?;

        let (candidate, response_message, changes_description) =
            match interpret_edit_reply(value).map_err(EngineError::malformed)? {
                EditReply::NeedsClarification(questions) => {
                    return Ok(Outcome::NeedsClarification(questions));
                }
                EditReply::Completed {
                    updated_workflow: None,
                    response_message,
                    changes_description,
                } => {
                    log::info!("[{}] Answered without changing the graph", request.request_id);
                    let mut payload = Map::new();
                    payload.insert("responseMessage".into(), json!(response_message));
                    if let Some(changes) = changes_description {
                        payload.insert("changesDescription".into(), json!(changes));
                    }
                    return Ok(Outcome::Completed(payload));
                }
                EditReply::Completed {
                    updated_workflow: Some(candidate),
                    response_message,
                    changes_description,
                } => (candidate, response_message, changes_description),
            };

        let validated = match validate_with_repair(
            self.model.as_ref(),
            request.model_override.as_deref(),
            candidate,
            ValidationOptions::allow_code(allow_code),
            reporter,
        )
        .await?
        {
            RepairOutcome::Valid { validated, .. } => validated,
            RepairOutcome::Exhausted { errors } => {
                return Ok(Outcome::Failed(format!(
                    "The edited workflow is still invalid after {} attempts:\n{}",
                    MAX_VALIDATION_ATTEMPTS,
                    bullet_list(&errors)
                )));
            }
        };

        let mut workflow = validated.workflow;
        workflow.id = request.workflow_id.clone();
        if let Some(created) = request.workflow.get("created").and_then(Value::as_str) {
            workflow.created = created.to_string();
        }
        workflow.updated = now_timestamp();

        reporter.stage(Stage::Layout).await;
        layout_workflow(&mut workflow);

        reporter.stage(Stage::Writing).await;
        self.store.save(&workflow).await?;

        let mut payload = Map::new();
        payload.insert("updatedWorkflow".into(), serde_json::to_value(&workflow)?);
        payload.insert("responseMessage".into(), json!(response_message));
        payload.insert(
            "changesDescription".into(),
            json!(changes_description.unwrap_or_else(|| response_message.clone())),
        );
        payload.insert("warnings".into(), json!(validated.warnings));
        Ok(Outcome::Completed(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(workflow: Value, allow_code: Option<bool>) -> EditRequest {
        EditRequest {
            request_id: "r".to_string(),
            workflow_id: "wf".to_string(),
            workflow,
            selected_node_id: None,
            recent_runs: vec![],
            message: "add a step".to_string(),
            conversation_history: vec![],
            allow_code,
            model_override: None,
        }
    }

    #[test]
    fn test_allow_code_follows_current_workflow() {
        let with_code = json!({"nodes": [{"id": "c", "type": "code"}]});
        let without = json!({"nodes": [{"id": "p", "type": "prompt"}]});

        assert!(request(with_code.clone(), None).effective_allow_code());
        assert!(!request(without.clone(), None).effective_allow_code());
        assert!(request(without, Some(true)).effective_allow_code());
        assert!(!request(with_code, Some(false)).effective_allow_code());
    }

    #[test]
    fn test_request_parses_camel_case() {
        let parsed: EditRequest = serde_json::from_value(json!({
            "requestId": "r1",
            "workflowId": "wf_1",
            "workflow": {"id": "wf_1"},
            "selectedNodeId": "p1",
            "message": "why does this loop?",
            "conversationHistory": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(parsed.selected_node_id.as_deref(), Some("p1"));
        assert_eq!(parsed.conversation_history.len(), 1);
        assert!(parsed.recent_runs.is_empty());
    }
}
