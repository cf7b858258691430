// SPDX-License-Identifier: MIT

//! Command execution - the collaborator that runs a prompt for an agent
//!
//! Prompt nodes and chat messages do not talk to a model directly. They hand
//! a structured `CommandRequest` to a `CommandExecutor`, which resolves the
//! agent and produces the reply text. `ModelCommandExecutor` is the
//! in-process implementation backed by a plain `Model`.

use crate::adk::error::ProviderError;
use crate::adk::model::{CompletionRequest, Model};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Output of another step made available to the current one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamOutput {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub output: Value,
}

/// File content captured from a file node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub node_id: String,
    pub path: String,
    pub content: String,
}

/// One turn of a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Everything the step can see besides its own task
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandInput {
    /// The single most recent upstream output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<Value>,
    /// Other upstream outputs available in the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<UpstreamOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatTurn>,
}

/// Structured request handed to the command-execution collaborator
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_description: Option<String>,
    pub input: CommandInput,
    pub task: String,
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Reply from the collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    pub content: String,
}

/// Core trait for command execution
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, request: CommandRequest) -> Result<CommandResponse, ProviderError>;
}

/// Command executor that renders the request into a single prompt
pub struct ModelCommandExecutor {
    model: Arc<dyn Model>,
    instruction: String,
}

impl ModelCommandExecutor {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            instruction: "You are a helpful assistant running one step of an automation workflow."
                .to_string(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Render a request as prompt text
    pub fn render(&self, request: &CommandRequest) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.instruction);
        prompt.push_str("\n\n");

        if let Some(agent) = &request.agent_id {
            prompt.push_str(&format!("Act as the agent \"{}\".\n\n", agent));
        }
        if let Some(label) = &request.step_label {
            prompt.push_str(&format!("## Step\n{}\n", label));
            if let Some(description) = &request.step_description {
                prompt.push_str(description);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        if !request.input.history.is_empty() {
            prompt.push_str("## Conversation so far\n");
            for turn in &request.input.history {
                prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
            }
            prompt.push('\n');
        }

        if let Some(primary) = &request.input.primary {
            prompt.push_str("## Input\n");
            prompt.push_str(&value_to_text(primary));
            prompt.push_str("\n\n");
        }

        if !request.input.context.is_empty() {
            prompt.push_str("## Other available results\n");
            for item in &request.input.context {
                let name = item.label.as_deref().unwrap_or(&item.node_id);
                prompt.push_str(&format!("### {}\n{}\n", name, value_to_text(&item.output)));
            }
            prompt.push('\n');
        }

        for attachment in &request.input.attachments {
            prompt.push_str(&format!(
                "## Attached file: {}\n```\n{}\n```\n\n",
                attachment.path, attachment.content
            ));
        }

        prompt.push_str("## Task\n");
        prompt.push_str(&request.task);
        prompt.push('\n');

        if request.structured_output {
            prompt.push_str("\nRespond with JSON only, no prose.");
            if let Some(schema) = &request.output_schema {
                prompt.push_str(" The JSON must match this schema:\n");
                prompt.push_str(&serde_json::to_string_pretty(schema).unwrap_or_default());
            }
            prompt.push('\n');
        }

        prompt
    }
}

/// Strings are used verbatim, everything else as compact JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl CommandExecutor for ModelCommandExecutor {
    async fn execute(&self, request: CommandRequest) -> Result<CommandResponse, ProviderError> {
        let prompt = self.render(&request);
        log::info!(
            "Executing command for agent {:?} (node {:?})",
            request.agent_id,
            request.node_id
        );
        let completion = self.model.complete(CompletionRequest::new(prompt)).await?;
        Ok(CommandResponse {
            content: completion.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::Completion;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoModel {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Model for EchoModel {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
            self.seen.lock().unwrap().push(request.prompt.clone());
            Ok(Completion {
                content: "ok".to_string(),
            })
        }
    }

    #[test]
    fn test_render_sections() {
        let executor = ModelCommandExecutor::new(Arc::new(EchoModel {
            seen: Mutex::new(vec![]),
        }));
        let request = CommandRequest {
            agent_id: Some("writer".to_string()),
            step_label: Some("Summarise".to_string()),
            input: CommandInput {
                primary: Some(json!("the text")),
                context: vec![UpstreamOutput {
                    node_id: "n1".to_string(),
                    label: Some("Fetch".to_string()),
                    output: json!({"a": 1}),
                }],
                attachments: vec![Attachment {
                    node_id: "f1".to_string(),
                    path: "notes/a.md".to_string(),
                    content: "file body".to_string(),
                }],
                history: vec![],
            },
            task: "Summarise it".to_string(),
            structured_output: true,
            output_schema: Some(json!({"type": "object"})),
            ..Default::default()
        };

        let prompt = executor.render(&request);
        assert!(prompt.contains("Act as the agent \"writer\""));
        assert!(prompt.contains("## Input\nthe text"));
        assert!(prompt.contains("### Fetch\n{\"a\":1}"));
        assert!(prompt.contains("## Attached file: notes/a.md"));
        assert!(prompt.contains("## Task\nSummarise it"));
        assert!(prompt.contains("Respond with JSON only"));
    }

    #[tokio::test]
    async fn test_execute_calls_model() {
        let model = Arc::new(EchoModel {
            seen: Mutex::new(vec![]),
        });
        let executor = ModelCommandExecutor::new(model.clone());
        let response = executor
            .execute(CommandRequest {
                task: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.content, "ok");
        assert!(model.seen.lock().unwrap()[0].contains("## Task\nhello"));
    }
}
