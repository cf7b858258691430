// SPDX-License-Identifier: MIT

//! Chat pipeline: one message in, one agent reply appended to the thread log

use super::prompts::title_prompt;
use super::queue::{Outcome, QueueHandler, Reporter, ResultMode, Stage};
use super::sanitize::sanitize_provider_error;
use crate::adk::command::{ChatTurn, CommandExecutor, CommandInput, CommandRequest};
use crate::adk::error::EngineError;
use crate::adk::model::{CompletionRequest, Model};
use crate::flow::config::QueueKind;
use crate::flow::runtime::prompt::split_agent_mention;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// How long a finished request id keeps duplicates out
pub const RECENT_WINDOW: Duration = Duration::from_secs(10);

const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub request_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
}

pub struct ChatPipeline {
    executor: Arc<dyn CommandExecutor>,
    model: Arc<dyn Model>,
}

impl ChatPipeline {
    pub fn new(executor: Arc<dyn CommandExecutor>, model: Arc<dyn Model>) -> Self {
        Self { executor, model }
    }

    /// Name the thread in the background; the reply does not wait for it
    fn spawn_title(&self, message: String, thread_id: Option<String>, reporter: Reporter) {
        let model = Arc::clone(&self.model);
        tokio::spawn(async move {
            let title = match model.complete(CompletionRequest::new(title_prompt(&message))).await {
                Ok(completion) => clean_title(&completion.content),
                Err(e) => {
                    log::warn!("[{}] Title generation failed: {}", reporter.request_id(), e);
                    return;
                }
            };
            if title.is_empty() {
                return;
            }

            let mut record = Map::new();
            record.insert("type".into(), json!("title"));
            record.insert("title".into(), json!(title));
            if let Some(thread_id) = thread_id {
                record.insert("threadId".into(), json!(thread_id));
            }
            if let Err(e) = reporter.append(record).await {
                log::warn!("[{}] Failed to record title: {}", reporter.request_id(), e);
            }
        });
    }
}

/// First line, without quotes, capped in length
fn clean_title(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or_default();
    let line = line.trim().trim_matches(|c| c == '"' || c == '\'' || c == '#').trim();
    line.chars().take(MAX_TITLE_CHARS).collect()
}

#[async_trait]
impl QueueHandler for ChatPipeline {
    type Request = ChatRequest;

    fn kind(&self) -> QueueKind {
        QueueKind::Chat
    }

    fn result_mode(&self) -> ResultMode {
        ResultMode::Append
    }

    fn first_stage(&self) -> Stage {
        Stage::Processing
    }

    async fn handle(&self, request: ChatRequest, reporter: &Reporter) -> Result<Outcome, EngineError> {
        if request.message.trim().is_empty() {
            return Err(EngineError::malformed("Chat request has an empty message"));
        }

        if request.conversation_history.is_empty() {
            self.spawn_title(
                request.message.clone(),
                request.thread_id.clone(),
                reporter.clone(),
            );
        }

        let (agent_id, task) = match request.agent_id.clone() {
            Some(agent) => (Some(agent), request.message.clone()),
            None => split_agent_mention(&request.message),
        };

        let command = CommandRequest {
            agent_id: agent_id.clone(),
            input: CommandInput {
                history: request.conversation_history.clone(),
                ..Default::default()
            },
            task,
            ..Default::default()
        };

        match self.executor.execute(command).await {
            Ok(response) => {
                let mut payload = Map::new();
                payload.insert("response".into(), Value::String(response.content));
                if let Some(thread_id) = request.thread_id {
                    payload.insert("threadId".into(), json!(thread_id));
                }
                if let Some(agent_id) = agent_id {
                    payload.insert("agentId".into(), json!(agent_id));
                }
                Ok(Outcome::Completed(payload))
            }
            Err(e) => {
                log::warn!("[{}] Command failed: {}", request.request_id, e);
                Ok(Outcome::Failed(sanitize_provider_error(&e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("\"Weekly planning\"\nextra"), "Weekly planning");
        assert_eq!(clean_title("  # Inbox triage  "), "Inbox triage");
        assert_eq!(clean_title(""), "");
        assert_eq!(clean_title(&"x".repeat(200)).len(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_request_defaults() {
        let request: ChatRequest = serde_json::from_value(json!({
            "requestId": "c1",
            "message": "@writer draft it"
        }))
        .unwrap();
        assert!(request.thread_id.is_none());
        assert!(request.agent_id.is_none());
        assert!(request.conversation_history.is_empty());
    }
}
