// SPDX-License-Identifier: MIT

//! Prompt runner: hands a step to the command-execution collaborator

use super::ExecutionError;
use crate::adk::command::{Attachment, CommandExecutor, CommandInput, CommandRequest, UpstreamOutput};
use crate::adk::json::extract_json;
use crate::flow::workflow::{ExecutionContext, PromptData};
use serde_json::Value;

fn is_agent_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Split a leading `@agentId` off `text`
///
/// Returns the agent id, if any, and the remaining text. A bare `@` or an
/// address-like `@` in the middle of the text is left alone.
pub fn split_agent_mention(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('@') else {
        return (None, text.to_string());
    };

    let end = rest.find(|c: char| !is_agent_char(c)).unwrap_or(rest.len());
    let (agent, remainder) = rest.split_at(end);
    let agent = agent.trim_end_matches('.');
    let boundary = remainder.chars().next().map_or(true, char::is_whitespace);
    if agent.is_empty() || !boundary {
        return (None, text.to_string());
    }

    (Some(agent.to_string()), remainder.trim_start().to_string())
}

/// Everything a prompt step sees
pub struct PromptInvocation<'a> {
    pub node_id: &'a str,
    pub data: &'a PromptData,
    pub primary: Option<Value>,
    pub context: Vec<UpstreamOutput>,
    pub attachments: Vec<Attachment>,
}

pub async fn run_prompt(
    executor: &dyn CommandExecutor,
    ctx: &ExecutionContext,
    invocation: PromptInvocation<'_>,
) -> Result<Value, ExecutionError> {
    let PromptInvocation {
        node_id,
        data,
        primary,
        context,
        attachments,
    } = invocation;
    let (agent_id, task) = split_agent_mention(&data.prompt);
    let structured = data.wants_structured_output();

    let request = CommandRequest {
        agent_id,
        workflow_id: Some(ctx.workflow_id.clone()),
        run_id: Some(ctx.run_id.clone()),
        node_id: Some(node_id.to_string()),
        step_label: Some(data.label.clone()),
        step_description: None,
        input: CommandInput {
            primary,
            context,
            attachments,
            history: Vec::new(),
        },
        task,
        structured_output: structured,
        output_schema: data
            .output_schema
            .as_deref()
            .and_then(|schema| serde_json::from_str(schema).ok()),
    };

    let response = executor
        .execute(request)
        .await
        .map_err(|source| ExecutionError::Command {
            node_id: node_id.to_string(),
            source,
        })?;

    if !structured {
        return Ok(Value::String(response.content));
    }
    match extract_json(&response.content) {
        Ok(value) => Ok(value),
        Err(e) => {
            log::warn!(
                "[{}] Structured reply is not JSON ({}); keeping the raw text",
                node_id,
                e
            );
            Ok(Value::String(response.content))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::command::CommandResponse;
    use crate::adk::error::ProviderError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_split_agent_mention() {
        assert_eq!(
            split_agent_mention("@writer Draft a reply"),
            (Some("writer".to_string()), "Draft a reply".to_string())
        );
        assert_eq!(
            split_agent_mention("  @research-bot.v2\nFind sources"),
            (Some("research-bot.v2".to_string()), "Find sources".to_string())
        );
        assert_eq!(split_agent_mention("@solo"), (Some("solo".to_string()), String::new()));
    }

    #[test]
    fn test_no_mention_keeps_text() {
        assert_eq!(split_agent_mention("Mail me at a@b.c"), (None, "Mail me at a@b.c".to_string()));
        assert_eq!(split_agent_mention("@ nobody"), (None, "@ nobody".to_string()));
        assert_eq!(split_agent_mention("@bad!id go"), (None, "@bad!id go".to_string()));
    }

    struct FixedExecutor {
        reply: String,
        seen: Mutex<Vec<CommandRequest>>,
    }

    #[async_trait]
    impl CommandExecutor for FixedExecutor {
        async fn execute(&self, request: CommandRequest) -> Result<CommandResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            Ok(CommandResponse {
                content: self.reply.clone(),
            })
        }
    }

    fn data(structured: bool) -> PromptData {
        PromptData {
            label: "Score".to_string(),
            prompt: "@judge Rate this".to_string(),
            structured_output: Some(structured),
            output_schema: structured.then(|| r#"{"type": "object"}"#.to_string()),
        }
    }

    fn invocation(data: &PromptData) -> PromptInvocation<'_> {
        PromptInvocation {
            node_id: "p1",
            data,
            primary: Some(json!("essay")),
            context: vec![],
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn test_structured_reply_is_parsed() {
        let executor = FixedExecutor {
            reply: "Sure:\n```json\n{\"score\": 0.9}\n```".to_string(),
            seen: Mutex::new(vec![]),
        };
        let data = data(true);
        let output = run_prompt(&executor, &ExecutionContext::default(), invocation(&data))
            .await
            .unwrap();

        assert_eq!(output, json!({"score": 0.9}));
        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen[0].agent_id.as_deref(), Some("judge"));
        assert_eq!(seen[0].task, "Rate this");
        assert_eq!(seen[0].output_schema, Some(json!({"type": "object"})));
        assert_eq!(seen[0].input.primary, Some(json!("essay")));
    }

    #[tokio::test]
    async fn test_unparseable_structured_reply_falls_back_to_text() {
        let executor = FixedExecutor {
            reply: "no json here".to_string(),
            seen: Mutex::new(vec![]),
        };
        let data = data(true);
        let output = run_prompt(&executor, &ExecutionContext::default(), invocation(&data))
            .await
            .unwrap();
        assert_eq!(output, json!("no json here"));
    }

    #[tokio::test]
    async fn test_plain_reply_is_text() {
        let executor = FixedExecutor {
            reply: "{\"looks\": \"like json\"}".to_string(),
            seen: Mutex::new(vec![]),
        };
        let data = data(false);
        let output = run_prompt(&executor, &ExecutionContext::default(), invocation(&data))
            .await
            .unwrap();
        assert_eq!(output, json!("{\"looks\": \"like json\"}"));
    }
}
