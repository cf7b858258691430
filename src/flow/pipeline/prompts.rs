// SPDX-License-Identifier: MIT

//! Prompt text for the generation, edit and repair calls

use super::edit::EditRequest;
use super::generate::GenerationRequest;
use crate::flow::workflow::validator::bullet_list;
use crate::flow::workflow::WorkflowDefinition;
use once_cell::sync::Lazy;
use schemars::schema_for;

/// Longest slice of run history included in an edit prompt
const MAX_RUNS_CHARS: usize = 4000;

/// JSON Schema of a workflow definition, rendered once
static WORKFLOW_SCHEMA: Lazy<String> = Lazy::new(|| {
    serde_json::to_string_pretty(&schema_for!(WorkflowDefinition)).unwrap_or_default()
});

pub fn workflow_schema() -> &'static str {
    &WORKFLOW_SCHEMA
}

fn node_guide(allow_code: bool) -> String {
    let mut guide = String::from(
        "Node types:\n\
         - prompt: sends `data.prompt` to an AI agent. Start the prompt with `@agentId` to pick an agent. \
         Set `structuredOutput: true` and `outputSchema` (a JSON Schema as a string) to get JSON back.\n\
         - condition: `data.expression` is a boolean expression over `input`, `output`, `iteration`, \
         `maxCycles` and `attachments`, e.g. `input.score > 0.8` or `iteration < maxCycles`. \
         It needs exactly two outgoing edges, one with sourceHandle \"true\" and one with \"false\". \
         `data.maxCycles` caps how often a loop through it may repeat.\n\
         - file: `data.path` is a path relative to the vault. With no incoming edges it is read and \
         attached to downstream steps; with incoming edges the upstream output is written to it.\n",
    );
    if allow_code {
        guide.push_str(
            "- code: `data.code` is the body of an async JavaScript function with `input`, \
             `attachments` and `context` in scope. Use `return` to produce the output. \
             There is no network access and no timers.\n",
        );
    } else {
        guide.push_str("Code nodes are not available; do not use the `code` type.\n");
    }
    guide
}

const RULES: &str = "Rules:\n\
- `version` is always 1 and `settings` is always {}.\n\
- Every node needs a unique `id`, a `type`, a `position` {x, y} and a `data` object whose `type` equals the node type and which has a `label`.\n\
- Every edge needs `id`, `source` and `target` naming existing nodes.\n\
- At least one node must have no incoming edges; that is where the run starts.\n\
- Loops are allowed only through a condition node.\n";

/// Prompt for turning a description into a new workflow
pub fn generation_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::from(
        "You design automation workflows for a note-taking vault. \
         Build a workflow graph that does what the user describes.\n\n",
    );
    prompt.push_str(&node_guide(request.allow_code));
    prompt.push('\n');
    prompt.push_str(RULES);
    prompt.push_str("\nThe workflow must match this JSON Schema:\n");
    prompt.push_str(workflow_schema());
    prompt.push_str("\n\n## Request\n");
    prompt.push_str(&request.prompt);
    prompt.push('\n');

    if !request.clarifications.is_empty() {
        prompt.push_str("\n## Clarifications\n");
        for c in &request.clarifications {
            prompt.push_str(&format!("Q: {}\nA: {}\n", c.question, c.answer));
        }
    }

    prompt.push_str(
        "\nReply with the workflow JSON object only. If the request is too vague to build, reply with \
         {\"status\": \"needs_clarification\", \"questions\": [\"...\"]} instead.\n",
    );
    prompt
}

/// Prompt for changing or discussing an existing workflow
pub fn edit_prompt(request: &EditRequest, allow_code: bool) -> String {
    let mut prompt = String::from(
        "You help the user change an automation workflow through conversation. \
         You may change the graph, or just answer a question about it.\n\n",
    );
    prompt.push_str(&node_guide(allow_code));
    prompt.push('\n');
    prompt.push_str(RULES);

    prompt.push_str("\n## Current workflow\n");
    prompt.push_str(&serde_json::to_string_pretty(&request.workflow).unwrap_or_default());
    prompt.push('\n');

    if let Some(selected) = &request.selected_node_id {
        prompt.push_str(&format!("\nThe user has node '{}' selected.\n", selected));
    }

    if !request.recent_runs.is_empty() {
        let runs = serde_json::to_string(&request.recent_runs).unwrap_or_default();
        let runs: String = runs.chars().take(MAX_RUNS_CHARS).collect();
        prompt.push_str("\n## Recent runs\n");
        prompt.push_str(&runs);
        prompt.push('\n');
    }

    if !request.conversation_history.is_empty() {
        prompt.push_str("\n## Conversation so far\n");
        for turn in &request.conversation_history {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
    }

    prompt.push_str("\n## Message\n");
    prompt.push_str(&request.message);
    prompt.push_str(
        "\n\nReply with JSON only, in this shape:\n\
         {\"status\": \"completed\", \"updatedWorkflow\": { ...the complete workflow... }, \
         \"responseMessage\": \"what you tell the user\", \"changesDescription\": \"short summary of the changes\"}\n\
         Leave out `updatedWorkflow` when the graph does not need to change. \
         Always return the whole workflow, never a partial patch. \
         If you need more information, reply with {\"status\": \"needs_clarification\", \"questions\": [\"...\"]}.\n",
    );
    prompt
}

/// Prompt asking the model to fix its last workflow
pub fn repair_prompt(errors: &[String], last_json: &str, allow_code: bool) -> String {
    let mut prompt = String::from(
        "The workflow you returned is invalid. Fix every problem listed below and reply with the \
         corrected complete workflow JSON object only.\n\n## Problems\n",
    );
    prompt.push_str(&bullet_list(errors));
    prompt.push_str("\n\n");
    prompt.push_str(&node_guide(allow_code));
    prompt.push('\n');
    prompt.push_str(RULES);
    prompt.push_str("\n## Your last workflow\n");
    prompt.push_str(last_json);
    prompt.push('\n');
    prompt
}

/// Prompt for a short conversation title
pub fn title_prompt(message: &str) -> String {
    format!(
        "Write a short title (at most six words) for a conversation that starts with the message \
         below. Reply with the title only, no quotes.\n\n{}",
        message
    )
}
