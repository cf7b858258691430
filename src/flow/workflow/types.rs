// SPDX-License-Identifier: MIT

//! Workflow type definitions
//!
//! These are the on-disk shapes: one `WorkflowDefinition` per JSON file,
//! camelCase field names, node payloads tagged by `type`.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The only definition version this engine understands
pub const WORKFLOW_VERSION: u32 = 1;

/// Routing handle of a condition node's true branch
pub const HANDLE_TRUE: &str = "true";
/// Routing handle of a condition node's false branch
pub const HANDLE_FALSE: &str = "false";

/// A complete workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Always 1
    pub version: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Always an empty object
    #[serde(default)]
    pub settings: WorkflowSettings,
    /// ISO-8601 creation time
    pub created: String,
    /// ISO-8601 time of the last change
    pub updated: String,
}

/// Reserved for future use; carries no fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowSettings {}

/// Canvas coordinates of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// The four kinds of node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Prompt,
    Code,
    Condition,
    File,
}

impl NodeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prompt" => Some(NodeKind::Prompt),
            "code" => Some(NodeKind::Code),
            "condition" => Some(NodeKind::Condition),
            "file" => Some(NodeKind::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Prompt => "prompt",
            NodeKind::Code => "code",
            NodeKind::Condition => "condition",
            NodeKind::File => "file",
        }
    }

    /// Label used when a node has none
    pub fn default_label(&self) -> &'static str {
        match self {
            NodeKind::Prompt => "Prompt",
            NodeKind::Code => "Code",
            NodeKind::Condition => "Condition",
            NodeKind::File => "File",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub id: String,
    /// Must equal `data.type`
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub position: Position,
    pub data: NodeData,
}

impl Node {
    pub fn label(&self) -> &str {
        self.data.label()
    }
}

/// Per-kind payload, tagged with the same `type` as the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeData {
    Prompt(PromptData),
    Code(CodeData),
    Condition(ConditionData),
    File(FileData),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Prompt(_) => NodeKind::Prompt,
            NodeData::Code(_) => NodeKind::Code,
            NodeData::Condition(_) => NodeKind::Condition,
            NodeData::File(_) => NodeKind::File,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeData::Prompt(d) => &d.label,
            NodeData::Code(d) => &d.label,
            NodeData::Condition(d) => &d.label,
            NodeData::File(d) => &d.label,
        }
    }
}

/// Sends a prompt to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptData {
    pub label: String,
    /// May start with an `@agentId` mention
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<bool>,
    /// JSON Schema text; required when `structuredOutput` is true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
}

impl PromptData {
    pub fn wants_structured_output(&self) -> bool {
        self.structured_output.unwrap_or(false)
    }
}

/// Runs a JavaScript snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CodeData {
    pub label: String,
    pub code: String,
}

/// Routes on a boolean expression and guards loops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    pub label: String,
    pub expression: String,
    pub max_cycles: u32,
}

/// Reads or writes a vault file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub label: String,
    /// Relative to the vault root
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<f64>,
}

/// A directed dependency between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WorkflowDefinition {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges leaving `id`, in definition order
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Edges entering `id`, in definition order
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Nodes with zero incoming edges, in definition order
    pub fn entry_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.target == n.id))
            .collect()
    }

    pub fn has_code_nodes(&self) -> bool {
        self.nodes.iter().any(|n| n.kind == NodeKind::Code)
    }
}

/// Current time in the format used for `created`/`updated`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Lifecycle of a single node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Outcome of one node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub node_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_count: Option<u32>,
}

impl StepResult {
    pub fn pending(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: StepStatus::Pending,
            input: None,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
            cycle_count: None,
        }
    }
}

/// Overall state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// All step results of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    /// One entry per node, in definition order, holding its latest result
    pub steps: Vec<StepResult>,
    pub total_cycles: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl WorkflowRun {
    pub fn step(&self, node_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.node_id == node_id)
    }
}

/// Run-scoped state owned by the executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Last output of each node
    pub step_outputs: HashMap<String, Value>,
    /// Times each node ran in this run
    pub visit_counts: HashMap<String, u32>,
    /// Back edges traversed in this run
    pub total_cycles: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_data_tag_matches_type() {
        let node: Node = serde_json::from_value(json!({
            "id": "p1",
            "type": "prompt",
            "position": {"x": 0, "y": 0},
            "data": {"type": "prompt", "label": "Step", "prompt": "Hello"}
        }))
        .unwrap();

        assert_eq!(node.kind, NodeKind::Prompt);
        assert_eq!(node.data.kind(), NodeKind::Prompt);
        assert_eq!(node.label(), "Step");
    }

    #[test]
    fn test_definition_round_trips_camel_case() {
        let def = WorkflowDefinition {
            id: "wf".to_string(),
            name: "Test".to_string(),
            description: None,
            version: WORKFLOW_VERSION,
            nodes: vec![Node {
                id: "c".to_string(),
                kind: NodeKind::Condition,
                position: Position::new(1.0, 2.0),
                data: NodeData::Condition(ConditionData {
                    label: "Loop".to_string(),
                    expression: "iteration < 3".to_string(),
                    max_cycles: 3,
                }),
            }],
            edges: vec![],
            settings: WorkflowSettings::default(),
            created: "2024-01-01T00:00:00.000Z".to_string(),
            updated: "2024-01-01T00:00:00.000Z".to_string(),
        };

        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["settings"], json!({}));
        assert_eq!(value["nodes"][0]["data"]["maxCycles"], 3);
        assert_eq!(value["nodes"][0]["data"]["type"], "condition");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_entry_nodes() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "id": "wf", "name": "n", "version": 1, "settings": {},
            "created": "t", "updated": "t",
            "nodes": [
                {"id": "a", "type": "code", "position": {"x": 0, "y": 0},
                 "data": {"type": "code", "label": "A", "code": "return 1"}},
                {"id": "b", "type": "code", "position": {"x": 0, "y": 0},
                 "data": {"type": "code", "label": "B", "code": "return 2"}}
            ],
            "edges": [{"id": "e1", "source": "a", "target": "b"}]
        }))
        .unwrap();

        let entries: Vec<&str> = def.entry_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(entries, vec!["a"]);
        assert_eq!(def.outgoing("a").count(), 1);
        assert_eq!(def.incoming("a").count(), 0);
        assert!(def.has_code_nodes());
    }
}
