// SPDX-License-Identifier: MIT

//! Run-scoped state and the views nodes get of it

use crate::adk::command::{Attachment, UpstreamOutput};
use crate::flow::workflow::{ExecutionContext, NodeKind, WorkflowDefinition};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// Nodes reachable from `start` along edges, `start` excluded unless it
/// lies on a cycle
pub fn reachable_from(def: &WorkflowDefinition, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = def.outgoing(start).map(|e| e.target.as_str()).collect();
    while let Some(id) = queue.pop_front() {
        if seen.insert(id.to_string()) {
            queue.extend(def.outgoing(id).map(|e| e.target.as_str()));
        }
    }
    seen
}

/// An [`ExecutionContext`] plus the file attachments registered so far
#[derive(Debug)]
pub struct RunContext {
    pub ctx: ExecutionContext,
    attachments: Vec<Attachment>,
    /// File node id -> nodes its attachment reaches
    reach: HashMap<String, HashSet<String>>,
}

impl RunContext {
    pub fn new(def: &WorkflowDefinition, run_id: impl Into<String>, input: Option<Value>) -> Self {
        let reach = def
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::File)
            .map(|n| (n.id.clone(), reachable_from(def, &n.id)))
            .collect();

        Self {
            ctx: ExecutionContext {
                workflow_id: def.id.clone(),
                run_id: run_id.into(),
                input,
                ..Default::default()
            },
            attachments: Vec::new(),
            reach,
        }
    }

    /// Count a visit and return the 1-based iteration
    pub fn visit(&mut self, node_id: &str) -> u32 {
        let count = self.ctx.visit_counts.entry(node_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_output(&mut self, node_id: &str, output: Value) {
        self.ctx.step_outputs.insert(node_id.to_string(), output);
    }

    pub fn record_cycle(&mut self) {
        self.ctx.total_cycles += 1;
    }

    /// Register file content; a later registration by the same node replaces it
    pub fn register_attachment(&mut self, attachment: Attachment) {
        self.attachments.retain(|a| a.node_id != attachment.node_id);
        self.attachments.push(attachment);
    }

    /// Attachments from file nodes that reach `node_id`
    pub fn attachments_for(&self, node_id: &str) -> Vec<Attachment> {
        self.attachments
            .iter()
            .filter(|a| {
                self.reach
                    .get(&a.node_id)
                    .is_some_and(|reached| reached.contains(node_id))
            })
            .cloned()
            .collect()
    }

    /// Outputs of other non-file steps, in definition order
    pub fn upstream_context(
        &self,
        def: &WorkflowDefinition,
        node_id: &str,
        primary_from: Option<&str>,
    ) -> Vec<UpstreamOutput> {
        def.nodes
            .iter()
            .filter(|n| n.kind != NodeKind::File)
            .filter(|n| n.id != node_id && Some(n.id.as_str()) != primary_from)
            .filter_map(|n| {
                self.ctx.step_outputs.get(&n.id).map(|output| UpstreamOutput {
                    node_id: n.id.clone(),
                    label: Some(n.label().to_string()),
                    output: output.clone(),
                })
            })
            .collect()
    }

    /// Variables a condition expression can reference
    pub fn condition_scope(&self, input: &Value, iteration: u32, max_cycles: u32, node_id: &str) -> Value {
        json!({
            "input": input,
            "output": input,
            "iteration": iteration,
            "maxCycles": max_cycles,
            "attachments": self.attachments_for(node_id),
        })
    }

    /// The `context` object handed to code nodes
    pub fn code_context(&self) -> Value {
        json!({
            "workflowId": self.ctx.workflow_id,
            "runId": self.ctx.run_id,
            "totalCycles": self.ctx.total_cycles,
            "stepOutputs": self.ctx.step_outputs,
        })
    }

    pub fn into_context(self) -> ExecutionContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> WorkflowDefinition {
        serde_json::from_value(json!({
            "id": "wf", "name": "W", "version": 1,
            "nodes": [
                {"id": "f", "type": "file", "position": {"x": 0, "y": 0},
                 "data": {"type": "file", "label": "Notes", "path": "notes.md"}},
                {"id": "a", "type": "prompt", "position": {"x": 0, "y": 0},
                 "data": {"type": "prompt", "label": "A", "prompt": "a"}},
                {"id": "b", "type": "prompt", "position": {"x": 0, "y": 0},
                 "data": {"type": "prompt", "label": "B", "prompt": "b"}},
                {"id": "c", "type": "prompt", "position": {"x": 0, "y": 0},
                 "data": {"type": "prompt", "label": "C", "prompt": "c"}}
            ],
            "edges": [
                {"id": "e1", "source": "f", "target": "b"},
                {"id": "e2", "source": "a", "target": "b"},
                {"id": "e3", "source": "b", "target": "c"}
            ],
            "settings": {}, "created": "t", "updated": "t"
        }))
        .unwrap()
    }

    #[test]
    fn test_reachable_from() {
        let def = def();
        let reached = reachable_from(&def, "f");
        assert!(reached.contains("b") && reached.contains("c"));
        assert!(!reached.contains("a") && !reached.contains("f"));
    }

    #[test]
    fn test_attachments_follow_reachability() {
        let def = def();
        let mut run = RunContext::new(&def, "run", None);
        run.register_attachment(Attachment {
            node_id: "f".to_string(),
            path: "notes.md".to_string(),
            content: "hello".to_string(),
        });

        assert_eq!(run.attachments_for("c").len(), 1);
        assert!(run.attachments_for("a").is_empty());
    }

    #[test]
    fn test_visits_and_context() {
        let def = def();
        let mut run = RunContext::new(&def, "run", Some(json!("go")));
        assert_eq!(run.visit("a"), 1);
        assert_eq!(run.visit("a"), 2);

        run.record_output("f", json!("file text"));
        run.record_output("a", json!("from a"));
        run.record_output("b", json!("from b"));

        let context = run.upstream_context(&def, "c", Some("b"));
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].node_id, "a");
        assert_eq!(context[0].label.as_deref(), Some("A"));

        let code = run.code_context();
        assert_eq!(code["workflowId"], "wf");
        assert_eq!(code["stepOutputs"]["a"], "from a");
    }

    #[test]
    fn test_condition_scope() {
        let def = def();
        let run = RunContext::new(&def, "run", None);
        let scope = run.condition_scope(&json!({"score": 3}), 2, 5, "b");
        assert_eq!(scope["output"]["score"], 3);
        assert_eq!(scope["iteration"], 2);
        assert_eq!(scope["maxCycles"], 5);
        assert_eq!(scope["attachments"], json!([]));
    }
}
