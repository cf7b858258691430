// SPDX-License-Identifier: MIT

//! Structural validation and normalisation of untrusted workflow JSON
//!
//! Hand-authored files and model replies both go through
//! [`validate_workflow`]. Cosmetic defects are repaired in place and reported
//! as warnings; structural defects are collected into a single error list so
//! the whole list can be handed back to a repairer in one round.

use super::condition;
use super::types::{NodeKind, WorkflowDefinition, HANDLE_FALSE, HANDLE_TRUE, WORKFLOW_VERSION};
use super::types::now_timestamp;
use crate::adk::error::WorkflowError;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Caller-controlled validation switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Whether code nodes may appear in the graph
    pub allow_code: bool,
}

impl ValidationOptions {
    pub fn allow_code(allow_code: bool) -> Self {
        Self { allow_code }
    }
}

/// A definition that passed validation, plus what was repaired on the way
#[derive(Debug, Clone)]
pub struct Validated {
    pub workflow: WorkflowDefinition,
    pub warnings: Vec<String>,
}

/// Every structural problem found in one validation pass
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}", bullet_list(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<String>,
}

impl From<ValidationErrors> for WorkflowError {
    fn from(e: ValidationErrors) -> Self {
        WorkflowError::Invalid(e.errors)
    }
}

/// Render errors as `- error` lines
pub fn bullet_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `id` can be used as a workflow file name
pub fn is_valid_workflow_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Whether `path` stays inside the vault when joined to its root
pub fn is_vault_relative(path: &str) -> bool {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return false;
    }
    // Windows drive letters
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return false;
    }
    !trimmed.split(['/', '\\']).any(|segment| segment == "..")
}

/// Validate and normalise a workflow
///
/// Well-formed input comes back unchanged with no warnings.
pub fn validate_workflow(
    value: &Value,
    options: ValidationOptions,
) -> Result<Validated, ValidationErrors> {
    let Some(root) = value.as_object() else {
        return Err(ValidationErrors {
            errors: vec!["Workflow must be a JSON object".to_string()],
        });
    };

    let mut checker = Checker::new(options);
    let mut root = root.clone();

    checker.check_header(&mut root);
    let kinds = checker.check_nodes(&mut root);
    checker.check_edges(&mut root);
    checker.check_graph(&root, &kinds);

    if !checker.errors.is_empty() {
        return Err(ValidationErrors {
            errors: checker.errors,
        });
    }

    match serde_json::from_value::<WorkflowDefinition>(Value::Object(root)) {
        Ok(workflow) => Ok(Validated {
            workflow,
            warnings: checker.warnings,
        }),
        Err(e) => Err(ValidationErrors {
            errors: vec![format!("Workflow does not match the definition format: {}", e)],
        }),
    }
}

struct Checker {
    options: ValidationOptions,
    errors: Vec<String>,
    warnings: Vec<String>,
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn unique_id(base: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut n = 2;
    while taken.contains(&candidate) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

impl Checker {
    fn new(options: ValidationOptions) -> Self {
        Self {
            options,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn check_header(&mut self, root: &mut Map<String, Value>) {
        let current = root.get("id").and_then(Value::as_str).map(str::to_string);
        match current.as_deref() {
            Some(id) if is_valid_workflow_id(id) => {}
            Some(id) if !id.trim().is_empty() => {
                let fresh = format!("wf_{}", uuid::Uuid::new_v4().simple());
                self.warn(format!(
                    "Workflow id '{}' is not usable as a file name; replaced with '{}'",
                    id, fresh
                ));
                root.insert("id".into(), Value::String(fresh));
            }
            _ => {
                let fresh = format!("wf_{}", uuid::Uuid::new_v4().simple());
                self.warn(format!("Workflow id was missing; generated '{}'", fresh));
                root.insert("id".into(), Value::String(fresh));
            }
        }

        if non_empty_str(root.get("name")).is_none() {
            self.warn("Workflow name was missing; using 'Untitled workflow'");
            root.insert("name".into(), Value::String("Untitled workflow".into()));
        }

        match root.get("description") {
            None | Some(Value::String(_)) => {}
            Some(Value::Null) => {
                root.remove("description");
            }
            Some(other) => {
                self.warn(format!(
                    "Workflow description was {}, not a string; dropped",
                    describe(other)
                ));
                root.remove("description");
            }
        }

        match root.get("version") {
            Some(v) if v.as_u64() == Some(WORKFLOW_VERSION as u64) => {}
            Some(v) if v.as_f64() == Some(WORKFLOW_VERSION as f64) => {
                root.insert("version".into(), Value::from(WORKFLOW_VERSION));
            }
            Some(v) => self.error(format!(
                "Workflow version must be {} (found {})",
                WORKFLOW_VERSION, v
            )),
            None => self.error(format!(
                "Workflow version is missing; it must be {}",
                WORKFLOW_VERSION
            )),
        }

        match root.get("settings") {
            Some(Value::Object(map)) if map.is_empty() => {}
            None => {
                root.insert("settings".into(), Value::Object(Map::new()));
            }
            Some(_) => {
                self.warn("Workflow settings must be empty; cleared");
                root.insert("settings".into(), Value::Object(Map::new()));
            }
        }

        for field in ["created", "updated"] {
            if non_empty_str(root.get(field)).is_none() {
                self.warn(format!("Workflow '{}' timestamp was missing; set to now", field));
                root.insert(field.into(), Value::String(now_timestamp()));
            }
        }
    }

    /// Returns the kind of every node that has a usable id
    fn check_nodes(&mut self, root: &mut Map<String, Value>) -> HashMap<String, NodeKind> {
        let mut kinds = HashMap::new();

        let nodes = match root.get_mut("nodes") {
            Some(Value::Array(nodes)) => nodes,
            Some(other) => {
                let found = describe(other);
                self.error(format!("Workflow 'nodes' must be an array (found {})", found));
                return kinds;
            }
            None => {
                self.error("Workflow 'nodes' array is missing");
                return kinds;
            }
        };

        // Ids the author chose, so generated ids never collide with later nodes
        let mut taken: HashSet<String> = nodes
            .iter()
            .filter_map(|n| non_empty_str(n.get("id")))
            .map(str::to_string)
            .collect();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, node) in nodes.iter_mut().enumerate() {
            let Some(node) = node.as_object_mut() else {
                self.error(format!("nodes[{}]: node must be an object", index));
                continue;
            };

            let kind = match node.get("type").and_then(Value::as_str) {
                Some(t) => NodeKind::parse(t),
                None => None,
            };

            let id = match non_empty_str(node.get("id")) {
                Some(id) => id.to_string(),
                None => {
                    let prefix = kind.map(|k| k.as_str()).unwrap_or("node");
                    let fresh = unique_id(format!("{}_{}", prefix, index + 1), &mut taken);
                    self.warn(format!("nodes[{}]: id was missing; generated '{}'", index, fresh));
                    node.insert("id".into(), Value::String(fresh.clone()));
                    fresh
                }
            };

            if !seen.insert(id.clone()) {
                self.error(format!("Node '{}': duplicate node id", id));
                continue;
            }

            let Some(kind) = kind else {
                let found = node.get("type").cloned().unwrap_or(Value::Null);
                self.error(format!(
                    "Node '{}': unknown node type {} (expected prompt, code, condition or file)",
                    id, found
                ));
                continue;
            };
            kinds.insert(id.clone(), kind);

            self.check_position(&id, node);
            self.check_data(&id, kind, node);
        }

        kinds
    }

    fn check_position(&mut self, id: &str, node: &mut Map<String, Value>) {
        let valid = node
            .get("position")
            .and_then(Value::as_object)
            .map(|p| {
                ["x", "y"].iter().all(|axis| {
                    p.get(*axis)
                        .and_then(Value::as_f64)
                        .is_some_and(f64::is_finite)
                })
            })
            .unwrap_or(false);

        if !valid {
            self.warn(format!(
                "Node '{}': position was missing or not numeric; reset to (0, 0)",
                id
            ));
            node.insert("position".into(), serde_json::json!({"x": 0, "y": 0}));
        }
    }

    fn check_data(&mut self, id: &str, kind: NodeKind, node: &mut Map<String, Value>) {
        let Some(data) = node.get_mut("data").and_then(Value::as_object_mut) else {
            self.error(format!("Node '{}': 'data' must be an object", id));
            return;
        };

        match data.get("type").and_then(Value::as_str) {
            Some(t) if t == kind.as_str() => {}
            Some(t) => {
                self.error(format!(
                    "Node '{}': data.type '{}' does not match node type '{}'",
                    id, t, kind
                ));
                return;
            }
            None => {
                self.warn(format!("Node '{}': data.type was missing; set to '{}'", id, kind));
                data.insert("type".into(), Value::String(kind.as_str().into()));
            }
        }

        if !data.get("label").is_some_and(Value::is_string) {
            self.warn(format!(
                "Node '{}': label was missing; using '{}'",
                id,
                kind.default_label()
            ));
            data.insert("label".into(), Value::String(kind.default_label().into()));
        }

        match kind {
            NodeKind::Prompt => self.check_prompt(id, data),
            NodeKind::Code => self.check_code(id, data),
            NodeKind::Condition => self.check_condition(id, data),
            NodeKind::File => self.check_file(id, data),
        }
    }

    fn check_prompt(&mut self, id: &str, data: &mut Map<String, Value>) {
        if non_empty_str(data.get("prompt")).is_none() {
            self.error(format!("Node '{}': prompt node requires non-empty data.prompt", id));
        }

        let structured = match data.get("structuredOutput") {
            None | Some(Value::Null) => {
                data.remove("structuredOutput");
                false
            }
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                let found = describe(other);
                self.error(format!(
                    "Node '{}': data.structuredOutput must be a boolean (found {})",
                    id, found
                ));
                false
            }
        };

        match data.get("outputSchema") {
            None => {}
            Some(Value::Null) => {
                data.remove("outputSchema");
            }
            Some(Value::String(_)) => {}
            Some(schema @ (Value::Object(_) | Value::Array(_))) => {
                let text = schema.to_string();
                self.warn(format!(
                    "Node '{}': outputSchema was given as JSON; stored as text",
                    id
                ));
                data.insert("outputSchema".into(), Value::String(text));
            }
            Some(other) => {
                let found = describe(other);
                self.error(format!(
                    "Node '{}': data.outputSchema must be a JSON string (found {})",
                    id, found
                ));
            }
        }

        if structured {
            let parses = data
                .get("outputSchema")
                .and_then(Value::as_str)
                .map(|s| serde_json::from_str::<Value>(s).is_ok())
                .unwrap_or(false);
            if !parses {
                self.error(format!(
                    "Node '{}': structuredOutput is true but outputSchema is missing or not valid JSON",
                    id
                ));
            }
        }
    }

    fn check_code(&mut self, id: &str, data: &Map<String, Value>) {
        if !self.options.allow_code {
            self.error(format!(
                "Node '{}': code nodes are not allowed for this workflow",
                id
            ));
        }
        if !data.get("code").is_some_and(Value::is_string) {
            self.error(format!("Node '{}': code node requires data.code text", id));
        }
    }

    fn check_condition(&mut self, id: &str, data: &mut Map<String, Value>) {
        match non_empty_str(data.get("expression")) {
            Some(expression) => {
                if let Err(e) = condition::parse(expression) {
                    self.error(format!("Node '{}': {}", id, e));
                }
            }
            None => self.error(format!(
                "Node '{}': condition node requires non-empty data.expression",
                id
            )),
        }

        let max_cycles = data.get("maxCycles").and_then(|v| {
            v.as_u64().or_else(|| {
                v.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
        });
        match max_cycles {
            Some(n) if n <= u32::MAX as u64 => {
                if !data.get("maxCycles").is_some_and(Value::is_u64) {
                    data.insert("maxCycles".into(), Value::from(n));
                }
            }
            _ => self.error(format!(
                "Node '{}': data.maxCycles must be a non-negative integer",
                id
            )),
        }
    }

    fn check_file(&mut self, id: &str, data: &mut Map<String, Value>) {
        match data.get("path").and_then(Value::as_str) {
            Some(path) if is_vault_relative(path) => {}
            Some(path) if path.trim().is_empty() => {
                self.error(format!("Node '{}': file node requires data.path", id))
            }
            Some(path) => self.error(format!(
                "Node '{}': file path '{}' must be relative to the vault",
                id, path
            )),
            None => self.error(format!("Node '{}': file node requires data.path", id)),
        }

        for field in ["lastModified", "fileSize"] {
            match data.get(field) {
                None | Some(Value::Number(_)) => {}
                Some(Value::Null) => {
                    data.remove(field);
                }
                Some(_) => {
                    self.warn(format!("Node '{}': {} was not a number; dropped", id, field));
                    data.remove(field);
                }
            }
        }
    }

    fn check_edges(&mut self, root: &mut Map<String, Value>) {
        let all_ids: HashSet<String> = root
            .get("nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| non_empty_str(n.get("id")))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        match root.get("edges") {
            Some(Value::Array(_)) => {}
            None | Some(Value::Null) => {
                self.warn("Workflow 'edges' array was missing; treated as empty");
                root.insert("edges".into(), Value::Array(Vec::new()));
                return;
            }
            Some(other) => {
                let found = describe(other);
                self.error(format!("Workflow 'edges' must be an array (found {})", found));
                return;
            }
        }
        let Some(Value::Array(edges)) = root.get_mut("edges") else {
            return;
        };

        let mut taken: HashSet<String> = HashSet::new();

        for (index, edge) in edges.iter_mut().enumerate() {
            let Some(edge) = edge.as_object_mut() else {
                self.error(format!("edges[{}]: edge must be an object", index));
                continue;
            };

            let given_id = non_empty_str(edge.get("id")).map(str::to_string);
            let label = given_id
                .as_ref()
                .map(|id| format!("Edge '{}'", id))
                .unwrap_or_else(|| format!("edges[{}]", index));

            for field in ["source", "target"] {
                match non_empty_str(edge.get(field)) {
                    Some(node_id) if all_ids.contains(node_id) => {}
                    Some(node_id) => self.error(format!(
                        "{}: {} '{}' does not reference an existing node",
                        label, field, node_id
                    )),
                    None => self.error(format!("{}: missing {}", label, field)),
                }
            }

            for field in ["sourceHandle", "targetHandle", "label"] {
                match edge.get(field) {
                    None | Some(Value::String(_)) => {}
                    Some(Value::Null) => {
                        edge.remove(field);
                    }
                    Some(_) => {
                        self.warn(format!("{}: {} was not a string; dropped", label, field));
                        edge.remove(field);
                    }
                }
            }

            match given_id {
                Some(id) if taken.insert(id.clone()) => {}
                Some(id) => {
                    let fresh = unique_id(fallback_edge_id(edge, index), &mut taken);
                    self.warn(format!(
                        "Edge '{}': duplicate edge id; renamed to '{}'",
                        id, fresh
                    ));
                    edge.insert("id".into(), Value::String(fresh));
                }
                None => {
                    let fresh = unique_id(fallback_edge_id(edge, index), &mut taken);
                    self.warn(format!("edges[{}]: id was missing; generated '{}'", index, fresh));
                    edge.insert("id".into(), Value::String(fresh));
                }
            }

        }
    }

    fn check_graph(&mut self, root: &Map<String, Value>, kinds: &HashMap<String, NodeKind>) {
        let Some(nodes) = root.get("nodes").and_then(Value::as_array) else {
            return;
        };
        if nodes.is_empty() {
            self.error("Workflow has no nodes");
            return;
        }
        let edges: Vec<&Map<String, Value>> = root
            .get("edges")
            .and_then(Value::as_array)
            .map(|e| e.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default();

        let targets: HashSet<&str> = edges.iter().filter_map(|e| endpoint(e, "target")).collect();
        let has_entry = nodes
            .iter()
            .filter_map(|n| n.get("id").and_then(Value::as_str))
            .any(|id| !targets.contains(id));
        if !has_entry {
            self.error(
                "Workflow has no entry node: every node has an incoming edge, so nothing can start the run",
            );
        }

        // Deterministic report order
        let mut ids: Vec<&String> = kinds.keys().collect();
        ids.sort();

        for id in ids {
            let outgoing: Vec<&&Map<String, Value>> = edges
                .iter()
                .filter(|e| endpoint(e, "source") == Some(id.as_str()))
                .collect();
            let has_incoming = edges
                .iter()
                .any(|e| endpoint(e, "target") == Some(id.as_str()));

            match kinds[id] {
                NodeKind::Condition => self.check_routing(id, &outgoing),
                NodeKind::File if has_incoming && !outgoing.is_empty() => self.warn(format!(
                    "Node '{}': file node has both incoming and outgoing edges; it writes its input and passes the written text on",
                    id
                )),
                _ => {}
            }
        }
    }

    fn check_routing(&mut self, id: &str, outgoing: &[&&Map<String, Value>]) {
        if outgoing.is_empty() {
            return;
        }
        if outgoing.len() > 2 {
            self.error(format!(
                "Condition node '{}' has {} outgoing edges; at most 2 are allowed (one \"true\", one \"false\")",
                id,
                outgoing.len()
            ));
            return;
        }

        let handles: Vec<String> = outgoing
            .iter()
            .map(|e| {
                e.get("sourceHandle")
                    .and_then(Value::as_str)
                    .unwrap_or("(none)")
                    .to_string()
            })
            .collect();
        let trues = handles.iter().filter(|h| *h == HANDLE_TRUE).count();
        let falses = handles.iter().filter(|h| *h == HANDLE_FALSE).count();

        if trues != 1 || falses != 1 {
            self.error(format!(
                "Condition node '{}' must have exactly one outgoing edge with sourceHandle \"true\" and one with \"false\" (found: {})",
                id,
                handles.join(", ")
            ));
        }
    }
}

fn endpoint<'a>(edge: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    edge.get(field).and_then(Value::as_str)
}

fn fallback_edge_id(edge: &Map<String, Value>, index: usize) -> String {
    match (
        edge.get("source").and_then(Value::as_str),
        edge.get("target").and_then(Value::as_str),
    ) {
        (Some(s), Some(t)) => format!("e_{}_{}", s, t),
        _ => format!("e_{}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt_node(id: &str) -> Value {
        json!({
            "id": id, "type": "prompt", "position": {"x": 0, "y": 0},
            "data": {"type": "prompt", "label": "Step", "prompt": "Hello"}
        })
    }

    fn workflow(nodes: Vec<Value>, edges: Vec<Value>) -> Value {
        json!({
            "id": "wf_test", "name": "Test", "version": 1,
            "nodes": nodes, "edges": edges, "settings": {},
            "created": "2024-01-01T00:00:00.000Z",
            "updated": "2024-01-01T00:00:00.000Z"
        })
    }

    fn loop_workflow() -> Value {
        workflow(
            vec![
                prompt_node("p0"),
                prompt_node("p1"),
                json!({"id": "c1", "type": "condition", "position": {"x": 320, "y": 0},
                       "data": {"type": "condition", "label": "Again?",
                                "expression": "iteration < maxCycles", "maxCycles": 3}}),
                prompt_node("p2"),
            ],
            vec![
                json!({"id": "e0", "source": "p0", "target": "p1"}),
                json!({"id": "e1", "source": "p1", "target": "c1"}),
                json!({"id": "e2", "source": "c1", "target": "p1", "sourceHandle": "true"}),
                json!({"id": "e3", "source": "c1", "target": "p2", "sourceHandle": "false"}),
            ],
        )
    }

    #[test]
    fn test_valid_workflow_has_no_warnings() {
        let result = validate_workflow(&loop_workflow(), ValidationOptions::default()).unwrap();
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.workflow.id, "wf_test");
        assert_eq!(result.workflow.nodes.len(), 4);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let first = validate_workflow(&loop_workflow(), ValidationOptions::default()).unwrap();
        let again = serde_json::to_value(&first.workflow).unwrap();
        let second = validate_workflow(&again, ValidationOptions::default()).unwrap();
        assert_eq!(first.workflow, second.workflow);
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn test_auto_fixes_cosmetic_defects() {
        let value = json!({
            "version": 1,
            "nodes": [
                {"type": "prompt", "data": {"prompt": "Summarise"}},
                {"id": "f1", "type": "file", "position": {"x": "a", "y": 0},
                 "data": {"type": "file", "label": "Notes", "path": "notes/a.md", "fileSize": "big"}}
            ],
            "settings": {"theme": "dark"}
        });

        let result = validate_workflow(&value, ValidationOptions::default()).unwrap();
        let wf = result.workflow;
        assert!(wf.id.starts_with("wf_"));
        assert_eq!(wf.name, "Untitled workflow");
        assert_eq!(wf.nodes[0].id, "prompt_1");
        assert_eq!(wf.nodes[0].label(), "Prompt");
        assert!(wf.edges.is_empty());
        assert!(!wf.created.is_empty());
        assert!(result.warnings.len() >= 7, "{:?}", result.warnings);
    }

    #[test]
    fn test_generated_edge_ids_are_unique() {
        let value = workflow(
            vec![prompt_node("a"), prompt_node("b")],
            vec![
                json!({"source": "a", "target": "b"}),
                json!({"source": "a", "target": "b"}),
                json!({"id": "x", "source": "a", "target": "b"}),
                json!({"id": "x", "source": "a", "target": "b"}),
            ],
        );

        let wf = validate_workflow(&value, ValidationOptions::default())
            .unwrap()
            .workflow;
        let ids: HashSet<&str> = wf.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.contains("e_a_b"));
        assert!(ids.contains("x"));
    }

    #[test]
    fn test_output_schema_object_is_serialised() {
        let mut node = prompt_node("p1");
        node["data"]["structuredOutput"] = json!(true);
        node["data"]["outputSchema"] = json!({"type": "object"});

        let result =
            validate_workflow(&workflow(vec![node], vec![]), ValidationOptions::default()).unwrap();
        match &result.workflow.nodes[0].data {
            super::super::types::NodeData::Prompt(p) => {
                assert_eq!(p.output_schema.as_deref(), Some("{\"type\":\"object\"}"));
            }
            other => panic!("Expected prompt data, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_are_collected_exhaustively() {
        let value = json!({
            "id": "wf", "name": "n", "version": 2,
            "nodes": [
                {"id": "p1", "type": "prompt", "position": {"x": 0, "y": 0},
                 "data": {"type": "prompt", "label": "P"}},
                {"id": "p1", "type": "prompt", "position": {"x": 0, "y": 0},
                 "data": {"type": "prompt", "label": "P", "prompt": "x"}},
                {"id": "x1", "type": "script", "data": {}},
                {"id": "c1", "type": "code", "position": {"x": 0, "y": 0},
                 "data": {"type": "prompt", "label": "C", "code": "return 1"}}
            ],
            "edges": [{"id": "e1", "source": "p1", "target": "ghost"}]
        });

        let errors = validate_workflow(&value, ValidationOptions::default())
            .unwrap_err()
            .errors;
        let all = errors.join("\n");
        assert!(all.contains("version must be 1"), "{}", all);
        assert!(all.contains("'p1': prompt node requires"), "{}", all);
        assert!(all.contains("'p1': duplicate node id"), "{}", all);
        assert!(all.contains("'x1': unknown node type"), "{}", all);
        assert!(all.contains("'c1': data.type 'prompt' does not match"), "{}", all);
        assert!(all.contains("Edge 'e1': target 'ghost'"), "{}", all);
    }

    #[test]
    fn test_structured_output_requires_parseable_schema() {
        let mut node = prompt_node("p1");
        node["data"]["structuredOutput"] = json!(true);
        node["data"]["outputSchema"] = json!("{not json");

        let errors = validate_workflow(&workflow(vec![node], vec![]), ValidationOptions::default())
            .unwrap_err()
            .errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'p1'"));
        assert!(errors[0].contains("outputSchema"));
    }

    #[test]
    fn test_code_nodes_follow_allow_code() {
        let code = json!({"id": "js", "type": "code", "position": {"x": 0, "y": 0},
                          "data": {"type": "code", "label": "JS", "code": "return input"}});
        let value = workflow(vec![code], vec![]);

        let err = validate_workflow(&value, ValidationOptions::allow_code(false)).unwrap_err();
        assert!(err.errors[0].contains("code nodes are not allowed"));
        assert!(validate_workflow(&value, ValidationOptions::allow_code(true)).is_ok());
    }

    #[test]
    fn test_condition_missing_false_branch_names_node() {
        let value = workflow(
            vec![
                prompt_node("p1"),
                json!({"id": "cond_1", "type": "condition", "position": {"x": 0, "y": 0},
                       "data": {"type": "condition", "label": "C",
                                "expression": "input == 'yes'", "maxCycles": 1}}),
                prompt_node("p2"),
            ],
            vec![
                json!({"id": "e1", "source": "p1", "target": "cond_1"}),
                json!({"id": "e2", "source": "cond_1", "target": "p2", "sourceHandle": "true"}),
            ],
        );

        let errors = validate_workflow(&value, ValidationOptions::default())
            .unwrap_err()
            .errors;
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("cond_1"));
        assert!(errors[0].contains("\"false\""));
    }

    #[test]
    fn test_condition_rejects_bad_expression_and_max_cycles() {
        let value = workflow(
            vec![json!({"id": "c", "type": "condition", "position": {"x": 0, "y": 0},
                        "data": {"type": "condition", "label": "C",
                                 "expression": "input ==", "maxCycles": -1}})],
            vec![],
        );

        let errors = validate_workflow(&value, ValidationOptions::default())
            .unwrap_err()
            .errors;
        assert_eq!(errors.len(), 2, "{:?}", errors);
    }

    #[test]
    fn test_no_entry_node() {
        let value = workflow(
            vec![prompt_node("a"), prompt_node("b")],
            vec![
                json!({"id": "e1", "source": "a", "target": "b"}),
                json!({"id": "e2", "source": "b", "target": "a"}),
            ],
        );

        let errors = validate_workflow(&value, ValidationOptions::default())
            .unwrap_err()
            .errors;
        assert!(errors.iter().any(|e| e.contains("no entry node")));
    }

    #[test]
    fn test_file_paths_must_stay_in_vault() {
        assert!(is_vault_relative("notes/today.md"));
        assert!(!is_vault_relative("/etc/passwd"));
        assert!(!is_vault_relative("../outside.md"));
        assert!(!is_vault_relative("notes/../../x"));
        assert!(!is_vault_relative("C:\\x"));
        assert!(!is_vault_relative(""));
    }

    #[test]
    fn test_file_dual_role_is_a_warning() {
        let file = json!({"id": "f", "type": "file", "position": {"x": 0, "y": 0},
                          "data": {"type": "file", "label": "F", "path": "out.md"}});
        let value = workflow(
            vec![prompt_node("a"), file, prompt_node("b")],
            vec![
                json!({"id": "e1", "source": "a", "target": "f"}),
                json!({"id": "e2", "source": "f", "target": "b"}),
            ],
        );

        let result = validate_workflow(&value, ValidationOptions::default()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("'f'"));
    }

    #[test]
    fn test_non_object_root() {
        let err = validate_workflow(&json!([1, 2]), ValidationOptions::default()).unwrap_err();
        assert_eq!(err.errors, vec!["Workflow must be a JSON object".to_string()]);
        assert_eq!(bullet_list(&err.errors), "- Workflow must be a JSON object");
    }
}
