// SPDX-License-Identifier: MIT

//! Reply envelopes of the generation and edit pipelines
//!
//! The JSON is dug out of the model text by
//! [`extract_json`](crate::adk::json::extract_json); the
//! `interpret_*` functions map it onto the reply shapes each pipeline accepts.

use serde_json::Value;

fn questions_of(value: &Value) -> Vec<String> {
    value
        .get("questions")
        .and_then(Value::as_array)
        .map(|qs| {
            qs.iter()
                .map(|q| match q {
                    Value::String(s) => s.clone(),
                    Value::Object(o) => o
                        .get("question")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| q.to_string()),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn is_clarification(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("needs_clarification")
}

/// What a generation reply asks the pipeline to do
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationReply {
    /// A candidate workflow, not yet validated
    Workflow(Value),
    NeedsClarification(Vec<String>),
}

/// Accepts a bare workflow, `{workflow: {...}}`, `{status:"completed",
/// updatedWorkflow: {...}}`, or a clarification request.
pub fn interpret_generation_reply(value: Value) -> Result<GenerationReply, String> {
    if is_clarification(&value) {
        let questions = questions_of(&value);
        if questions.is_empty() {
            return Err("Clarification reply has no questions".to_string());
        }
        return Ok(GenerationReply::NeedsClarification(questions));
    }

    let Value::Object(mut map) = value else {
        return Err("Reply is not a JSON object".to_string());
    };
    for key in ["workflow", "updatedWorkflow"] {
        if map.get(key).is_some_and(Value::is_object) {
            if let Some(inner) = map.remove(key) {
                return Ok(GenerationReply::Workflow(inner));
            }
        }
    }
    Ok(GenerationReply::Workflow(Value::Object(map)))
}

/// What an edit reply asks the pipeline to do
#[derive(Debug, Clone, PartialEq)]
pub enum EditReply {
    NeedsClarification(Vec<String>),
    Completed {
        /// Absent when the model only answered a question
        updated_workflow: Option<Value>,
        response_message: String,
        changes_description: Option<String>,
    },
}

pub fn interpret_edit_reply(value: Value) -> Result<EditReply, String> {
    if is_clarification(&value) {
        let questions = questions_of(&value);
        if questions.is_empty() {
            return Err("Clarification reply has no questions".to_string());
        }
        return Ok(EditReply::NeedsClarification(questions));
    }

    let Value::Object(mut map) = value else {
        return Err("Reply is not a JSON object".to_string());
    };

    match map.get("status").and_then(Value::as_str) {
        None | Some("completed") => {}
        Some(other) => return Err(format!("Unknown reply status '{}'", other)),
    }

    let updated_workflow = match map.remove("updatedWorkflow") {
        None | Some(Value::Null) => None,
        Some(v @ Value::Object(_)) => Some(v),
        Some(_) => return Err("updatedWorkflow must be an object".to_string()),
    };
    let text = |map: &serde_json::Map<String, Value>, key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
    };
    let changes_description = text(&map, "changesDescription");
    let response_message = text(&map, "responseMessage")
        .or_else(|| changes_description.clone())
        .ok_or_else(|| "Reply is missing responseMessage".to_string())?;

    Ok(EditReply::Completed {
        updated_workflow,
        response_message,
        changes_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generation_reply_shapes() {
        let wf = json!({"id": "wf_x", "version": 1});
        assert_eq!(
            interpret_generation_reply(wf.clone()).unwrap(),
            GenerationReply::Workflow(wf.clone())
        );
        assert_eq!(
            interpret_generation_reply(json!({"workflow": wf.clone()})).unwrap(),
            GenerationReply::Workflow(wf)
        );
        assert_eq!(
            interpret_generation_reply(json!({"status": "needs_clarification", "questions": ["Which folder?"]}))
                .unwrap(),
            GenerationReply::NeedsClarification(vec!["Which folder?".to_string()])
        );
        assert!(interpret_generation_reply(json!({"status": "needs_clarification"})).is_err());
    }

    #[test]
    fn test_edit_reply_answer_only() {
        let reply = interpret_edit_reply(json!({
            "status": "completed",
            "responseMessage": "The loop runs three times."
        }))
        .unwrap();
        assert_eq!(
            reply,
            EditReply::Completed {
                updated_workflow: None,
                response_message: "The loop runs three times.".to_string(),
                changes_description: None,
            }
        );
    }

    #[test]
    fn test_edit_reply_with_workflow() {
        let reply = interpret_edit_reply(json!({
            "status": "completed",
            "updatedWorkflow": {"id": "wf"},
            "responseMessage": "Added a step",
            "changesDescription": "New prompt node"
        }))
        .unwrap();
        match reply {
            EditReply::Completed {
                updated_workflow: Some(wf),
                changes_description: Some(changes),
                ..
            } => {
                assert_eq!(wf, json!({"id": "wf"}));
                assert_eq!(changes, "New prompt node");
            }
            other => panic!("Unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_edit_reply_rejects_unknown_status() {
        assert!(interpret_edit_reply(json!({"status": "thinking"})).is_err());
        assert!(interpret_edit_reply(json!({"status": "completed"})).is_err());
        assert!(interpret_edit_reply(json!("text")).is_err());
    }
}
