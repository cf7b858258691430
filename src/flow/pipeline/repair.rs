// SPDX-License-Identifier: MIT

//! Validate-repair loop
//!
//! A candidate workflow from the model is validated; on failure the exact
//! error list and the offending JSON go back to the model, up to
//! [`MAX_VALIDATION_ATTEMPTS`] validations in total. A repair reply that
//! holds no usable workflow uses up an attempt like an invalid one.

use super::prompts::repair_prompt;
use super::queue::{Reporter, Stage};
use super::reply::{interpret_generation_reply, GenerationReply};
use crate::adk::error::EngineError;
use crate::adk::json::extract_json;
use crate::adk::model::{CompletionRequest, Model};
use crate::flow::workflow::{validate_workflow, Validated, ValidationOptions};
use serde_json::Value;

pub const MAX_VALIDATION_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone)]
pub enum RepairOutcome {
    Valid { validated: Validated, attempts: u32 },
    /// Errors from the last validation
    Exhausted { errors: Vec<String> },
}

/// Validate `candidate`, asking `model` to repair it until it passes or the
/// attempt budget runs out
pub async fn validate_with_repair(
    model: &dyn Model,
    model_override: Option<&str>,
    candidate: Value,
    options: ValidationOptions,
    reporter: &Reporter,
) -> Result<RepairOutcome, EngineError> {
    let mut candidate = candidate;
    let mut attempt = 1;
    // Set when the last repair reply could not be used at all
    let mut unusable_reply: Option<String> = None;

    loop {
        reporter
            .progress(
                Stage::Validating,
                Some(attempt),
                Some(MAX_VALIDATION_ATTEMPTS),
                None,
            )
            .await;

        let outcome = match unusable_reply.take() {
            Some(problem) => Err(vec![problem]),
            None => validate_workflow(&candidate, options).map_err(|e| e.errors),
        };
        let errors = match outcome {
            Ok(validated) => {
                log::info!(
                    "[{}] Workflow valid after {} attempt(s)",
                    reporter.request_id(),
                    attempt
                );
                return Ok(RepairOutcome::Valid {
                    validated,
                    attempts: attempt,
                });
            }
            Err(errors) => errors,
        };

        log::warn!(
            "[{}] Validation attempt {}/{} found {} problem(s)",
            reporter.request_id(),
            attempt,
            MAX_VALIDATION_ATTEMPTS,
            errors.len()
        );
        if attempt >= MAX_VALIDATION_ATTEMPTS {
            return Ok(RepairOutcome::Exhausted { errors });
        }

        attempt += 1;
        reporter
            .progress(
                Stage::Repairing,
                Some(attempt),
                Some(MAX_VALIDATION_ATTEMPTS),
                Some(format!("Fixing {} problem(s)", errors.len())),
            )
            .await;

        let last_json = serde_json::to_string_pretty(&candidate)?;
        let prompt = repair_prompt(&errors, &last_json, options.allow_code);
        let request = CompletionRequest::new(prompt).with_model(model_override.map(str::to_string));
        let completion = model.complete(request).await?;

        match read_repair_reply(&completion.content) {
            Ok(workflow) => candidate = workflow,
            Err(problem) => {
                log::warn!("[{}] Unusable repair reply: {}", reporter.request_id(), problem);
                unusable_reply = Some(problem);
            }
        }
    }
}

fn read_repair_reply(content: &str) -> Result<Value, String> {
    let value = extract_json(content)
        .map_err(|e| format!("Your previous reply was not valid JSON ({}); reply with the workflow JSON object only", e))?;
    match interpret_generation_reply(value)? {
        GenerationReply::Workflow(workflow) => Ok(workflow),
        GenerationReply::NeedsClarification(_) => {
            Err("Your previous reply asked questions; return the corrected workflow instead".to_string())
        }
    }
}
