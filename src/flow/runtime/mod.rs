// SPDX-License-Identifier: MIT

//! Execution runtime
//!
//! [`Executor`] walks a persisted workflow with an explicit worklist and
//! dispatches every node to the runner for its kind.

pub mod code;
pub mod context;
pub mod executor;
pub mod file;
pub mod prompt;

pub use executor::{Execution, Executor};

use crate::adk::error::ProviderError;
use thiserror::Error;

/// Why a node (or the whole run) failed
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// The script threw, or could not be compiled
    #[error("Node '{node_id}': script error: {message}")]
    Script { node_id: String, message: String },

    #[error("Node '{node_id}': script timed out after {millis} ms")]
    Timeout { node_id: String, millis: u128 },

    /// The command-execution collaborator failed
    #[error("Node '{node_id}': {source}")]
    Command {
        node_id: String,
        #[source]
        source: ProviderError,
    },

    #[error("Node '{node_id}': file error: {message}")]
    File { node_id: String, message: String },

    #[error("Node '{node_id}': expression error: {message}")]
    Expression { node_id: String, message: String },

    /// Too many node executions in one run
    #[error("Run stopped after {0} steps")]
    StepBudget(usize),
}

impl ExecutionError {
    /// Node the error belongs to, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionError::Script { node_id, .. }
            | ExecutionError::Timeout { node_id, .. }
            | ExecutionError::Command { node_id, .. }
            | ExecutionError::File { node_id, .. }
            | ExecutionError::Expression { node_id, .. } => Some(node_id),
            ExecutionError::StepBudget(_) => None,
        }
    }
}
