// SPDX-License-Identifier: MIT

//! Workflow graphs: types, validation, layout and storage

pub mod condition;
pub mod layout;
pub mod store;
pub mod types;
pub mod validator;

pub use store::WorkflowStore;
pub use types::*;
pub use validator::{validate_workflow, Validated, ValidationErrors, ValidationOptions};
