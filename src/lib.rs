// SPDX-License-Identifier: MIT

//! vaultflow: AI-assisted workflow automation for a note vault
//!
//! - [`adk`]: collaborator traits (completion model, command execution) and errors
//! - [`flow`]: workflow model, validation, layout, queue pipelines and the runtime

pub mod adk;
pub mod flow;
