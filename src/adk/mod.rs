// SPDX-License-Identifier: MIT

//! Collaborator interfaces: completion models, command execution, errors

pub mod command;
pub mod error;
pub mod json;
pub mod model;
