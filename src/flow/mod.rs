// SPDX-License-Identifier: MIT

pub mod config;
pub mod pipeline;
pub mod runtime;
pub mod workflow;
