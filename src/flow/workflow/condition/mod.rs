// SPDX-License-Identifier: MIT

//! Condition expressions for condition nodes
//!
//! Expressions are small boolean formulas over the node's bound variables:
//! - `input.status == 'done'`
//! - `iteration < maxCycles`
//! - `output.score > 0.8 and not input.skip`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal, Operand};
pub use evaluator::{evaluate, is_truthy, lookup_path};
pub use parser::{parse, ParseError};
