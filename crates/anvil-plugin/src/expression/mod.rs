//! Parameter expressions.

mod ast;
mod evaluator;

pub use ast::{PropertyPath, Segment, TemplatePart, parse_path, parse_template};
pub use evaluator::{EvaluationMode, ExpressionEvaluator, MAX_EXPRESSION_DEPTH};
