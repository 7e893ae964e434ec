//! Internal evaluation errors.

use thiserror::Error;

/// An inconsistency in the expression tree or its bindings.
///
/// These indicate a defect in tree construction or in the caller's initial
/// bindings. Semantic failures never surface here; they evaluate to
/// `Value::Undefined`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unbound variable: {name}")]
    UnboundVariable { name: String },

    #[error("malformed expression: {detail}")]
    MalformedNode { detail: String },
}

pub type EvalResult<T> = Result<T, EvalError>;
