//! Construction-time type errors.

use crate::types::Type;
use thiserror::Error;

/// A static type error detected while building an expression tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: Type,
        found: Type,
        context: String,
    },

    #[error("wrong number of arguments to {operation}: expected {expected}, found {found}")]
    ArityMismatch {
        operation: String,
        expected: usize,
        found: usize,
    },

    #[error("no operation {receiver}.{name}({}) is defined", fmt_types(.args))]
    UnknownOperation {
        receiver: Type,
        name: String,
        args: Vec<Type>,
    },

    #[error("undefined class: {name}")]
    UndefinedClass { name: String },

    #[error("type {ty} has no property {name}")]
    UndefinedProperty { ty: Type, name: String },

    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("expected a collection, found {ty}")]
    NotACollection { ty: Type },

    #[error("{context} must be boolean, found {found}")]
    ExpectedBool { found: Type, context: String },

    #[error("values of type {found} are not ordered")]
    NotOrderable { found: Type },

    #[error("{kind} does not accept {found} iterator variable(s)")]
    InvalidIterators { kind: String, found: usize },

    #[error("cannot cast {from} to {to}")]
    InvalidCast { from: Type, to: Type },

    #[error("duplicate tuple part: {name}")]
    DuplicateTupleField { name: String },
}

fn fmt_types(types: &[Type]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for tree construction.
pub type TypeResult<T> = Result<T, TypeError>;
