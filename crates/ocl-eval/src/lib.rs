//! Evaluator for typed OCL expression trees.

pub mod builtins;
pub mod context;
pub mod error;
pub mod eval;
pub mod model;
pub mod value;

pub use context::{EvalContext, EvalTrace, OpenNode, TraceEntry, TraceListener};
pub use error::{EvalError, EvalResult};
pub use eval::{evaluate, EvalConfig, Evaluator};
pub use model::ObjectModel;
pub use value::{CollectionValue, ObjectRef, Value};
