//! Typed intermediate representation for OCL expressions.
//!
//! Expression trees are immutable once built and carry their static type on
//! every node. Use [`ExprBuilder`] to construct them.

pub mod builder;
pub mod expr;
pub mod pretty;

pub use builder::ExprBuilder;
pub use expr::{
    Accumulator, Callee, CollectionPart, Expr, ExprKind, Literal, LoopKind, Property,
    TypeTestKind,
};
pub use pretty::{pretty_print_expr, pretty_print_literal};
