//! The object model an expression is evaluated against.

use crate::value::{ObjectRef, Value};
use ocl_ir::Expr;
use ocl_types::ModelSchema;
use std::sync::Arc;

/// Read access to a snapshot of the object model.
///
/// The evaluator assumes the snapshot does not change during one
/// evaluation. Missing data is reported as `Value::Undefined`, never as an
/// error.
pub trait ObjectModel: ModelSchema {
    /// Value of an attribute, or Undefined when unset.
    fn get_attribute(&self, object: &ObjectRef, name: &str) -> Value;

    /// Objects linked through an association end: an object or Undefined
    /// for single-valued ends, a `Set` (or `OrderedSet` for ordered ends)
    /// otherwise.
    fn get_association_end(&self, object: &ObjectRef, role: &str) -> Value;

    /// Live instances of `class` and of its subclasses.
    fn all_instances_of(&self, class: &str) -> Vec<ObjectRef>;

    /// Body of a query operation declared directly on `class`.
    fn operation_body(&self, _class: &str, _name: &str) -> Option<Arc<Expr>> {
        None
    }
}
