//! Class metadata consumed from the model repository.

use crate::types::Type;
use std::collections::{HashSet, VecDeque};

/// One end of an association as seen from its source class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationEnd {
    /// Class at the far end.
    pub target: String,
    /// Upper multiplicity greater than one.
    pub many: bool,
    /// Declared `{ordered}`.
    pub ordered: bool,
}

impl AssociationEnd {
    pub fn single(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            many: false,
            ordered: false,
        }
    }

    pub fn many(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            many: true,
            ordered: false,
        }
    }

    pub fn ordered(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            many: true,
            ordered: true,
        }
    }

    /// Static type of navigating this end from a single object.
    pub fn ty(&self) -> Type {
        let target = Type::object(self.target.clone());
        match (self.many, self.ordered) {
            (false, _) => target,
            (true, false) => Type::set(target),
            (true, true) => Type::ordered_set(target),
        }
    }
}

/// Signature of a user-defined query operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSig {
    /// Parameter names and types, in call order.
    pub params: Vec<(String, Type)>,
    pub result: Type,
}

/// Class-level metadata supplied by the model repository.
///
/// Classes are addressed by their canonical name. Implementations must not
/// change their answers while expressions built against them are in use.
pub trait ModelSchema {
    /// Resolve a (possibly aliased) class name to its canonical name.
    fn resolve_class(&self, name: &str) -> Option<String>;

    /// Direct superclasses of a class, in declaration order.
    fn superclasses(&self, class: &str) -> Vec<String>;

    /// Type of an attribute declared on the class or inherited.
    fn attribute_type(&self, class: &str, name: &str) -> Option<Type>;

    /// Association end reachable from the class under the given role name.
    fn association_end(&self, class: &str, role: &str) -> Option<AssociationEnd>;

    /// Signature of a query operation declared on the class or inherited.
    fn operation(&self, class: &str, name: &str) -> Option<OperationSig> {
        let _ = (class, name);
        None
    }

    /// True if `sub` is `sup` or one of its descendants.
    fn class_conforms_to(&self, sub: &str, sup: &str) -> bool {
        ancestors(self, sub).iter().any(|c| c == sup)
    }
}

/// The class itself followed by its ancestors, nearest first.
pub fn ancestors<S: ModelSchema + ?Sized>(schema: &S, class: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([class.to_string()]);
    while let Some(next) = queue.pop_front() {
        if !seen.insert(next.clone()) {
            continue;
        }
        queue.extend(schema.superclasses(&next));
        order.push(next);
    }
    order
}

/// A schema with no classes. Useful for expressions over primitive values only.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySchema;

impl ModelSchema for EmptySchema {
    fn resolve_class(&self, _name: &str) -> Option<String> {
        None
    }

    fn superclasses(&self, _class: &str) -> Vec<String> {
        Vec::new()
    }

    fn attribute_type(&self, _class: &str, _name: &str) -> Option<Type> {
        None
    }

    fn association_end(&self, _class: &str, _role: &str) -> Option<AssociationEnd> {
        None
    }
}
