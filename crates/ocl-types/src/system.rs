//! Conformance and least upper bounds.

use crate::schema::{ancestors, ModelSchema};
use crate::types::{CollectionKind, TupleType, Type};

/// The conformance relation, parameterised by the class hierarchy of a model.
#[derive(Clone, Copy)]
pub struct TypeSystem<'s> {
    schema: &'s dyn ModelSchema,
}

impl<'s> TypeSystem<'s> {
    pub fn new(schema: &'s dyn ModelSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'s dyn ModelSchema {
        self.schema
    }

    /// True if every value of type `a` may be used where `b` is expected.
    pub fn conforms_to(&self, a: &Type, b: &Type) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Type::Undefined, _) => true,
            (_, Type::OclAny) => true,
            (Type::UnlimitedNatural, Type::Integer | Type::Real) => true,
            (Type::Integer, Type::Real) => true,
            (Type::Object(sub), Type::Object(sup)) => self.schema.class_conforms_to(sub, sup),
            (Type::Collection(k1, e1), Type::Collection(k2, e2)) => {
                (k1 == k2 || *k2 == CollectionKind::Collection) && self.conforms_to(e1, e2)
            }
            (Type::Tuple(t1), Type::Tuple(t2)) => {
                t1.fields.len() == t2.fields.len()
                    && t1.fields.iter().all(|(name, ty)| {
                        t2.get_field(name)
                            .is_some_and(|other| self.conforms_to(ty, other))
                    })
            }
            _ => false,
        }
    }

    /// Smallest common supertype of `a` and `b`. Total: falls back to `OclAny`.
    pub fn least_upper_bound(&self, a: &Type, b: &Type) -> Type {
        if self.conforms_to(a, b) {
            return b.clone();
        }
        if self.conforms_to(b, a) {
            return a.clone();
        }
        match (a, b) {
            (Type::Object(c), Type::Object(d)) => self
                .common_superclass(c, d)
                .map(Type::Object)
                .unwrap_or(Type::OclAny),
            (Type::Collection(k1, e1), Type::Collection(k2, e2)) => {
                let kind = if k1 == k2 {
                    *k1
                } else {
                    CollectionKind::Collection
                };
                Type::collection(kind, self.least_upper_bound(e1, e2))
            }
            (Type::Tuple(t1), Type::Tuple(t2))
                if t1.fields.keys().eq(t2.fields.keys()) =>
            {
                Type::Tuple(TupleType::from_fields(t1.fields.iter().map(|(name, ty)| {
                    let other = &t2.fields[name];
                    (name.clone(), self.least_upper_bound(ty, other))
                })))
            }
            _ => Type::OclAny,
        }
    }

    /// Least upper bound of a sequence of types; `Undefined` for none.
    pub fn least_upper_bound_all<'t>(&self, types: impl IntoIterator<Item = &'t Type>) -> Type {
        types
            .into_iter()
            .fold(Type::Undefined, |acc, ty| self.least_upper_bound(&acc, ty))
    }

    /// Nearest ancestor of `c` (breadth first) that `d` also conforms to.
    fn common_superclass(&self, c: &str, d: &str) -> Option<String> {
        ancestors(self.schema, c)
            .into_iter()
            .find(|candidate| self.schema.class_conforms_to(d, candidate))
    }
}
