//! The built-in operation table.
//!
//! Every operator and standard-library operation has a fixed signature keyed
//! on the receiver type category. Resolution picks the first entry whose
//! argument types conform (so `Integer` arguments coerce to `Real` slots) and
//! returns the result type together with a [`Builtin`] selector that the
//! evaluator dispatches on.

use crate::error::{TypeError, TypeResult};
use crate::system::TypeSystem;
use crate::types::{CollectionKind, Type};

/// Implementation selector for a built-in operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // === Logical ===
    And,
    Or,
    Xor,
    Implies,
    Not,

    // === Any ===
    Eq,
    Ne,
    IsUndefined,
    IsDefined,

    // === Numeric ===
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
    Floor,
    Round,
    Max,
    Min,
    IntDiv,
    Mod,

    // === Ordering (numeric, String, Date) ===
    Lt,
    Gt,
    Le,
    Ge,

    // === String ===
    Concat,
    Length,
    ToUpper,
    ToLower,
    Substring,
    ToInteger,
    ToReal,

    // === Collection ===
    Size,
    IsEmpty,
    NotEmpty,
    Includes,
    Excludes,
    Count,
    IncludesAll,
    ExcludesAll,
    Sum,
    MaxElement,
    MinElement,
    Including,
    Excluding,
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
    Flatten,
    AsSet,
    AsBag,
    AsSequence,
    AsOrderedSet,
    First,
    Last,
    At,
    Append,
    Prepend,
    IndexOf,
    SubSequence,
}

/// How a built-in reacts to undefined operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Undefined receiver or argument yields Undefined.
    Strict,
    /// Undefined receiver yields Undefined; arguments are element values
    /// and may themselves be Undefined.
    Receiver,
    /// The operation inspects undefined operands itself.
    NonStrict,
}

impl Builtin {
    pub fn strictness(self) -> Strictness {
        use Builtin::*;
        match self {
            And | Or | Xor | Implies | Eq | Ne | IsUndefined | IsDefined => Strictness::NonStrict,
            Includes | Excludes | Count | Including | Excluding | Append | Prepend | IndexOf => {
                Strictness::Receiver
            }
            _ => Strictness::Strict,
        }
    }

    /// Binary connectives evaluated with three-valued short-circuit logic.
    pub fn is_connective(self) -> bool {
        matches!(self, Builtin::And | Builtin::Or | Builtin::Xor | Builtin::Implies)
    }
}

/// Resolve `receiver.name(args)` against the built-in table.
pub fn resolve_operation(
    ts: &TypeSystem<'_>,
    receiver: &Type,
    name: &str,
    args: &[Type],
) -> TypeResult<(Type, Builtin)> {
    if let Some(found) = universal_op(name, args) {
        return Ok(found);
    }

    // An untyped `null` receiver takes its operator table from the context.
    let receiver_ty = match receiver {
        Type::Undefined => infer_undefined_receiver(name, args),
        other => other.clone(),
    };

    let found = match &receiver_ty {
        Type::Boolean => boolean_op(ts, name, args),
        Type::Integer | Type::UnlimitedNatural | Type::Real => {
            numeric_op(ts, &receiver_ty, name, args)
        }
        Type::String => string_op(ts, name, args),
        Type::Date => date_op(ts, name, args),
        Type::Collection(kind, elem) => collection_op(ts, *kind, elem, name, args),
        _ => None,
    };

    found.ok_or_else(|| TypeError::UnknownOperation {
        receiver: receiver.clone(),
        name: name.to_string(),
        args: args.to_vec(),
    })
}

fn universal_op(name: &str, args: &[Type]) -> Option<(Type, Builtin)> {
    let op = match (name, args.len()) {
        ("=", 1) => Builtin::Eq,
        ("<>", 1) => Builtin::Ne,
        ("oclIsUndefined", 0) => Builtin::IsUndefined,
        ("oclIsDefined", 0) => Builtin::IsDefined,
        _ => return None,
    };
    Some((Type::Boolean, op))
}

fn infer_undefined_receiver(name: &str, args: &[Type]) -> Type {
    match name {
        "and" | "or" | "xor" | "implies" | "not" => Type::Boolean,
        _ => match args.first() {
            Some(ty) if *ty != Type::Undefined => ty.clone(),
            _ => Type::Integer,
        },
    }
}

fn boolean_op(ts: &TypeSystem<'_>, name: &str, args: &[Type]) -> Option<(Type, Builtin)> {
    let boolean = |t: &Type| ts.conforms_to(t, &Type::Boolean);
    let op = match (name, args) {
        ("and", [a]) if boolean(a) => Builtin::And,
        ("or", [a]) if boolean(a) => Builtin::Or,
        ("xor", [a]) if boolean(a) => Builtin::Xor,
        ("implies", [a]) if boolean(a) => Builtin::Implies,
        ("not", []) => Builtin::Not,
        _ => return None,
    };
    Some((Type::Boolean, op))
}

fn numeric_op(
    ts: &TypeSystem<'_>,
    receiver: &Type,
    name: &str,
    args: &[Type],
) -> Option<(Type, Builtin)> {
    let num = |t: &Type| ts.conforms_to(t, &Type::Real);
    let int = |t: &Type| ts.conforms_to(t, &Type::Integer);
    let own = if *receiver == Type::Real {
        Type::Real
    } else {
        Type::Integer
    };
    let promoted = |other: &Type| {
        if *receiver == Type::Real || *other == Type::Real {
            Type::Real
        } else {
            Type::Integer
        }
    };

    let found = match (name, args) {
        ("+", [a]) if num(a) => (promoted(a), Builtin::Add),
        ("-", [a]) if num(a) => (promoted(a), Builtin::Sub),
        ("*", [a]) if num(a) => (promoted(a), Builtin::Mul),
        ("/", [a]) if num(a) => (Type::Real, Builtin::Div),
        ("-", []) => (own, Builtin::Neg),
        ("abs", []) => (own, Builtin::Abs),
        ("floor", []) => (Type::Integer, Builtin::Floor),
        ("round", []) => (Type::Integer, Builtin::Round),
        ("max", [a]) if num(a) => (promoted(a), Builtin::Max),
        ("min", [a]) if num(a) => (promoted(a), Builtin::Min),
        ("div", [a]) if int(receiver) && int(a) => (Type::Integer, Builtin::IntDiv),
        ("mod", [a]) if int(receiver) && int(a) => (Type::Integer, Builtin::Mod),
        (_, [a]) if num(a) => (Type::Boolean, ordering_op(name)?),
        _ => return None,
    };
    Some(found)
}

fn ordering_op(name: &str) -> Option<Builtin> {
    match name {
        "<" => Some(Builtin::Lt),
        ">" => Some(Builtin::Gt),
        "<=" => Some(Builtin::Le),
        ">=" => Some(Builtin::Ge),
        _ => None,
    }
}

fn string_op(ts: &TypeSystem<'_>, name: &str, args: &[Type]) -> Option<(Type, Builtin)> {
    let string = |t: &Type| ts.conforms_to(t, &Type::String);
    let int = |t: &Type| ts.conforms_to(t, &Type::Integer);
    let found = match (name, args) {
        ("+" | "concat", [a]) if string(a) => (Type::String, Builtin::Concat),
        ("size", []) => (Type::Integer, Builtin::Length),
        ("toUpper", []) => (Type::String, Builtin::ToUpper),
        ("toLower", []) => (Type::String, Builtin::ToLower),
        ("substring", [a, b]) if int(a) && int(b) => (Type::String, Builtin::Substring),
        ("toInteger", []) => (Type::Integer, Builtin::ToInteger),
        ("toReal", []) => (Type::Real, Builtin::ToReal),
        (_, [a]) if string(a) => (Type::Boolean, ordering_op(name)?),
        _ => return None,
    };
    Some(found)
}

fn date_op(ts: &TypeSystem<'_>, name: &str, args: &[Type]) -> Option<(Type, Builtin)> {
    match args {
        [a] if ts.conforms_to(a, &Type::Date) => Some((Type::Boolean, ordering_op(name)?)),
        _ => None,
    }
}

fn collection_op(
    ts: &TypeSystem<'_>,
    kind: CollectionKind,
    elem: &Type,
    name: &str,
    args: &[Type],
) -> Option<(Type, Builtin)> {
    use CollectionKind::*;

    let int = |t: &Type| ts.conforms_to(t, &Type::Integer);
    let concrete = kind != Collection;
    let ordered = kind.is_ordered();
    let same = || Type::collection(kind, elem.clone());
    let widened = |other: &Type| Type::collection(kind, ts.least_upper_bound(elem, other));

    let found = match (name, args) {
        ("size", []) => (Type::Integer, Builtin::Size),
        ("isEmpty", []) => (Type::Boolean, Builtin::IsEmpty),
        ("notEmpty", []) => (Type::Boolean, Builtin::NotEmpty),
        ("includes", [_]) => (Type::Boolean, Builtin::Includes),
        ("excludes", [_]) => (Type::Boolean, Builtin::Excludes),
        ("count", [_]) => (Type::Integer, Builtin::Count),
        ("includesAll", [a]) if a.is_collection() => (Type::Boolean, Builtin::IncludesAll),
        ("excludesAll", [a]) if a.is_collection() => (Type::Boolean, Builtin::ExcludesAll),
        ("sum", []) if ts.conforms_to(elem, &Type::Real) => {
            let ty = match elem {
                Type::Real => Type::Real,
                _ => Type::Integer,
            };
            (ty, Builtin::Sum)
        }
        ("max", []) if elem.is_orderable() => (elem.clone(), Builtin::MaxElement),
        ("min", []) if elem.is_orderable() => (elem.clone(), Builtin::MinElement),
        ("including", [a]) if concrete => (widened(a), Builtin::Including),
        ("excluding", [_]) if concrete => (same(), Builtin::Excluding),
        ("union", [Type::Collection(other, other_elem)]) => {
            let kind = match (kind, *other) {
                (Set, Set) => Set,
                (Set | Bag, Set | Bag) => Bag,
                (Sequence, Sequence) => Sequence,
                (OrderedSet, OrderedSet) => OrderedSet,
                _ => return None,
            };
            let elem = ts.least_upper_bound(elem, other_elem);
            (Type::collection(kind, elem), Builtin::Union)
        }
        ("intersection", [Type::Collection(other, _)]) => {
            let kind = match (kind, *other) {
                (Set, Set | Bag) | (Bag, Set) => Set,
                (Bag, Bag) => Bag,
                _ => return None,
            };
            (Type::collection(kind, elem.clone()), Builtin::Intersection)
        }
        ("-", [Type::Collection(Set | OrderedSet, _)]) if kind.is_unique() => {
            (same(), Builtin::Difference)
        }
        ("symmetricDifference", [Type::Collection(Set, _)]) if kind == Set => {
            (same(), Builtin::SymmetricDifference)
        }
        ("flatten", []) if concrete => (
            Type::collection(kind, elem.innermost_element().clone()),
            Builtin::Flatten,
        ),
        ("asSet", []) => (Type::set(elem.clone()), Builtin::AsSet),
        ("asBag", []) => (Type::bag(elem.clone()), Builtin::AsBag),
        ("asSequence", []) => (Type::sequence(elem.clone()), Builtin::AsSequence),
        ("asOrderedSet", []) => (Type::ordered_set(elem.clone()), Builtin::AsOrderedSet),
        ("first", []) if ordered => (elem.clone(), Builtin::First),
        ("last", []) if ordered => (elem.clone(), Builtin::Last),
        ("at", [a]) if ordered && int(a) => (elem.clone(), Builtin::At),
        ("append", [a]) if ordered => (widened(a), Builtin::Append),
        ("prepend", [a]) if ordered => (widened(a), Builtin::Prepend),
        ("indexOf", [_]) if ordered => (Type::Integer, Builtin::IndexOf),
        ("subSequence" | "subOrderedSet", [a, b]) if ordered && int(a) && int(b) => {
            (same(), Builtin::SubSequence)
        }
        _ => return None,
    };
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EmptySchema;

    fn resolve(receiver: &Type, name: &str, args: &[Type]) -> TypeResult<(Type, Builtin)> {
        resolve_operation(&TypeSystem::new(&EmptySchema), receiver, name, args)
    }

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(
            resolve(&Type::Integer, "+", &[Type::Integer]).unwrap(),
            (Type::Integer, Builtin::Add)
        );
        assert_eq!(
            resolve(&Type::Integer, "*", &[Type::Real]).unwrap(),
            (Type::Real, Builtin::Mul)
        );
        assert_eq!(
            resolve(&Type::Integer, "/", &[Type::Integer]).unwrap(),
            (Type::Real, Builtin::Div)
        );
        assert_eq!(
            resolve(&Type::Real, "<", &[Type::Integer]).unwrap(),
            (Type::Boolean, Builtin::Lt)
        );
    }

    #[test]
    fn test_integer_only_operations() {
        assert!(resolve(&Type::Integer, "div", &[Type::Integer]).is_ok());
        assert!(matches!(
            resolve(&Type::Real, "mod", &[Type::Integer]),
            Err(TypeError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn test_unknown_operation() {
        let err = resolve(&Type::Boolean, "+", &[Type::Integer]).unwrap_err();
        assert!(matches!(err, TypeError::UnknownOperation { ref name, .. } if name == "+"));
        assert!(resolve(&Type::String, "substring", &[Type::Integer]).is_err());
    }

    #[test]
    fn test_equality_is_universal() {
        let person = Type::object("Person");
        assert_eq!(
            resolve(&person, "=", &[Type::Integer]).unwrap(),
            (Type::Boolean, Builtin::Eq)
        );
        assert_eq!(
            resolve(&Type::Undefined, "oclIsUndefined", &[]).unwrap().1,
            Builtin::IsUndefined
        );
    }

    #[test]
    fn test_collection_signatures() {
        let seq = Type::sequence(Type::Integer);
        assert_eq!(
            resolve(&seq, "including", &[Type::Real]).unwrap().0,
            Type::sequence(Type::Real)
        );
        assert_eq!(resolve(&seq, "first", &[]).unwrap().0, Type::Integer);
        assert!(resolve(&Type::set(Type::Integer), "first", &[]).is_err());
        assert_eq!(
            resolve(&Type::set(Type::Integer), "union", &[Type::bag(Type::Integer)])
                .unwrap()
                .0,
            Type::bag(Type::Integer)
        );
        assert!(resolve(&seq, "union", &[Type::set(Type::Integer)]).is_err());
        assert_eq!(
            resolve(&Type::set(Type::set(Type::String)), "flatten", &[])
                .unwrap()
                .0,
            Type::set(Type::String)
        );
        assert_eq!(
            resolve(&Type::bag(Type::Real), "sum", &[]).unwrap(),
            (Type::Real, Builtin::Sum)
        );
        assert!(resolve(&Type::bag(Type::String), "sum", &[]).is_err());
    }

    #[test]
    fn test_untyped_null_receiver() {
        assert_eq!(
            resolve(&Type::Undefined, "+", &[Type::Integer]).unwrap(),
            (Type::Integer, Builtin::Add)
        );
        assert_eq!(
            resolve(&Type::Undefined, "and", &[Type::Boolean]).unwrap(),
            (Type::Boolean, Builtin::And)
        );
    }

    #[test]
    fn test_strictness() {
        assert_eq!(Builtin::Add.strictness(), Strictness::Strict);
        assert_eq!(Builtin::Including.strictness(), Strictness::Receiver);
        assert_eq!(Builtin::Eq.strictness(), Strictness::NonStrict);
        assert!(Builtin::Implies.is_connective());
        assert!(!Builtin::Not.is_connective());
    }
}
