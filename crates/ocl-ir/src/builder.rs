//! Checked construction of expression trees.
//!
//! Trees are built bottom-up. Every constructor validates its operands
//! against the type system and computes the node's result type, so a tree
//! that exists is a tree that type-checks. Binders (`let`, loops) take the
//! body as a closure that is run with the bound names in scope, which makes
//! unbound variable references a construction error as well.

use crate::expr::{
    Accumulator, Callee, CollectionPart, Expr, ExprKind, Literal, LoopKind, Property,
    TypeTestKind,
};
use chrono::NaiveDateTime;
use ocl_types::{
    resolve_operation, CollectionKind, ModelSchema, TupleType, Type, TypeEnv, TypeError,
    TypeResult, TypeSystem,
};
use std::collections::BTreeSet;

/// Builder for type-checked expression trees over one model schema.
pub struct ExprBuilder<'s> {
    ts: TypeSystem<'s>,
    env: TypeEnv,
}

impl<'s> ExprBuilder<'s> {
    pub fn new(schema: &'s dyn ModelSchema) -> Self {
        Self {
            ts: TypeSystem::new(schema),
            env: TypeEnv::new(),
        }
    }

    pub fn type_system(&self) -> &TypeSystem<'s> {
        &self.ts
    }

    /// Declare a free variable (such as `self` or an operation parameter)
    /// that will be supplied in the initial bindings at evaluation time.
    pub fn declare(&mut self, name: impl Into<String>, ty: Type) -> &mut Self {
        self.env.bind(name, ty);
        self
    }

    /// Resolve a class name to its object type.
    pub fn class_type(&self, name: &str) -> TypeResult<Type> {
        self.ts
            .schema()
            .resolve_class(name)
            .map(Type::Object)
            .ok_or_else(|| TypeError::UndefinedClass {
                name: name.to_string(),
            })
    }

    // === Constants ===

    pub fn constant(&self, literal: Literal) -> Expr {
        let ty = literal.ty();
        Expr::new(ExprKind::Const(literal), ty)
    }

    pub fn boolean(&self, b: bool) -> Expr {
        self.constant(Literal::Boolean(b))
    }

    pub fn integer(&self, n: i64) -> Expr {
        self.constant(Literal::Integer(n))
    }

    /// UnlimitedNatural constant; `None` is `*`.
    pub fn unlimited_natural(&self, n: Option<u64>) -> Expr {
        self.constant(Literal::UnlimitedNatural(n))
    }

    pub fn real(&self, r: f64) -> Expr {
        self.constant(Literal::Real(r))
    }

    pub fn string(&self, s: impl Into<String>) -> Expr {
        self.constant(Literal::String(s.into()))
    }

    pub fn date(&self, d: NaiveDateTime) -> Expr {
        self.constant(Literal::Date(d))
    }

    /// The untyped undefined value (`null`).
    pub fn undefined(&self) -> Expr {
        self.constant(Literal::Undefined)
    }

    /// The undefined value with a declared static type (`oclUndefined(T)`).
    pub fn undefined_of(&self, ty: Type) -> Expr {
        Expr::new(ExprKind::Const(Literal::Undefined), ty)
    }

    // === Variables and navigation ===

    pub fn variable(&self, name: &str) -> TypeResult<Expr> {
        let ty = self
            .env
            .lookup(name)
            .cloned()
            .ok_or_else(|| TypeError::UndefinedVariable {
                name: name.to_string(),
            })?;
        Ok(Expr::new(ExprKind::Variable(name.to_string()), ty))
    }

    /// `source.name` for an attribute, association end or tuple part.
    ///
    /// On a collection of objects this is the implicit collect: the result
    /// is a `Bag` (or `Sequence` for ordered sources) with to-many ends
    /// flattened one level.
    pub fn navigate(&self, source: Expr, name: &str) -> TypeResult<Expr> {
        let (property, ty, shorthand) = match &source.ty {
            Type::Object(class) => {
                let (property, ty) = self.resolve_property(class, name)?;
                (property, ty, false)
            }
            Type::Tuple(tuple) => {
                let ty = tuple.get_field(name).cloned().ok_or_else(|| {
                    TypeError::UndefinedProperty {
                        ty: source.ty.clone(),
                        name: name.to_string(),
                    }
                })?;
                (Property::TupleField(name.to_string()), ty, false)
            }
            Type::Collection(kind, elem) => match elem.as_ref() {
                Type::Object(class) => {
                    let (property, ty) = self.resolve_property(class, name)?;
                    let elem_ty = match ty {
                        Type::Collection(_, inner) => *inner,
                        other => other,
                    };
                    let target = if kind.is_ordered() {
                        CollectionKind::Sequence
                    } else {
                        CollectionKind::Bag
                    };
                    (property, Type::collection(target, elem_ty), true)
                }
                _ => {
                    return Err(TypeError::UndefinedProperty {
                        ty: source.ty.clone(),
                        name: name.to_string(),
                    })
                }
            },
            other => {
                return Err(TypeError::UndefinedProperty {
                    ty: other.clone(),
                    name: name.to_string(),
                })
            }
        };
        Ok(Expr::new(
            ExprKind::Navigation {
                source: Box::new(source),
                property,
                shorthand,
            },
            ty,
        ))
    }

    fn resolve_property(&self, class: &str, name: &str) -> TypeResult<(Property, Type)> {
        let schema = self.ts.schema();
        if let Some(ty) = schema.attribute_type(class, name) {
            return Ok((Property::Attribute(name.to_string()), ty));
        }
        if let Some(end) = schema.association_end(class, name) {
            let ty = end.ty();
            let property = Property::AssociationEnd {
                role: name.to_string(),
                many: end.many,
                ordered: end.ordered,
            };
            return Ok((property, ty));
        }
        Err(TypeError::UndefinedProperty {
            ty: Type::object(class),
            name: name.to_string(),
        })
    }

    // === Operations ===

    /// `source.name(args)`: a model query operation if the receiver's class
    /// declares one, otherwise a built-in operation or operator.
    pub fn call(&self, source: Expr, name: &str, args: Vec<Expr>) -> TypeResult<Expr> {
        if let Type::Object(class) = &source.ty {
            if let Some(sig) = self.ts.schema().operation(class, name) {
                if sig.params.len() != args.len() {
                    return Err(TypeError::ArityMismatch {
                        operation: format!("{}::{}", class, name),
                        expected: sig.params.len(),
                        found: args.len(),
                    });
                }
                for (arg, (param, param_ty)) in args.iter().zip(&sig.params) {
                    if !self.ts.conforms_to(&arg.ty, param_ty) {
                        return Err(TypeError::TypeMismatch {
                            expected: param_ty.clone(),
                            found: arg.ty.clone(),
                            context: format!("argument {} of {}::{}", param, class, name),
                        });
                    }
                }
                return Ok(Expr::new(
                    ExprKind::OperationCall {
                        name: name.to_string(),
                        callee: Callee::User,
                        source: Box::new(source),
                        args,
                    },
                    sig.result,
                ));
            }
        }

        let arg_types: Vec<Type> = args.iter().map(|a| a.ty.clone()).collect();
        let (ty, op) = resolve_operation(&self.ts, &source.ty, name, &arg_types)?;
        Ok(Expr::new(
            ExprKind::OperationCall {
                name: name.to_string(),
                callee: Callee::Builtin(op),
                source: Box::new(source),
                args,
            },
            ty,
        ))
    }

    /// Infix operator `left op right`.
    pub fn binary(&self, left: Expr, op: &str, right: Expr) -> TypeResult<Expr> {
        self.call(left, op, vec![right])
    }

    /// Prefix operator (`not`, unary `-`).
    pub fn unary(&self, op: &str, operand: Expr) -> TypeResult<Expr> {
        self.call(operand, op, Vec::new())
    }

    // === Control ===

    pub fn if_then_else(&self, cond: Expr, then_branch: Expr, else_branch: Expr) -> TypeResult<Expr> {
        self.expect_bool(&cond.ty, "if condition")?;
        let ty = self.ts.least_upper_bound(&then_branch.ty, &else_branch.ty);
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            ty,
        ))
    }

    /// `let name [: declared] = value in body`.
    pub fn let_in<F>(
        &mut self,
        name: &str,
        declared: Option<Type>,
        value: Expr,
        body: F,
    ) -> TypeResult<Expr>
    where
        F: FnOnce(&mut Self) -> TypeResult<Expr>,
    {
        let var_ty = match declared {
            Some(ty) => {
                self.expect_conforms(&value.ty, &ty, || format!("let {}", name))?;
                ty
            }
            None => value.ty.clone(),
        };
        let body = self.scoped(&[(name, var_ty)], body)?;
        let ty = body.ty.clone();
        Ok(Expr::new(
            ExprKind::Let {
                name: name.to_string(),
                value: Box::new(value),
                body: Box::new(body),
            },
            ty,
        ))
    }

    // === Loops ===

    /// Any loop expression except `iterate` (see [`ExprBuilder::iterate`]).
    ///
    /// `forAll` and `exists` accept several iterator variables; every other
    /// kind takes exactly one.
    pub fn loop_expr<F>(
        &mut self,
        kind: LoopKind,
        source: Expr,
        iterators: &[&str],
        body: F,
    ) -> TypeResult<Expr>
    where
        F: FnOnce(&mut Self) -> TypeResult<Expr>,
    {
        let multi = matches!(kind, LoopKind::ForAll | LoopKind::Exists);
        if kind == LoopKind::Iterate || iterators.is_empty() || (iterators.len() > 1 && !multi) {
            return Err(TypeError::InvalidIterators {
                kind: kind.name().to_string(),
                found: iterators.len(),
            });
        }
        let (src_kind, elem) = collection_parts(&source.ty)?;

        let bindings: Vec<(&str, Type)> = iterators.iter().map(|it| (*it, elem.clone())).collect();
        let body = self.scoped(&bindings, body)?;
        let ty = self.loop_result_type(kind, src_kind, &elem, &body.ty)?;

        Ok(Expr::new(
            ExprKind::Loop {
                kind,
                source: Box::new(source),
                iterators: iterators.iter().map(|s| s.to_string()).collect(),
                body: Box::new(body),
                accumulator: None,
            },
            ty,
        ))
    }

    /// `source->iterate(iterator; acc : acc_ty = init | body)`.
    pub fn iterate<F>(
        &mut self,
        source: Expr,
        iterator: &str,
        acc: &str,
        acc_ty: Type,
        init: Expr,
        body: F,
    ) -> TypeResult<Expr>
    where
        F: FnOnce(&mut Self) -> TypeResult<Expr>,
    {
        let (_, elem) = collection_parts(&source.ty)?;
        self.expect_conforms(&init.ty, &acc_ty, || format!("initial value of {}", acc))?;

        let body = self.scoped(&[(iterator, elem), (acc, acc_ty.clone())], body)?;
        self.expect_conforms(&body.ty, &acc_ty, || "iterate body".to_string())?;

        Ok(Expr::new(
            ExprKind::Loop {
                kind: LoopKind::Iterate,
                source: Box::new(source),
                iterators: vec![iterator.to_string()],
                body: Box::new(body),
                accumulator: Some(Accumulator {
                    name: acc.to_string(),
                    ty: acc_ty.clone(),
                    init: Box::new(init),
                }),
            },
            acc_ty,
        ))
    }

    fn loop_result_type(
        &self,
        kind: LoopKind,
        src_kind: CollectionKind,
        elem: &Type,
        body_ty: &Type,
    ) -> TypeResult<Type> {
        if kind.has_boolean_body() {
            self.expect_bool(body_ty, &format!("{} body", kind.name()))?;
        }
        let ty = match kind {
            LoopKind::ForAll | LoopKind::Exists | LoopKind::One | LoopKind::IsUnique => {
                Type::Boolean
            }
            LoopKind::Any => elem.clone(),
            LoopKind::Select | LoopKind::Reject => Type::collection(src_kind, elem.clone()),
            LoopKind::Collect => Type::bag(match body_ty {
                Type::Collection(_, inner) => inner.as_ref().clone(),
                other => other.clone(),
            }),
            LoopKind::CollectNested => Type::bag(body_ty.clone()),
            LoopKind::SortedBy => {
                if !body_ty.is_orderable() {
                    return Err(TypeError::NotOrderable {
                        found: body_ty.clone(),
                    });
                }
                if src_kind.is_unique() {
                    Type::ordered_set(elem.clone())
                } else {
                    Type::sequence(elem.clone())
                }
            }
            LoopKind::Closure => {
                let produced = body_ty.element_type().unwrap_or(body_ty);
                self.expect_conforms(produced, elem, || "closure body".to_string())?;
                if src_kind.is_ordered() {
                    Type::ordered_set(elem.clone())
                } else {
                    Type::set(elem.clone())
                }
            }
            LoopKind::Iterate => {
                return Err(TypeError::InvalidIterators {
                    kind: kind.name().to_string(),
                    found: 1,
                })
            }
        };
        Ok(ty)
    }

    // === Model queries ===

    /// `C.allInstances()`.
    pub fn all_instances(&self, class: &str) -> TypeResult<Expr> {
        let ty = self.class_type(class)?;
        let Type::Object(canonical) = &ty else {
            return Err(TypeError::UndefinedClass {
                name: class.to_string(),
            });
        };
        Ok(Expr::new(
            ExprKind::AllInstances(canonical.clone()),
            Type::set(ty.clone()),
        ))
    }

    /// `oclIsKindOf`, `oclIsTypeOf` or `oclAsType` against `target`.
    pub fn type_test(&self, kind: TypeTestKind, source: Expr, target: Type) -> TypeResult<Expr> {
        let target = match target {
            Type::Object(class) => self.class_type(&class)?,
            other => other,
        };
        let ty = match kind {
            TypeTestKind::IsKindOf | TypeTestKind::IsTypeOf => Type::Boolean,
            TypeTestKind::AsType => {
                let related = self.ts.conforms_to(&target, &source.ty)
                    || self.ts.conforms_to(&source.ty, &target);
                if !related {
                    return Err(TypeError::InvalidCast {
                        from: source.ty.clone(),
                        to: target,
                    });
                }
                target.clone()
            }
        };
        Ok(Expr::new(
            ExprKind::TypeTest {
                kind,
                source: Box::new(source),
                target,
            },
            ty,
        ))
    }

    // === Literals ===

    /// Collection literal such as `Sequence{1, 3..5}`.
    ///
    /// The element type is the least upper bound of the parts, or `elem`
    /// when given (every part must conform to it). An empty literal without
    /// `elem` has element type `OclVoid`. The abstract `Collection` kind
    /// builds a `Bag`.
    pub fn collection(
        &self,
        kind: CollectionKind,
        parts: Vec<CollectionPart>,
        elem: Option<Type>,
    ) -> TypeResult<Expr> {
        let kind = match kind {
            CollectionKind::Collection => CollectionKind::Bag,
            other => other,
        };
        let mut part_types = Vec::with_capacity(parts.len());
        for part in &parts {
            match part {
                CollectionPart::Item(e) => part_types.push(e.ty.clone()),
                CollectionPart::Range(lo, hi) => {
                    self.expect_conforms(&lo.ty, &Type::Integer, || "range start".to_string())?;
                    self.expect_conforms(&hi.ty, &Type::Integer, || "range end".to_string())?;
                    part_types.push(Type::Integer);
                }
            }
        }
        let elem_ty = match elem {
            Some(declared) => {
                for ty in &part_types {
                    self.expect_conforms(ty, &declared, || format!("{} literal", kind))?;
                }
                declared
            }
            None => self.ts.least_upper_bound_all(&part_types),
        };
        Ok(Expr::new(
            ExprKind::CollectionLiteral { kind, parts },
            Type::collection(kind, elem_ty),
        ))
    }

    /// `Tuple{name = value, ...}`.
    pub fn tuple(&self, fields: Vec<(String, Expr)>) -> TypeResult<Expr> {
        let mut seen = BTreeSet::new();
        for (name, _) in &fields {
            if !seen.insert(name.as_str()) {
                return Err(TypeError::DuplicateTupleField { name: name.clone() });
            }
        }
        let ty = Type::Tuple(TupleType::from_fields(
            fields.iter().map(|(name, e)| (name.clone(), e.ty.clone())),
        ));
        Ok(Expr::new(ExprKind::TupleLiteral(fields), ty))
    }

    // === Helpers ===

    /// Run `body` with `bindings` in a fresh scope, popping it afterwards
    /// whether or not the body built successfully.
    fn scoped<F>(&mut self, bindings: &[(&str, Type)], body: F) -> TypeResult<Expr>
    where
        F: FnOnce(&mut Self) -> TypeResult<Expr>,
    {
        self.env.push_scope();
        for (name, ty) in bindings {
            self.env.bind(*name, ty.clone());
        }
        let result = body(self);
        self.env.pop_scope();
        result
    }

    fn expect_bool(&self, ty: &Type, context: &str) -> TypeResult<()> {
        if self.ts.conforms_to(ty, &Type::Boolean) {
            Ok(())
        } else {
            Err(TypeError::ExpectedBool {
                found: ty.clone(),
                context: context.to_string(),
            })
        }
    }

    fn expect_conforms(
        &self,
        found: &Type,
        expected: &Type,
        context: impl FnOnce() -> String,
    ) -> TypeResult<()> {
        if self.ts.conforms_to(found, expected) {
            Ok(())
        } else {
            Err(TypeError::TypeMismatch {
                expected: expected.clone(),
                found: found.clone(),
                context: context(),
            })
        }
    }
}

fn collection_parts(ty: &Type) -> TypeResult<(CollectionKind, Type)> {
    match ty {
        Type::Collection(kind, elem) => Ok((*kind, elem.as_ref().clone())),
        other => Err(TypeError::NotACollection { ty: other.clone() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocl_types::{AssociationEnd, OperationSig};

    /// Person(name: String, age: Integer) with `friends` (many), `spouse`
    /// (single) and `children` (ordered); Student specializes Person.
    struct People;

    impl ModelSchema for People {
        fn resolve_class(&self, name: &str) -> Option<String> {
            match name {
                "Human" => Some("Person".to_string()),
                _ => ["Person", "Student"].contains(&name).then(|| name.to_string()),
            }
        }

        fn superclasses(&self, class: &str) -> Vec<String> {
            match class {
                "Student" => vec!["Person".to_string()],
                _ => Vec::new(),
            }
        }

        fn attribute_type(&self, class: &str, name: &str) -> Option<Type> {
            match (class, name) {
                (_, "name") => Some(Type::String),
                (_, "age") => Some(Type::Integer),
                ("Student", "school") => Some(Type::String),
                _ => None,
            }
        }

        fn association_end(&self, _class: &str, role: &str) -> Option<AssociationEnd> {
            match role {
                "friends" => Some(AssociationEnd::many("Person")),
                "spouse" => Some(AssociationEnd::single("Person")),
                "children" => Some(AssociationEnd::ordered("Person")),
                _ => None,
            }
        }

        fn operation(&self, _class: &str, name: &str) -> Option<OperationSig> {
            match name {
                "olderThan" => Some(OperationSig {
                    params: vec![("years".to_string(), Type::Integer)],
                    result: Type::Boolean,
                }),
                _ => None,
            }
        }
    }

    fn builder() -> ExprBuilder<'static> {
        let mut b = ExprBuilder::new(&People);
        b.declare("self", Type::object("Person"));
        b
    }

    fn seq(b: &ExprBuilder<'_>, items: &[i64]) -> Expr {
        let parts = items
            .iter()
            .map(|n| CollectionPart::Item(b.integer(*n)))
            .collect();
        b.collection(CollectionKind::Sequence, parts, None).unwrap()
    }

    #[test]
    fn test_arithmetic_types() {
        let b = builder();
        let sum = b.binary(b.integer(1), "+", b.real(2.5)).unwrap();
        assert_eq!(sum.ty, Type::Real);
        let err = b.binary(b.boolean(true), "+", b.integer(1)).unwrap_err();
        assert!(matches!(err, TypeError::UnknownOperation { .. }));
    }

    #[test]
    fn test_navigation_types() {
        let b = builder();
        let me = || b.variable("self").unwrap();
        assert_eq!(b.navigate(me(), "name").unwrap().ty, Type::String);
        assert_eq!(b.navigate(me(), "spouse").unwrap().ty, Type::object("Person"));
        assert_eq!(
            b.navigate(me(), "friends").unwrap().ty,
            Type::set(Type::object("Person"))
        );
        assert_eq!(
            b.navigate(me(), "children").unwrap().ty,
            Type::ordered_set(Type::object("Person"))
        );
        assert!(matches!(
            b.navigate(me(), "salary"),
            Err(TypeError::UndefinedProperty { .. })
        ));
    }

    #[test]
    fn test_shorthand_collect_types() {
        let b = builder();
        let friends = b.navigate(b.variable("self").unwrap(), "friends").unwrap();
        let ages = b.navigate(friends.clone(), "age").unwrap();
        assert_eq!(ages.ty, Type::bag(Type::Integer));
        let friends_of_friends = b.navigate(friends, "friends").unwrap();
        assert_eq!(friends_of_friends.ty, Type::bag(Type::object("Person")));
        let children = b.navigate(b.variable("self").unwrap(), "children").unwrap();
        assert_eq!(
            b.navigate(children, "name").unwrap().ty,
            Type::sequence(Type::String)
        );
    }

    #[test]
    fn test_unbound_variable_is_rejected() {
        let b = builder();
        assert_eq!(
            b.variable("x").unwrap_err(),
            TypeError::UndefinedVariable {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn test_if_merges_branch_types() {
        let b = builder();
        let e = b
            .if_then_else(b.boolean(true), b.integer(1), b.real(2.0))
            .unwrap();
        assert_eq!(e.ty, Type::Real);
        let e = b
            .if_then_else(b.boolean(true), b.integer(1), b.string("x"))
            .unwrap();
        assert_eq!(e.ty, Type::OclAny);
        assert!(matches!(
            b.if_then_else(b.integer(1), b.integer(1), b.integer(2)),
            Err(TypeError::ExpectedBool { .. })
        ));
    }

    #[test]
    fn test_let_scopes_variable() {
        let mut b = builder();
        let value = b.integer(3);
        let e = b
            .let_in("x", None, value, |b| {
                let x = b.variable("x")?;
                b.binary(x, "*", b.integer(2))
            })
            .unwrap();
        assert_eq!(e.ty, Type::Integer);
        assert!(b.variable("x").is_err());

        let value = b.string("no");
        let err = b
            .let_in("y", Some(Type::Integer), value, |b| b.variable("y"))
            .unwrap_err();
        assert!(matches!(err, TypeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_loop_result_types() {
        let mut b = builder();
        let source = seq(&b, &[1, 2, 3]);
        let select = b
            .loop_expr(LoopKind::Select, source.clone(), &["x"], |b| {
                b.binary(b.variable("x")?, ">", b.integer(1))
            })
            .unwrap();
        assert_eq!(select.ty, Type::sequence(Type::Integer));

        let collect = b
            .loop_expr(LoopKind::Collect, source.clone(), &["x"], |b| {
                b.binary(b.variable("x")?, "*", b.variable("x")?)
            })
            .unwrap();
        assert_eq!(collect.ty, Type::bag(Type::Integer));

        let sorted = b
            .loop_expr(LoopKind::SortedBy, source.clone(), &["x"], |b| {
                b.unary("-", b.variable("x")?)
            })
            .unwrap();
        assert_eq!(sorted.ty, Type::sequence(Type::Integer));

        let any = b
            .loop_expr(LoopKind::Any, source, &["x"], |b| {
                b.binary(b.variable("x")?, "=", b.integer(2))
            })
            .unwrap();
        assert_eq!(any.ty, Type::Integer);
        assert!(b.variable("x").is_err());
    }

    #[test]
    fn test_loop_checks() {
        let mut b = builder();
        let source = seq(&b, &[1]);
        let err = b
            .loop_expr(LoopKind::Select, source.clone(), &["x"], |b| b.variable("x"))
            .unwrap_err();
        assert!(matches!(err, TypeError::ExpectedBool { .. }));

        let err = b
            .loop_expr(LoopKind::Select, source.clone(), &["x", "y"], |b| {
                Ok(b.boolean(true))
            })
            .unwrap_err();
        assert!(matches!(err, TypeError::InvalidIterators { found: 2, .. }));

        let forall = b
            .loop_expr(LoopKind::ForAll, source, &["x", "y"], |b| {
                b.binary(b.variable("x")?, "<=", b.variable("y")?)
            })
            .unwrap();
        assert_eq!(forall.ty, Type::Boolean);

        let err = b
            .loop_expr(LoopKind::Exists, b.integer(1), &["x"], |b| Ok(b.boolean(true)))
            .unwrap_err();
        assert!(matches!(err, TypeError::NotACollection { .. }));
    }

    #[test]
    fn test_iterate_accumulator_type() {
        let mut b = builder();
        let source = seq(&b, &[1, 2]);
        let init = b.integer(0);
        let e = b
            .iterate(source.clone(), "x", "acc", Type::Integer, init, |b| {
                b.binary(b.variable("acc")?, "+", b.variable("x")?)
            })
            .unwrap();
        assert_eq!(e.ty, Type::Integer);

        let init = b.integer(0);
        let err = b
            .iterate(source, "x", "acc", Type::Integer, init, |b| {
                b.binary(b.variable("acc")?, "/", b.variable("x")?)
            })
            .unwrap_err();
        assert!(matches!(err, TypeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_user_operation_signature() {
        let b = builder();
        let me = || b.variable("self").unwrap();
        let call = b.call(me(), "olderThan", vec![b.integer(30)]).unwrap();
        assert_eq!(call.ty, Type::Boolean);
        assert!(matches!(
            b.call(me(), "olderThan", vec![]),
            Err(TypeError::ArityMismatch { expected: 1, found: 0, .. })
        ));
        assert!(matches!(
            b.call(me(), "olderThan", vec![b.string("x")]),
            Err(TypeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_type_tests() {
        let b = builder();
        let me = || b.variable("self").unwrap();
        let cast = b
            .type_test(TypeTestKind::AsType, me(), Type::object("Student"))
            .unwrap();
        assert_eq!(cast.ty, Type::object("Student"));
        assert!(matches!(
            b.type_test(TypeTestKind::AsType, me(), Type::Integer),
            Err(TypeError::InvalidCast { .. })
        ));
        assert!(matches!(
            b.type_test(TypeTestKind::IsKindOf, me(), Type::object("Robot")),
            Err(TypeError::UndefinedClass { .. })
        ));
    }

    #[test]
    fn test_type_test_stores_canonical_class() {
        let b = builder();
        let me = || b.variable("self").unwrap();
        let test = b
            .type_test(TypeTestKind::IsTypeOf, me(), Type::object("Human"))
            .unwrap();
        assert_eq!(test.ty, Type::Boolean);
        let ExprKind::TypeTest { target, .. } = &test.kind else {
            panic!("expected a type test, got {:?}", test.kind);
        };
        assert_eq!(target, &Type::object("Person"));
        let cast = b
            .type_test(TypeTestKind::AsType, me(), Type::object("Human"))
            .unwrap();
        assert_eq!(cast.ty, Type::object("Person"));
    }

    #[test]
    fn test_collection_and_tuple_literals() {
        let b = builder();
        let mixed = b
            .collection(
                CollectionKind::Set,
                vec![
                    CollectionPart::Item(b.integer(1)),
                    CollectionPart::Item(b.real(2.0)),
                ],
                None,
            )
            .unwrap();
        assert_eq!(mixed.ty, Type::set(Type::Real));

        let range = b
            .collection(
                CollectionKind::Sequence,
                vec![CollectionPart::Range(b.integer(1), b.integer(5))],
                None,
            )
            .unwrap();
        assert_eq!(range.ty, Type::sequence(Type::Integer));

        let empty = b
            .collection(CollectionKind::Bag, Vec::new(), Some(Type::String))
            .unwrap();
        assert_eq!(empty.ty, Type::bag(Type::String));

        let err = b
            .tuple(vec![
                ("a".to_string(), b.integer(1)),
                ("a".to_string(), b.integer(2)),
            ])
            .unwrap_err();
        assert!(matches!(err, TypeError::DuplicateTupleField { .. }));
    }

    #[test]
    fn test_all_instances() {
        let b = builder();
        let e = b.all_instances("Student").unwrap();
        assert_eq!(e.ty, Type::set(Type::object("Student")));
        assert!(b.all_instances("Ghost").is_err());
    }
}
