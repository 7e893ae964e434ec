//! Typed expression trees.

use chrono::NaiveDateTime;
use ocl_types::{Builtin, CollectionKind, Type};

/// A type-checked expression node.
///
/// The result type is fixed when the node is built and never changes.
/// Nodes own their children exclusively.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

impl Expr {
    pub(crate) fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }
}

/// A constant value appearing in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    /// `None` is the unlimited value `*`.
    UnlimitedNatural(Option<u64>),
    Real(f64),
    String(String),
    Date(NaiveDateTime),
    Undefined,
}

impl Literal {
    /// Static type of the literal. `Undefined` may be given a more specific
    /// type by the builder.
    pub fn ty(&self) -> Type {
        match self {
            Literal::Boolean(_) => Type::Boolean,
            Literal::Integer(_) => Type::Integer,
            Literal::UnlimitedNatural(_) => Type::UnlimitedNatural,
            Literal::Real(_) => Type::Real,
            Literal::String(_) => Type::String,
            Literal::Date(_) => Type::Date,
            Literal::Undefined => Type::Undefined,
        }
    }
}

/// Iterator-based collection operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    ForAll,
    Exists,
    One,
    Any,
    Select,
    Reject,
    Collect,
    CollectNested,
    Iterate,
    IsUnique,
    SortedBy,
    Closure,
}

impl LoopKind {
    pub fn name(self) -> &'static str {
        match self {
            LoopKind::ForAll => "forAll",
            LoopKind::Exists => "exists",
            LoopKind::One => "one",
            LoopKind::Any => "any",
            LoopKind::Select => "select",
            LoopKind::Reject => "reject",
            LoopKind::Collect => "collect",
            LoopKind::CollectNested => "collectNested",
            LoopKind::Iterate => "iterate",
            LoopKind::IsUnique => "isUnique",
            LoopKind::SortedBy => "sortedBy",
            LoopKind::Closure => "closure",
        }
    }

    /// Loops whose body is a predicate.
    pub fn has_boolean_body(self) -> bool {
        matches!(
            self,
            LoopKind::ForAll
                | LoopKind::Exists
                | LoopKind::One
                | LoopKind::Any
                | LoopKind::Select
                | LoopKind::Reject
        )
    }
}

/// The three type test operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTestKind {
    IsKindOf,
    IsTypeOf,
    AsType,
}

impl TypeTestKind {
    pub fn name(self) -> &'static str {
        match self {
            TypeTestKind::IsKindOf => "oclIsKindOf",
            TypeTestKind::IsTypeOf => "oclIsTypeOf",
            TypeTestKind::AsType => "oclAsType",
        }
    }
}

/// What a navigation step reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    Attribute(String),
    AssociationEnd {
        role: String,
        many: bool,
        ordered: bool,
    },
    TupleField(String),
}

impl Property {
    pub fn name(&self) -> &str {
        match self {
            Property::Attribute(name) | Property::TupleField(name) => name,
            Property::AssociationEnd { role, .. } => role,
        }
    }
}

/// Target of an operation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Builtin(Builtin),
    /// Query operation defined in the model; the body is looked up at
    /// evaluation time from the receiver's dynamic class.
    User,
}

/// Accumulator of an `iterate` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub name: String,
    pub ty: Type,
    pub init: Box<Expr>,
}

/// One part of a collection literal.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionPart {
    Item(Expr),
    /// Inclusive integer range `first..last`.
    Range(Expr, Expr),
}

/// Expression node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Constant.
    Const(Literal),
    /// Reference to a bound variable.
    Variable(String),
    /// Attribute, association end or tuple part access.
    ///
    /// With `shorthand` set the source is a collection and the property is
    /// read from every element (implicit `collect`).
    Navigation {
        source: Box<Expr>,
        property: Property,
        shorthand: bool,
    },
    /// Operator or operation call on a receiver.
    OperationCall {
        name: String,
        callee: Callee,
        source: Box<Expr>,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Let {
        name: String,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    Loop {
        kind: LoopKind,
        source: Box<Expr>,
        iterators: Vec<String>,
        body: Box<Expr>,
        accumulator: Option<Accumulator>,
    },
    /// `C.allInstances()`.
    AllInstances(String),
    TypeTest {
        kind: TypeTestKind,
        source: Box<Expr>,
        target: Type,
    },
    CollectionLiteral {
        kind: CollectionKind,
        parts: Vec<CollectionPart>,
    },
    TupleLiteral(Vec<(String, Expr)>),
}

impl ExprKind {
    /// Short name of the node kind, for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            ExprKind::Const(_) => "literal",
            ExprKind::Variable(_) => "variable",
            ExprKind::Navigation { .. } => "navigation",
            ExprKind::OperationCall { .. } => "call",
            ExprKind::If { .. } => "if",
            ExprKind::Let { .. } => "let",
            ExprKind::Loop { kind, .. } => kind.name(),
            ExprKind::AllInstances(_) => "allInstances",
            ExprKind::TypeTest { kind, .. } => kind.name(),
            ExprKind::CollectionLiteral { .. } => "collection literal",
            ExprKind::TupleLiteral(_) => "tuple literal",
        }
    }
}

impl Expr {
    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Const(_) | ExprKind::Variable(_) | ExprKind::AllInstances(_) => Vec::new(),
            ExprKind::Navigation { source, .. } | ExprKind::TypeTest { source, .. } => {
                vec![source.as_ref()]
            }
            ExprKind::OperationCall { source, args, .. } => {
                let mut out = vec![source.as_ref()];
                out.extend(args.iter());
                out
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => vec![cond.as_ref(), then_branch.as_ref(), else_branch.as_ref()],
            ExprKind::Let { value, body, .. } => vec![value.as_ref(), body.as_ref()],
            ExprKind::Loop {
                source,
                body,
                accumulator,
                ..
            } => {
                let mut out = vec![source.as_ref()];
                if let Some(acc) = accumulator {
                    out.push(acc.init.as_ref());
                }
                out.push(body.as_ref());
                out
            }
            ExprKind::CollectionLiteral { parts, .. } => parts
                .iter()
                .flat_map(|part| match part {
                    CollectionPart::Item(e) => vec![e],
                    CollectionPart::Range(lo, hi) => vec![lo, hi],
                })
                .collect(),
            ExprKind::TupleLiteral(fields) => fields.iter().map(|(_, e)| e).collect(),
        }
    }

    /// Number of nodes in the tree rooted here.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }
}
