//! Runtime values.
//!
//! Values are immutable. Heap variants (strings, collections, tuples) sit
//! behind `Arc` so cloning is O(1).
//!
//! Collections are normalized when they are constructed. A `Set` is kept
//! sorted without duplicates and a `Bag` is kept sorted, so structural
//! comparison of the element vectors gives OCL equality: sets and bags
//! compare without order, sequences and ordered sets with it. An
//! `OrderedSet` drops later duplicates and keeps first occurrences.

use chrono::NaiveDateTime;
use ocl_types::{CollectionKind, TupleType, Type};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Identity of a model object.
///
/// Equality and ordering use the identity only; `class` and `name` are
/// carried for dispatch and display.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    pub id: u64,
    pub class: Arc<str>,
    pub name: Arc<str>,
}

impl ObjectRef {
    pub fn new(id: u64, class: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            class: class.into(),
            name: name.into(),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl PartialOrd for ObjectRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Boolean(bool),
    Integer(i64),
    /// The UnlimitedNatural `*`. Finite UnlimitedNatural values are
    /// represented as `Integer`.
    Unlimited,
    /// Always finite.
    Real(OrderedFloat<f64>),
    String(Arc<str>),
    Date(NaiveDateTime),
    Object(ObjectRef),
    Collection(Arc<CollectionValue>),
    Tuple(Arc<BTreeMap<String, Value>>),
}

/// A collection value with its kind and element type.
#[derive(Debug, Clone)]
pub struct CollectionValue {
    kind: CollectionKind,
    elem_type: Type,
    elems: Vec<Value>,
}

// === Construction ===

impl Value {
    pub fn boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    /// Real value; NaN and infinities become Undefined.
    pub fn real(r: f64) -> Self {
        if r.is_finite() {
            Value::Real(OrderedFloat(r))
        } else {
            Value::Undefined
        }
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn date(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }

    pub fn object(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }

    /// Build a collection, normalizing the elements for `kind`. The abstract
    /// `Collection` kind is materialized as a `Bag`.
    pub fn collection(kind: CollectionKind, elem_type: Type, elems: Vec<Value>) -> Self {
        Value::Collection(Arc::new(CollectionValue::new(kind, elem_type, elems)))
    }

    pub fn set(elem_type: Type, elems: Vec<Value>) -> Self {
        Self::collection(CollectionKind::Set, elem_type, elems)
    }

    pub fn bag(elem_type: Type, elems: Vec<Value>) -> Self {
        Self::collection(CollectionKind::Bag, elem_type, elems)
    }

    pub fn sequence(elem_type: Type, elems: Vec<Value>) -> Self {
        Self::collection(CollectionKind::Sequence, elem_type, elems)
    }

    pub fn ordered_set(elem_type: Type, elems: Vec<Value>) -> Self {
        Self::collection(CollectionKind::OrderedSet, elem_type, elems)
    }

    pub fn tuple(fields: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Tuple(Arc::new(fields.into_iter().collect()))
    }
}

// === Accessors ===

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Truth value in three-valued logic: `None` for Undefined (or a
    /// non-boolean).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value promoted to `f64`.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(r) => Some(r.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionValue> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    /// The most specific type of this value.
    pub fn dynamic_type(&self) -> Type {
        match self {
            Value::Undefined => Type::Undefined,
            Value::Boolean(_) => Type::Boolean,
            Value::Integer(_) => Type::Integer,
            Value::Unlimited => Type::UnlimitedNatural,
            Value::Real(_) => Type::Real,
            Value::String(_) => Type::String,
            Value::Date(_) => Type::Date,
            Value::Object(obj) => Type::object(&*obj.class),
            Value::Collection(c) => Type::collection(c.kind, c.elem_type.clone()),
            Value::Tuple(fields) => Type::Tuple(TupleType::from_fields(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.dynamic_type())),
            )),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Unlimited | Value::Real(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::Object(_) => 5,
            Value::Collection(_) => 6,
            Value::Tuple(_) => 7,
        }
    }
}

// === Collections ===

impl CollectionValue {
    pub fn new(kind: CollectionKind, elem_type: Type, mut elems: Vec<Value>) -> Self {
        let kind = match kind {
            CollectionKind::Collection => CollectionKind::Bag,
            other => other,
        };
        match kind {
            CollectionKind::Set => {
                elems.sort();
                elems.dedup();
            }
            CollectionKind::Bag => elems.sort(),
            CollectionKind::OrderedSet => {
                let mut seen = BTreeSet::new();
                elems.retain(|v| seen.insert(v.clone()));
            }
            CollectionKind::Sequence | CollectionKind::Collection => {}
        }
        Self {
            kind,
            elem_type,
            elems,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn elem_type(&self) -> &Type {
        &self.elem_type
    }

    /// Elements in iteration order.
    pub fn elements(&self) -> &[Value] {
        &self.elems
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.elems.iter()
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn contains(&self, v: &Value) -> bool {
        match self.kind {
            CollectionKind::Set | CollectionKind::Bag => self.elems.binary_search(v).is_ok(),
            _ => self.elems.contains(v),
        }
    }

    pub fn count(&self, v: &Value) -> usize {
        self.elems.iter().filter(|e| *e == v).count()
    }

    fn with(&self, kind: CollectionKind, elem_type: Type, elems: Vec<Value>) -> Value {
        Value::collection(kind, elem_type, elems)
    }

    /// Same elements as a collection of another kind.
    pub fn convert(&self, kind: CollectionKind) -> Value {
        self.with(kind, self.elem_type.clone(), self.elems.clone())
    }

    /// Add `v` (at the end for ordered kinds).
    pub fn including(&self, v: Value, elem_type: Type) -> Value {
        let mut elems = self.elems.clone();
        elems.push(v);
        self.with(self.kind, elem_type, elems)
    }

    /// Remove every occurrence of `v`.
    pub fn excluding(&self, v: &Value) -> Value {
        let elems = self.elems.iter().filter(|e| *e != v).cloned().collect();
        self.with(self.kind, self.elem_type.clone(), elems)
    }

    pub fn append(&self, v: Value, elem_type: Type) -> Value {
        self.including(v, elem_type)
    }

    pub fn prepend(&self, v: Value, elem_type: Type) -> Value {
        let mut elems = Vec::with_capacity(self.elems.len() + 1);
        elems.push(v);
        elems.extend(self.elems.iter().cloned());
        self.with(self.kind, elem_type, elems)
    }

    /// All elements of both collections, normalized for `kind`.
    pub fn union(&self, other: &CollectionValue, kind: CollectionKind, elem_type: Type) -> Value {
        let mut elems = self.elems.clone();
        elems.extend(other.elems.iter().cloned());
        self.with(kind, elem_type, elems)
    }

    /// Common elements; for bags each element keeps the smaller multiplicity.
    pub fn intersection(&self, other: &CollectionValue, kind: CollectionKind) -> Value {
        let mut remaining: BTreeMap<&Value, usize> = BTreeMap::new();
        for v in &other.elems {
            *remaining.entry(v).or_insert(0) += 1;
        }
        let mut elems = Vec::new();
        for v in &self.elems {
            if let Some(left) = remaining.get_mut(v).filter(|n| **n > 0) {
                *left -= 1;
                elems.push(v.clone());
            }
        }
        self.with(kind, self.elem_type.clone(), elems)
    }

    /// Elements of `self` not contained in `other`.
    pub fn difference(&self, other: &CollectionValue) -> Value {
        let elems = self
            .elems
            .iter()
            .filter(|v| !other.contains(v))
            .cloned()
            .collect();
        self.with(self.kind, self.elem_type.clone(), elems)
    }

    /// Elements contained in exactly one of the two collections.
    pub fn symmetric_difference(&self, other: &CollectionValue) -> Value {
        let mut elems: Vec<Value> = self
            .elems
            .iter()
            .filter(|v| !other.contains(v))
            .cloned()
            .collect();
        elems.extend(other.elems.iter().filter(|v| !self.contains(v)).cloned());
        self.with(self.kind, self.elem_type.clone(), elems)
    }

    /// Recursively flatten nested collections into a collection of this
    /// kind.
    pub fn flatten(&self) -> Value {
        let mut elems = Vec::new();
        flatten_into(&self.elems, &mut elems);
        self.with(self.kind, self.elem_type.innermost_element().clone(), elems)
    }
}

fn flatten_into(elems: &[Value], out: &mut Vec<Value>) {
    for v in elems {
        match v {
            Value::Collection(inner) => flatten_into(&inner.elems, out),
            other => out.push(other.clone()),
        }
    }
}

// === Equality and ordering ===
//
// One total order over all values. Numbers share a rank so that `1 = 1.0`;
// the unlimited value is greater than every finite number. Equality is
// derived from the ordering.

fn cmp_numeric(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Real(x), Value::Real(y)) => x.cmp(y),
        (Value::Integer(x), Value::Real(y)) => cmp_int_real(*x, y.0),
        (Value::Real(x), Value::Integer(y)) => cmp_int_real(*y, x.0).reverse(),
        (Value::Unlimited, Value::Unlimited) => Ordering::Equal,
        (Value::Unlimited, _) => Ordering::Greater,
        (_, Value::Unlimited) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Exact comparison of an integer with a finite real. Going through `f64`
/// would round integers above 2^53 and break transitivity.
fn cmp_int_real(n: i64, r: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    let whole = r.trunc();
    if whole >= TWO_POW_63 {
        return Ordering::Less;
    }
    if whole < -TWO_POW_63 {
        return Ordering::Greater;
    }
    // `whole` is integral and inside the i64 range, so the cast is exact.
    match i128::from(n).cmp(&(whole as i128)) {
        Ordering::Equal => OrderedFloat(0.0).cmp(&OrderedFloat(r - whole)),
        unequal => unequal,
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            (Value::Collection(a), Value::Collection(b)) => {
                a.kind.cmp(&b.kind).then_with(|| a.elems.cmp(&b.elems))
            }
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (a, b) if a.rank() == 2 => cmp_numeric(a, b),
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

// === Display ===

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Unlimited => write!(f, "*"),
            Value::Real(r) => write!(f, "{:?}", r.0),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S")),
            Value::Object(obj) => write!(f, "@{}", obj.name),
            Value::Collection(c) => {
                write!(f, "{}{{", c.kind)?;
                for (i, v) in c.elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::Tuple(fields) => {
                write!(f, "Tuple{{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
