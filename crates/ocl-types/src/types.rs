//! Type representation for the OCL type system.

use std::collections::BTreeMap;
use std::fmt;

/// The kind of a collection type.
///
/// `Collection` is the abstract supertype kind: every concrete kind conforms
/// to it, but no runtime value carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Collection,
    Set,
    Bag,
    Sequence,
    OrderedSet,
}

impl CollectionKind {
    /// True for kinds that keep their elements in insertion order.
    pub fn is_ordered(self) -> bool {
        matches!(self, CollectionKind::Sequence | CollectionKind::OrderedSet)
    }

    /// True for kinds that never hold duplicates.
    pub fn is_unique(self) -> bool {
        matches!(self, CollectionKind::Set | CollectionKind::OrderedSet)
    }

    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::Collection => "Collection",
            CollectionKind::Set => "Set",
            CollectionKind::Bag => "Bag",
            CollectionKind::Sequence => "Sequence",
            CollectionKind::OrderedSet => "OrderedSet",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An OCL type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Boolean,
    Integer,
    UnlimitedNatural,
    Real,
    String,
    Date,
    /// Type of the undefined value. Conforms to every type.
    Undefined,
    /// Top of the lattice.
    OclAny,
    /// Instances of a model class, identified by class name.
    Object(String),
    /// Collection of the given kind and element type.
    Collection(CollectionKind, Box<Type>),
    /// Tuple with named parts.
    Tuple(TupleType),
}

impl Type {
    pub fn object(class: impl Into<String>) -> Self {
        Type::Object(class.into())
    }

    pub fn collection(kind: CollectionKind, elem: Type) -> Self {
        Type::Collection(kind, Box::new(elem))
    }

    pub fn set(elem: Type) -> Self {
        Type::collection(CollectionKind::Set, elem)
    }

    pub fn bag(elem: Type) -> Self {
        Type::collection(CollectionKind::Bag, elem)
    }

    pub fn sequence(elem: Type) -> Self {
        Type::collection(CollectionKind::Sequence, elem)
    }

    pub fn ordered_set(elem: Type) -> Self {
        Type::collection(CollectionKind::OrderedSet, elem)
    }

    /// Check if this is a numeric type (Integer, UnlimitedNatural or Real).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::UnlimitedNatural | Type::Real)
    }

    /// Check if values of this type are totally ordered by `<`.
    pub fn is_orderable(&self) -> bool {
        self.is_numeric() || matches!(self, Type::String | Type::Date | Type::Undefined)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::Collection(..))
    }

    pub fn collection_kind(&self) -> Option<CollectionKind> {
        match self {
            Type::Collection(kind, _) => Some(*kind),
            _ => None,
        }
    }

    /// Element type of a collection type.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Collection(_, elem) => Some(elem),
            _ => None,
        }
    }

    /// Fully flatten nested collection element types.
    ///
    /// `Set(Bag(Integer))` becomes `Integer`; a non-collection is returned as is.
    pub fn innermost_element(&self) -> &Type {
        match self {
            Type::Collection(_, elem) => elem.innermost_element(),
            other => other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "Boolean"),
            Type::Integer => write!(f, "Integer"),
            Type::UnlimitedNatural => write!(f, "UnlimitedNatural"),
            Type::Real => write!(f, "Real"),
            Type::String => write!(f, "String"),
            Type::Date => write!(f, "Date"),
            Type::Undefined => write!(f, "OclVoid"),
            Type::OclAny => write!(f, "OclAny"),
            Type::Object(name) => write!(f, "{}", name),
            Type::Collection(kind, elem) => write!(f, "{}({})", kind, elem),
            Type::Tuple(t) => {
                write!(f, "Tuple(")?;
                for (i, (name, ty)) in t.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", name, ty)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A tuple type with named parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TupleType {
    /// Part names to types, ordered by name.
    pub fields: BTreeMap<String, Type>,
}

impl TupleType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: impl IntoIterator<Item = (String, Type)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&Type> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(Type::Boolean.to_string(), "Boolean");
        assert_eq!(Type::set(Type::Integer).to_string(), "Set(Integer)");
        assert_eq!(
            Type::sequence(Type::bag(Type::object("Person"))).to_string(),
            "Sequence(Bag(Person))"
        );
        let tuple = Type::Tuple(TupleType::from_fields([
            ("name".to_string(), Type::String),
            ("age".to_string(), Type::Integer),
        ]));
        assert_eq!(tuple.to_string(), "Tuple(age : Integer, name : String)");
    }

    #[test]
    fn test_kind_properties() {
        assert!(CollectionKind::OrderedSet.is_ordered());
        assert!(CollectionKind::OrderedSet.is_unique());
        assert!(!CollectionKind::Bag.is_unique());
        assert!(!CollectionKind::Set.is_ordered());
    }

    #[test]
    fn test_innermost_element() {
        let nested = Type::set(Type::bag(Type::Integer));
        assert_eq!(nested.innermost_element(), &Type::Integer);
        assert_eq!(nested.element_type(), Some(&Type::bag(Type::Integer)));
        assert_eq!(Type::String.innermost_element(), &Type::String);
    }

    #[test]
    fn test_orderable() {
        assert!(Type::Date.is_orderable());
        assert!(Type::UnlimitedNatural.is_orderable());
        assert!(!Type::Boolean.is_orderable());
        assert!(!Type::object("Person").is_orderable());
    }
}
