//! Type system for OCL expressions.

pub mod env;
pub mod error;
pub mod ops;
pub mod schema;
pub mod system;
pub mod types;

pub use env::TypeEnv;
pub use error::{TypeError, TypeResult};
pub use ops::{resolve_operation, Builtin, Strictness};
pub use schema::{ancestors, AssociationEnd, EmptySchema, ModelSchema, OperationSig};
pub use system::TypeSystem;
pub use types::{CollectionKind, TupleType, Type};
