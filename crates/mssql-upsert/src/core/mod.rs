//! Core value and identifier primitives shared by the mapping, schema, and
//! execution layers.

pub mod identifier;
pub mod value;

pub use identifier::{qualify, quote_ident, validate_identifier};
pub use value::{SqlNullType, SqlValue};
