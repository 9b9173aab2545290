//! Avro schema types and parsing.
//!
//! This module defines the schema type system, JSON parsing and named type
//! resolution.

mod parser;
mod resolution;
mod types;

pub use parser::{parse_schema, parse_schema_with_options, SchemaParser};
pub use resolution::{external_references, resolve_schema, SchemaResolutionContext};
pub use types::*;
