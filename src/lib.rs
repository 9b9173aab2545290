//! Schema-driven Avro key/value codec layer.
//!
//! This library resolves record schemas from a mutable store, derives key
//! schemas from a field of a value schema, coerces loosely typed input into
//! the exact types a schema declares, and validates payloads strictly
//! before encoding them.

pub mod backend;
pub mod codec;
pub mod coerce;
pub mod config;
pub mod error;
pub mod schema;
pub mod store;
pub mod validate;
pub mod value;

// Re-export main types
pub use backend::{key_schema_name, KeySchema, SchemaBackend};
pub use codec::{BinaryCodec, Codec, JsonCodec};
pub use coerce::SchemaCoercer;
pub use config::{BackendConfig, BackendKind};
pub use error::{
    BackendError, CoercionError, DecodeError, EncodeError, SchemaError, StoreError,
    ValidationError, ValidationReason,
};
pub use schema::{
    parse_schema, AvroSchema, EnumSchema, FieldSchema, LogicalType, LogicalTypeName,
    RecordSchema, SchemaParser,
};
pub use store::{LocalSchemaStore, SchemaRef, SchemaStore};
pub use validate::validate_payload;
pub use value::{Payload, StringLike, Value};
