//! Error types for schema resolution, coercion, validation and encoding

use std::fmt;
use std::io;
use thiserror::Error;

use crate::store::SchemaRef;

/// Errors that can occur during schema operations
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Invalid schema format
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// Unsupported schema type
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),
    /// Schema parsing error
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Errors raised by a schema store lookup or insert
#[derive(Debug, Error)]
pub enum StoreError {
    /// No schema registered (or on disk) under this full name
    #[error("Schema not found: {0}")]
    NotFound(String),
    /// Schema file could not be parsed or resolved
    #[error("Schema error in {name}: {source}")]
    Schema {
        name: String,
        #[source]
        source: SchemaError,
    },
    /// IO error while reading a schema file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur during decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Invalid Avro data
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Unexpected end of data
    #[error("Unexpected end of input")]
    UnexpectedEof,
    /// Invalid varint encoding
    #[error("Invalid varint encoding")]
    InvalidVarint,
    /// String is not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// JSON payload could not be parsed
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during encoding
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Value does not fit the schema at the given path
    #[error("Cannot encode {found} as {expected} at '{path}'")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
    /// Record field has no value and no default
    #[error("Missing value for field '{0}'")]
    MissingField(String),
    /// Schema references a named type that is not defined
    #[error("Unresolved named type reference: '{0}'")]
    UnresolvedName(String),
    /// Payload could not be serialized to JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A value could not be normalized to its declared type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    /// String does not parse as the declared numeric type
    #[error("Cannot parse {value:?} as {expected}")]
    InvalidNumber { expected: &'static str, value: String },
    /// Numeric value does not fit the declared type
    #[error("Value {value} is out of range for {expected}")]
    OutOfRange { expected: &'static str, value: i64 },
    /// Value kind has no coercion to the declared type
    #[error("Cannot coerce {found} to {expected}")]
    Incompatible {
        expected: &'static str,
        found: &'static str,
    },
    /// Schema references a named type that is not defined
    #[error("Unresolved named type reference: '{0}'")]
    UnresolvedName(String),
}

/// Why a payload failed strict validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReason {
    /// Required field absent from the payload
    MissingField,
    /// Payload carries a field the schema does not declare
    ExtraField,
    /// Value kind does not match the declared type
    TypeMismatch { expected: String, found: String },
    /// Integer outside the 32-bit range of an `int` field
    OutOfRange { value: i64 },
    /// Enum value is not one of the declared symbols
    UnknownSymbol { symbol: String },
    /// Schema references a named type that is not defined
    UnresolvedName { name: String },
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::MissingField => write!(f, "missing required field"),
            ValidationReason::ExtraField => write!(f, "extra field not declared in schema"),
            ValidationReason::TypeMismatch { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            ValidationReason::OutOfRange { value } => {
                write!(f, "value {} out of range for int", value)
            }
            ValidationReason::UnknownSymbol { symbol } => {
                write!(f, "unknown enum symbol '{}'", symbol)
            }
            ValidationReason::UnresolvedName { name } => {
                write!(f, "unresolved named type '{}'", name)
            }
        }
    }
}

/// Payload failed strict schema validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed for {schema} at '{path}': {reason}")]
pub struct ValidationError {
    /// Full name of the schema validated against
    pub schema: String,
    /// Dot-separated path of the offending field (`$root` for the payload itself)
    pub path: String,
    /// What went wrong
    pub reason: ValidationReason,
}

impl ValidationError {
    /// Create a new ValidationError
    pub fn new(schema: impl Into<String>, path: impl Into<String>, reason: ValidationReason) -> Self {
        Self {
            schema: schema.into(),
            path: path.into(),
            reason,
        }
    }
}

/// Top-level backend error type
#[derive(Debug, Error)]
pub enum BackendError {
    /// Requested schema is absent from the store
    #[error("Schema {} not found", schema_fullname(.name, .namespace))]
    SchemaNotFound { name: String, namespace: String },

    /// Value schema resolved but declares no fields
    #[error("Schema {0} has no fields")]
    SchemaHasNoFields(String),

    /// Key field is not declared by the value schema
    #[error("Schema {schema} has no field named '{field}'")]
    KeyFieldNotFound { schema: String, field: String },

    /// Payload failed strict validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A field value could not be coerced
    #[error("Coercion failed for field '{field}': {source}")]
    Coercion {
        field: String,
        #[source]
        source: CoercionError,
    },

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Store error other than a missing schema
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Codec failed to encode
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Codec failed to decode
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BackendError {
    /// Map a store error, turning a miss of the requested schema itself into
    /// `SchemaNotFound`. A miss of a schema it references stays a store error.
    pub fn from_store(err: StoreError, name: &str, namespace: &str) -> Self {
        match err {
            StoreError::NotFound(ref missing) if *missing == schema_fullname(name, namespace) => {
                BackendError::SchemaNotFound {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                }
            }
            other => BackendError::Store(other),
        }
    }
}

fn schema_fullname(name: &str, namespace: &str) -> String {
    SchemaRef::new(name, namespace).fullname()
}
