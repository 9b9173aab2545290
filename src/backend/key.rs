//! Key schema synthesis.
//!
//! Message keys are usually a single field of the value. Rather than
//! maintaining a separate key schema, one is derived from the value schema:
//! a record with just that field, named after the value schema.

use std::sync::Arc;

use serde_json::{json, Value as Json};
use tracing::info;

use crate::error::{BackendError, SchemaError};
use crate::schema::{AvroSchema, RecordSchema};
use crate::store::{SchemaRef, SchemaStore};

/// A synthesized key schema, as registered with the store.
#[derive(Debug, Clone)]
pub struct KeySchema {
    /// Where the key schema lives in the store
    pub schema_ref: SchemaRef,
    /// The one field of the key record
    pub field_name: String,
    /// The literal handed to the store
    pub literal: Json,
    /// The resolved schema returned by the store
    pub schema: Arc<AvroSchema>,
}

impl KeySchema {
    /// Name of the key schema in the store.
    pub fn name(&self) -> &str {
        &self.schema_ref.name
    }
}

/// Name of the key schema derived from value schema `schema`: every
/// `-value` is removed and `_key` appended.
///
/// ```
/// use avrokey::backend::key_schema_name;
///
/// assert_eq!(key_schema_name("orders-value"), "orders_key");
/// assert_eq!(key_schema_name("MySchema"), "MySchema_key");
/// ```
pub fn key_schema_name(schema: &str) -> String {
    format!("{}_key", schema.replace("-value", ""))
}

/// Derive the key schema for `field_name` of the value schema `schema` in
/// `namespace`, and register it with `store`.
///
/// Only the primitive type of the field carries over; logical types
/// contribute their base type.
pub fn synthesize_key_schema(
    store: &dyn SchemaStore,
    value_schema: &AvroSchema,
    schema: &str,
    namespace: &str,
    field_name: &str,
) -> Result<KeySchema, BackendError> {
    let record = value_record(value_schema, schema)?;
    if record.fields.is_empty() {
        return Err(BackendError::SchemaHasNoFields(schema.to_string()));
    }

    let field = record
        .field(field_name)
        .ok_or_else(|| BackendError::KeyFieldNotFound {
            schema: record.fullname(),
            field: field_name.to_string(),
        })?;

    if !field.schema.is_primitive() && !matches!(field.schema, AvroSchema::Logical(_)) {
        return Err(SchemaError::UnsupportedType(format!(
            "Key field '{}' of {} has type {}; only primitive key fields are supported",
            field_name,
            record.fullname(),
            field.schema.type_tag()
        ))
        .into());
    }

    let name = key_schema_name(schema);
    let mut literal = json!({
        "type": "record",
        "name": name,
        "namespace": namespace,
        "doc": format!("Key for {}", SchemaRef::new(schema, namespace)),
        "fields": [
            {"name": field_name, "type": field.schema.type_tag()}
        ]
    });
    if namespace.is_empty() {
        if let Some(obj) = literal.as_object_mut() {
            obj.remove("namespace");
        }
    }

    let stored = store
        .add_schema(&literal)
        .map_err(|e| BackendError::from_store(e, &name, namespace))?;
    info!(
        key_schema = %SchemaRef::new(name.as_str(), namespace),
        field = field_name,
        "Synthesized key schema"
    );

    Ok(KeySchema {
        schema_ref: SchemaRef::new(name, namespace),
        field_name: field_name.to_string(),
        literal,
        schema: stored,
    })
}

fn value_record<'a>(value_schema: &'a AvroSchema, schema: &str) -> Result<&'a RecordSchema, BackendError> {
    value_schema.as_record().ok_or_else(|| {
        SchemaError::InvalidSchema(format!(
            "{} is a {}, not a record",
            schema,
            value_schema.type_tag()
        ))
        .into()
    })
}
