//! Schema backend.
//!
//! A [`SchemaBackend`] is bound to one value schema (by name and namespace)
//! and encodes, decodes, coerces and validates payloads for it. Keys are
//! handled through a key schema synthesized from one field of the value
//! schema on first use.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use avrokey::{payload, LocalSchemaStore, SchemaBackend, SchemaStore, Value};
//!
//! let store = Arc::new(LocalSchemaStore::new());
//! store.add_schema(&serde_json::json!({
//!     "type": "record", "name": "Widget", "namespace": "com.example",
//!     "fields": [{"name": "id", "type": "long"}, {"name": "label", "type": "string"}]
//! }))?;
//!
//! let backend = SchemaBackend::new("Widget", "com.example", store);
//! let bytes = backend.encode(&payload! { "id" => "7", "label" => Value::symbol("big") }, None, None)?;
//! assert_eq!(
//!     backend.decode(&bytes, None)?,
//!     payload! { "id" => 7i64, "label" => "big" }
//! );
//!
//! let key = backend.encode_key("id", 7i64, Some("widgets"))?;
//! assert_eq!(backend.decode_key(&key, "id")?, Value::Long(7));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod key;

pub use key::{key_schema_name, synthesize_key_schema, KeySchema};

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec::{BinaryCodec, Codec};
use crate::coerce::SchemaCoercer;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::schema::{AvroSchema, FieldSchema};
use crate::store::SchemaStore;
use crate::validate::validate_payload;
use crate::value::{Payload, Value};

/// Encodes and decodes payloads for one value schema.
pub struct SchemaBackend {
    schema: String,
    namespace: String,
    store: Arc<dyn SchemaStore>,
    codec: Arc<dyn Codec>,
    key_schema: Mutex<Option<Arc<KeySchema>>>,
}

impl SchemaBackend {
    /// Create a backend for value schema `schema` in `namespace`, encoding
    /// Avro binary datums.
    pub fn new(
        schema: impl Into<String>,
        namespace: impl Into<String>,
        store: Arc<dyn SchemaStore>,
    ) -> Self {
        Self {
            schema: schema.into(),
            namespace: namespace.into(),
            store,
            codec: Arc::new(BinaryCodec),
            key_schema: Mutex::new(None),
        }
    }

    /// Use `codec` instead of the binary codec.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Create a backend with the store and codec `config` describes.
    pub fn from_config(
        config: &BackendConfig,
        schema: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::new(schema, namespace, Arc::new(config.build_store())).with_codec(config.backend.codec())
    }

    /// Name of the value schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Namespace schemas are looked up in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The store schemas are looked up in and key schemas registered with.
    pub fn schema_store(&self) -> &Arc<dyn SchemaStore> {
        &self.store
    }

    /// Switch to another value schema. The cached key schema is dropped.
    pub fn set_schema(&mut self, schema: impl Into<String>) {
        self.schema = schema.into();
        *self
            .key_schema
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Look up `schema` (default: the value schema) in the backend's namespace.
    pub fn resolve(&self, schema: Option<&str>) -> Result<Arc<AvroSchema>, BackendError> {
        let name = schema.unwrap_or(&self.schema);
        self.store
            .find(name, &self.namespace)
            .map_err(|e| BackendError::from_store(e, name, &self.namespace))
    }

    /// The key schema for `field_name`, synthesized and registered on first use.
    ///
    /// The first key schema synthesized is kept for the life of the backend
    /// (or until [`set_schema`](Self::set_schema)), even when later calls
    /// name a different field.
    pub fn key_schema(&self, field_name: &str) -> Result<Arc<KeySchema>, BackendError> {
        let mut cached = self
            .key_schema
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(key) = cached.as_ref() {
            if key.field_name != field_name {
                warn!(
                    schema = %self.schema,
                    cached_field = %key.field_name,
                    requested_field = field_name,
                    "Key schema already synthesized for another field; reusing it"
                );
            } else {
                debug!(key_schema = %key.schema_ref, "Key schema cache hit");
            }
            return Ok(Arc::clone(key));
        }

        let value_schema = self.resolve(None)?;
        let key = Arc::new(synthesize_key_schema(
            self.store.as_ref(),
            &value_schema,
            &self.schema,
            &self.namespace,
            field_name,
        )?);
        *cached = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Encode a message key: `value` wrapped as the single field of the key
    /// schema.
    pub fn encode_key(
        &self,
        field_name: &str,
        value: impl Into<Value>,
        topic: Option<&str>,
    ) -> Result<Bytes, BackendError> {
        let key = self.key_schema(field_name)?;
        let mut payload = Payload::new();
        payload.insert(key_field(&key)?, value.into());
        self.encode(&payload, Some(key.name()), topic)
    }

    /// Decode a message key and return the value of its field (null when absent).
    pub fn decode_key(&self, data: &[u8], field_name: &str) -> Result<Value, BackendError> {
        let key = self.key_schema(field_name)?;
        let field = key_field(&key)?;
        let mut payload = self.decode(data, Some(key.name()))?;
        Ok(payload.remove(&field).unwrap_or(Value::Null))
    }

    /// Coerce, strictly validate and encode `payload` as `schema`
    /// (default: the value schema).
    pub fn encode(
        &self,
        payload: &Payload,
        schema: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Bytes, BackendError> {
        let resolved = self.resolve(schema)?;
        let coerced = SchemaCoercer::new(Arc::clone(&resolved)).coerce_record(payload)?;
        validate_payload(&coerced, &resolved)?;
        Ok(self.codec.encode(&coerced, &resolved, topic)?)
    }

    /// Decode bytes written with `schema` (default: the value schema).
    pub fn decode(&self, data: &[u8], schema: Option<&str>) -> Result<Payload, BackendError> {
        let resolved = self.resolve(schema)?;
        Ok(self.codec.decode(data, &resolved)?)
    }

    /// Coerce every declared field of the value schema present in `payload`.
    pub fn coerce(&self, payload: &Payload) -> Result<Payload, BackendError> {
        SchemaCoercer::new(self.resolve(None)?).coerce_record(payload)
    }

    /// Coerce one value to the type of `field`.
    pub fn coerce_field(&self, field: &FieldSchema, value: Value) -> Result<Value, BackendError> {
        SchemaCoercer::new(self.resolve(None)?)
            .coerce_type(&field.schema, value)
            .map_err(|source| BackendError::Coercion {
                field: field.name.clone(),
                source,
            })
    }

    /// Strictly validate `payload` against `schema`; extra fields are errors.
    pub fn validate(&self, payload: &Payload, schema: &str) -> Result<(), BackendError> {
        let resolved = self.resolve(Some(schema))?;
        validate_payload(payload, &resolved)?;
        Ok(())
    }

    /// Declared fields of the value schema.
    pub fn schema_fields(&self) -> Result<Vec<FieldSchema>, BackendError> {
        let resolved = self.resolve(None)?;
        match resolved.as_record() {
            Some(record) => Ok(record.fields.clone()),
            None => Err(BackendError::SchemaHasNoFields(self.schema.clone())),
        }
    }
}

impl fmt::Debug for SchemaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBackend")
            .field("schema", &self.schema)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Name of the one field of a key schema.
fn key_field(key: &KeySchema) -> Result<String, BackendError> {
    key.schema
        .as_record()
        .and_then(|record| record.fields.first())
        .map(|field| field.name.clone())
        .ok_or_else(|| BackendError::SchemaHasNoFields(key.name().to_string()))
}
