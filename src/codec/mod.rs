//! Payload codecs.
//!
//! A [`Codec`] turns a payload into bytes for a given record schema and
//! back. The backend resolves schema names through the store and hands the
//! resolved schema to the codec; codecs never look schemas up themselves.

pub mod decode;
pub mod encode;
pub mod varint;

use bytes::Bytes;
use tracing::debug;

use crate::error::{DecodeError, EncodeError};
use crate::schema::{AvroSchema, SchemaResolutionContext};
use crate::validate::describe;
use crate::value::{Payload, Value};

/// Encodes and decodes payloads against a resolved record schema.
pub trait Codec: Send + Sync {
    /// Encode `payload` as `schema`. `topic` is the destination topic, for
    /// codecs that frame messages per topic; local codecs ignore it.
    fn encode(
        &self,
        payload: &Payload,
        schema: &AvroSchema,
        topic: Option<&str>,
    ) -> Result<Bytes, EncodeError>;

    /// Decode bytes written with `schema`.
    fn decode(&self, data: &[u8], schema: &AvroSchema) -> Result<Payload, DecodeError>;
}

/// Raw Avro binary datum encoding, without container or registry framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn encode(
        &self,
        payload: &Payload,
        schema: &AvroSchema,
        topic: Option<&str>,
    ) -> Result<Bytes, EncodeError> {
        let context = SchemaResolutionContext::build_from_schema(schema);
        let record = match context.deref(schema) {
            Some(AvroSchema::Record(record)) => record,
            _ => {
                return Err(EncodeError::TypeMismatch {
                    path: String::new(),
                    expected: describe(schema),
                    found: "record".to_string(),
                })
            }
        };

        let mut buf = Vec::with_capacity(16 * record.fields.len());
        encode::encode_record(&mut buf, record, payload, &context, "")?;
        debug!(
            schema = %record.fullname(),
            topic = topic.unwrap_or("-"),
            bytes = buf.len(),
            "Encoded payload"
        );
        Ok(Bytes::from(buf))
    }

    fn decode(&self, data: &[u8], schema: &AvroSchema) -> Result<Payload, DecodeError> {
        let context = SchemaResolutionContext::build_from_schema(schema);
        let mut cursor = data;
        let payload = match decode::decode_value(&mut cursor, schema, &context)? {
            Value::Record(payload) => payload,
            other => {
                return Err(DecodeError::InvalidData(format!(
                    "Expected a record, decoded {}",
                    other.kind()
                )))
            }
        };

        if !cursor.is_empty() {
            return Err(DecodeError::InvalidData(format!(
                "{} trailing bytes after datum",
                cursor.len()
            )));
        }
        Ok(payload)
    }
}

/// Validation-only codec: payloads travel as JSON objects.
///
/// Stands in for a real wire format in tests, where only the schema checks
/// performed by the backend matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(
        &self,
        payload: &Payload,
        _schema: &AvroSchema,
        _topic: Option<&str>,
    ) -> Result<Bytes, EncodeError> {
        let json = Value::Record(payload.clone()).to_json();
        Ok(Bytes::from(serde_json::to_vec(&json)?))
    }

    fn decode(&self, data: &[u8], _schema: &AvroSchema) -> Result<Payload, DecodeError> {
        let json: serde_json::Value = serde_json::from_slice(data)?;
        match Value::from_json(&json) {
            Value::Record(payload) => Ok(payload),
            other => Err(DecodeError::InvalidData(format!(
                "Expected a JSON object, found {}",
                other.kind()
            ))),
        }
    }
}
