//! Avro binary encoder.
//!
//! The inverse of [`super::decode`]: writes a canonical [`Value`] as a
//! single Avro datum. Record fields missing from the payload fall back to
//! the field default, or to null for nullable fields.

use serde_json::Value as Json;

use crate::error::EncodeError;
use crate::schema::{AvroSchema, RecordSchema, SchemaResolutionContext};
use crate::validate::{describe, value_matches};
use crate::value::{Payload, Value};

use super::varint::{write_varint, write_zigzag};

/// Append a length-prefixed byte string.
#[inline]
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_zigzag(buf, bytes.len() as i64);
    buf.extend_from_slice(bytes);
}

/// Encode a record payload in schema field order.
pub fn encode_record(
    buf: &mut Vec<u8>,
    record: &RecordSchema,
    payload: &Payload,
    context: &SchemaResolutionContext,
    path: &str,
) -> Result<(), EncodeError> {
    for field in &record.fields {
        let field_path = join(path, &field.name);
        match (payload.get(&field.name), &field.default) {
            (Some(value), _) => encode_value(buf, &field.schema, value, context, &field_path)?,
            (None, Some(default)) => {
                encode_default(buf, &field.schema, default, context, &field_path)?
            }
            (None, None) if field.schema.is_nullable() => {
                encode_value(buf, &field.schema, &Value::Null, context, &field_path)?
            }
            (None, None) => return Err(EncodeError::MissingField(field_path)),
        }
    }
    Ok(())
}

/// Encode any value based on its schema.
pub fn encode_value(
    buf: &mut Vec<u8>,
    schema: &AvroSchema,
    value: &Value,
    context: &SchemaResolutionContext,
    path: &str,
) -> Result<(), EncodeError> {
    let mismatch = || EncodeError::TypeMismatch {
        path: path.to_string(),
        expected: describe(schema),
        found: value.kind().to_string(),
    };

    match (schema, value) {
        (AvroSchema::Null, Value::Null) => {}
        (AvroSchema::Boolean, Value::Boolean(b)) => buf.push(u8::from(*b)),
        (AvroSchema::Int, Value::Int(_) | Value::Long(_)) => {
            let v = value.as_i64().ok_or_else(mismatch)?;
            i32::try_from(v).map_err(|_| mismatch())?;
            write_zigzag(buf, v);
        }
        (AvroSchema::Long, Value::Int(_) | Value::Long(_)) => {
            write_zigzag(buf, value.as_i64().ok_or_else(mismatch)?);
        }
        (AvroSchema::Float, _) => {
            let v = value.as_f64().ok_or_else(mismatch)?;
            buf.extend_from_slice(&(v as f32).to_le_bytes());
        }
        (AvroSchema::Double, _) => {
            let v = value.as_f64().ok_or_else(mismatch)?;
            buf.extend_from_slice(&v.to_le_bytes());
        }
        (AvroSchema::Bytes, Value::Bytes(bytes)) => write_bytes(buf, bytes),
        (AvroSchema::String, Value::String(s)) => write_bytes(buf, s.as_bytes()),

        (AvroSchema::Record(record), Value::Record(fields) | Value::Map(fields)) => {
            encode_record(buf, record, fields, context, path)?
        }
        (AvroSchema::Enum(enum_schema), Value::String(symbol)) => {
            let index = enum_schema.symbol_index(symbol).ok_or_else(mismatch)?;
            write_zigzag(buf, index as i64);
        }
        (AvroSchema::Array(items), Value::Array(values)) => {
            if !values.is_empty() {
                write_zigzag(buf, values.len() as i64);
                for (i, item) in values.iter().enumerate() {
                    encode_value(buf, items, item, context, &format!("{}[{}]", path, i))?;
                }
            }
            write_varint(buf, 0);
        }
        (AvroSchema::Map(values), Value::Map(entries) | Value::Record(entries)) => {
            if !entries.is_empty() {
                write_zigzag(buf, entries.len() as i64);
                for (key, item) in entries {
                    write_bytes(buf, key.as_bytes());
                    encode_value(buf, values, item, context, &format!("{}[{}]", path, key))?;
                }
            }
            write_varint(buf, 0);
        }
        (AvroSchema::Union(variants), _) => {
            let index = variants
                .iter()
                .position(|variant| value_matches(variant, value, context))
                .ok_or_else(mismatch)?;
            write_zigzag(buf, index as i64);
            encode_value(buf, &variants[index], value, context, path)?;
        }

        (AvroSchema::Named(name), _) => {
            let resolved = context
                .get(name)
                .ok_or_else(|| EncodeError::UnresolvedName(name.clone()))?;
            encode_value(buf, resolved, value, context, path)?;
        }
        (AvroSchema::Logical(logical), _) => {
            encode_value(buf, &logical.base, value, context, path)?
        }

        _ => return Err(mismatch()),
    }

    Ok(())
}

/// Encode a field default given as schema JSON.
///
/// Union defaults always refer to the first branch; bytes defaults are
/// strings whose code points are the byte values.
fn encode_default(
    buf: &mut Vec<u8>,
    schema: &AvroSchema,
    default: &Json,
    context: &SchemaResolutionContext,
    path: &str,
) -> Result<(), EncodeError> {
    match (schema, default) {
        (AvroSchema::Union(variants), _) => {
            let first = variants
                .first()
                .ok_or_else(|| EncodeError::MissingField(path.to_string()))?;
            write_zigzag(buf, 0);
            encode_default(buf, first, default, context, path)
        }
        (AvroSchema::Bytes, Json::String(s)) => {
            let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
            write_bytes(buf, &bytes);
            Ok(())
        }
        (AvroSchema::Named(name), _) => {
            let resolved = context
                .get(name)
                .ok_or_else(|| EncodeError::UnresolvedName(name.clone()))?;
            encode_default(buf, resolved, default, context, path)
        }
        _ => encode_value(buf, schema, &Value::from_json(default), context, path),
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode::decode_value;
    use crate::payload;
    use crate::schema::parse_schema;

    fn encode(schema: &AvroSchema, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let context = SchemaResolutionContext::build_from_schema(schema);
        let mut buf = Vec::new();
        encode_value(&mut buf, schema, value, &context, "")?;
        Ok(buf)
    }

    #[test]
    fn test_encode_primitives() {
        assert_eq!(encode(&AvroSchema::Boolean, &Value::Boolean(true)).unwrap(), vec![0x01]);
        assert_eq!(encode(&AvroSchema::Long, &Value::Int(-1)).unwrap(), vec![0x01]);
        assert_eq!(
            encode(&AvroSchema::String, &Value::from("hi")).unwrap(),
            vec![0x04, b'h', b'i']
        );
        assert_eq!(
            encode(&AvroSchema::Double, &Value::Int(1)).unwrap(),
            1.0f64.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_encode_int_out_of_range() {
        let err = encode(&AvroSchema::Int, &Value::Long(i64::MAX)).unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_union_picks_matching_branch() {
        let schema = AvroSchema::Union(vec![AvroSchema::Null, AvroSchema::String]);
        assert_eq!(encode(&schema, &Value::Null).unwrap(), vec![0x00]);
        assert_eq!(encode(&schema, &Value::from("a")).unwrap(), vec![0x02, 0x02, b'a']);
        assert!(encode(&schema, &Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_missing_field_uses_default() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Row", "fields": [
                {"name": "id", "type": "long"},
                {"name": "count", "type": "int", "default": 5},
                {"name": "note", "type": ["null", "string"]}
            ]}"#,
        )
        .unwrap();
        let p = payload! { "id" => 1i64 };
        let encoded = encode(&schema, &Value::Record(p)).unwrap();
        assert_eq!(encoded, vec![0x02, 0x0A, 0x00]);

        let context = SchemaResolutionContext::build_from_schema(&schema);
        let mut cursor: &[u8] = &encoded;
        let decoded = decode_value(&mut cursor, &schema, &context).unwrap();
        assert_eq!(
            decoded,
            Value::Record(payload! { "id" => 1i64, "count" => 5i32, "note" => Value::Null })
        );
    }

    #[test]
    fn test_missing_required_field() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Row", "fields": [{"name": "id", "type": "long"}]}"#,
        )
        .unwrap();
        let err = encode(&schema, &Value::Record(Payload::new())).unwrap_err();
        assert!(matches!(err, EncodeError::MissingField(ref f) if f == "id"));
    }

    #[test]
    fn test_map_and_array_round_trip() {
        let schema = parse_schema(
            r#"{"type": "map", "values": {"type": "array", "items": "int"}}"#,
        )
        .unwrap();
        let mut entries = Payload::new();
        entries.insert("a".to_string(), Value::Array(vec![Value::Int(1), Value::Int(2)]));
        entries.insert("b".to_string(), Value::Array(vec![]));
        let value = Value::Map(entries);

        let encoded = encode(&schema, &value).unwrap();
        let mut cursor: &[u8] = &encoded;
        let decoded = decode_value(&mut cursor, &schema, &SchemaResolutionContext::new()).unwrap();
        assert_eq!(decoded, value);
        assert!(cursor.is_empty());
    }
}
