//! Avro binary decoder.
//!
//! Decodes a single datum into a [`Value`], following the Avro binary
//! encoding:
//! - Varints use zigzag encoding for signed integers
//! - Floats and doubles are little-endian IEEE 754
//! - Bytes and strings are length-prefixed
//! - Arrays and maps are block encoded, terminated by a zero count
//! - Unions are prefixed by the branch index

use crate::error::DecodeError;
use crate::schema::{AvroSchema, EnumSchema, RecordSchema, SchemaResolutionContext};
use crate::value::{Payload, Value};

use super::varint::decode_zigzag;

/// Decode a boolean value (one byte, 0 or 1).
#[inline]
pub fn decode_boolean(data: &mut &[u8]) -> Result<bool, DecodeError> {
    let (&byte, rest) = data.split_first().ok_or(DecodeError::UnexpectedEof)?;
    *data = rest;
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DecodeError::InvalidData(format!(
            "Invalid boolean value: {}, expected 0 or 1",
            byte
        ))),
    }
}

/// Decode a 32-bit signed integer (zigzag varint encoded).
#[inline]
pub fn decode_int(data: &mut &[u8]) -> Result<i32, DecodeError> {
    let long = decode_long(data)?;
    i32::try_from(long).map_err(|_| {
        DecodeError::InvalidData(format!("Integer overflow: {} does not fit in i32", long))
    })
}

/// Decode a 64-bit signed integer (zigzag varint encoded).
#[inline]
pub fn decode_long(data: &mut &[u8]) -> Result<i64, DecodeError> {
    decode_zigzag(data)
}

fn take<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8], DecodeError> {
    if data.len() < len {
        return Err(DecodeError::UnexpectedEof);
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Ok(head)
}

/// Decode a 32-bit IEEE 754 floating-point number (little-endian).
#[inline]
pub fn decode_float(data: &mut &[u8]) -> Result<f32, DecodeError> {
    let bytes = take(data, 4)?;
    Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode a 64-bit IEEE 754 floating-point number (little-endian).
#[inline]
pub fn decode_double(data: &mut &[u8]) -> Result<f64, DecodeError> {
    let bytes = take(data, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(f64::from_le_bytes(buf))
}

/// Decode a length-prefixed byte array.
#[inline]
pub fn decode_bytes(data: &mut &[u8]) -> Result<Vec<u8>, DecodeError> {
    let len = decode_long(data)?;
    if len < 0 {
        return Err(DecodeError::InvalidData(format!(
            "Negative bytes length: {}",
            len
        )));
    }
    Ok(take(data, len as usize)?.to_vec())
}

/// Decode a length-prefixed UTF-8 string.
#[inline]
pub fn decode_string(data: &mut &[u8]) -> Result<String, DecodeError> {
    let bytes = decode_bytes(data)?;
    String::from_utf8(bytes).map_err(DecodeError::from)
}

/// Decode an enum symbol from its index.
pub fn decode_enum(data: &mut &[u8], schema: &EnumSchema) -> Result<String, DecodeError> {
    let index = decode_int(data)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| schema.symbols.get(i))
        .cloned()
        .ok_or_else(|| {
            DecodeError::InvalidData(format!(
                "Enum index {} out of range for {} ({} symbols)",
                index,
                schema.fullname(),
                schema.symbols.len()
            ))
        })
}

/// Read the item count of the next array/map block; zero ends the sequence.
fn decode_block_count(data: &mut &[u8]) -> Result<usize, DecodeError> {
    let count = decode_long(data)?;
    if count < 0 {
        // Negative count is followed by the block's byte size, which we don't need
        let _byte_size = decode_long(data)?;
        Ok(count.unsigned_abs() as usize)
    } else {
        Ok(count as usize)
    }
}

/// Upper bound on items in one block of an array whose items take no input bytes.
const MAX_ZERO_WIDTH_ITEMS: usize = 1 << 16;

/// Whether every datum of `schema` consumes at least one byte of input.
fn has_width(schema: &AvroSchema, context: &SchemaResolutionContext, depth: usize) -> bool {
    if depth > 32 {
        return false;
    }
    match schema {
        AvroSchema::Null => false,
        AvroSchema::Record(record) => record
            .fields
            .iter()
            .any(|f| has_width(&f.schema, context, depth + 1)),
        AvroSchema::Named(name) => context
            .get(name)
            .is_some_and(|resolved| has_width(resolved, context, depth + 1)),
        AvroSchema::Logical(logical) => has_width(&logical.base, context, depth + 1),
        _ => true,
    }
}

/// Reject block counts the remaining input cannot hold.
fn check_block_count(count: usize, remaining: usize, item_width: bool) -> Result<(), DecodeError> {
    let limit = if item_width { remaining } else { MAX_ZERO_WIDTH_ITEMS };
    if count > limit {
        return Err(DecodeError::InvalidData(format!(
            "Block count {} exceeds remaining input ({} bytes)",
            count, remaining
        )));
    }
    Ok(())
}

/// Decode a record's fields in schema order.
pub fn decode_record(
    data: &mut &[u8],
    schema: &RecordSchema,
    context: &SchemaResolutionContext,
) -> Result<Payload, DecodeError> {
    let mut fields = Payload::new();
    for field in &schema.fields {
        let value = decode_value(data, &field.schema, context)?;
        fields.insert(field.name.clone(), value);
    }
    Ok(fields)
}

/// Decode any value based on its schema.
///
/// Unions decode to the value of the selected branch, enums to their symbol
/// string, logical types to their base representation.
pub fn decode_value(
    data: &mut &[u8],
    schema: &AvroSchema,
    context: &SchemaResolutionContext,
) -> Result<Value, DecodeError> {
    match schema {
        AvroSchema::Null => Ok(Value::Null),
        AvroSchema::Boolean => decode_boolean(data).map(Value::Boolean),
        AvroSchema::Int => decode_int(data).map(Value::Int),
        AvroSchema::Long => decode_long(data).map(Value::Long),
        AvroSchema::Float => decode_float(data).map(Value::Float),
        AvroSchema::Double => decode_double(data).map(Value::Double),
        AvroSchema::Bytes => decode_bytes(data).map(Value::Bytes),
        AvroSchema::String => decode_string(data).map(Value::String),

        AvroSchema::Record(record) => decode_record(data, record, context).map(Value::Record),
        AvroSchema::Enum(enum_schema) => decode_enum(data, enum_schema).map(Value::String),
        AvroSchema::Array(item_schema) => {
            let mut items = Vec::new();
            let item_width = has_width(item_schema, context, 0);
            loop {
                let count = decode_block_count(data)?;
                if count == 0 {
                    break;
                }
                check_block_count(count, data.len(), item_width)?;
                items.reserve(count);
                for _ in 0..count {
                    items.push(decode_value(data, item_schema, context)?);
                }
            }
            Ok(Value::Array(items))
        }
        AvroSchema::Map(value_schema) => {
            let mut entries = Payload::new();
            loop {
                let count = decode_block_count(data)?;
                if count == 0 {
                    break;
                }
                check_block_count(count, data.len(), true)?;
                for _ in 0..count {
                    let key = decode_string(data)?;
                    let value = decode_value(data, value_schema, context)?;
                    entries.insert(key, value);
                }
            }
            Ok(Value::Map(entries))
        }
        AvroSchema::Union(variants) => {
            let index = decode_int(data)?;
            let variant = usize::try_from(index)
                .ok()
                .and_then(|i| variants.get(i))
                .ok_or_else(|| {
                    DecodeError::InvalidData(format!(
                        "Union index {} out of range (0..{})",
                        index,
                        variants.len()
                    ))
                })?;
            decode_value(data, variant, context)
        }

        AvroSchema::Named(name) => match context.get(name) {
            Some(resolved) => decode_value(data, resolved, context),
            None => Err(DecodeError::InvalidData(format!(
                "Unresolved named type reference: '{}'",
                name
            ))),
        },

        AvroSchema::Logical(logical) => decode_value(data, &logical.base, context),
    }
}
