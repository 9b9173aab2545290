//! Loose-to-strict value coercion.
//!
//! Callers hand the backend whatever they have: numeric strings, symbols,
//! wall-clock instants, their own string-ish types. [`SchemaCoercer`] turns
//! these into the exact value kinds the schema declares so that strict
//! validation and encoding can follow. Values that are already well typed
//! pass through unchanged, which makes coercion idempotent.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};

use crate::error::{BackendError, CoercionError};
use crate::schema::{AvroSchema, LogicalTypeName, SchemaResolutionContext};
use crate::value::{Payload, Value};

/// Coerces payloads against one resolved record schema.
#[derive(Debug, Clone)]
pub struct SchemaCoercer {
    schema: Arc<AvroSchema>,
    context: SchemaResolutionContext,
}

impl SchemaCoercer {
    /// Create a coercer for `schema`. Named references inside the schema are
    /// resolved through the types the schema itself defines.
    pub fn new(schema: Arc<AvroSchema>) -> Self {
        let context = SchemaResolutionContext::build_from_schema(&schema);
        Self { schema, context }
    }

    /// The schema this coercer works against.
    pub fn schema(&self) -> &Arc<AvroSchema> {
        &self.schema
    }

    /// Coerce every declared field present in `payload`.
    ///
    /// Absent fields stay absent and undeclared keys are carried through, so
    /// that strict validation can still report them.
    pub fn coerce_record(&self, payload: &Payload) -> Result<Payload, BackendError> {
        let record = match self.context.deref(&self.schema) {
            Some(AvroSchema::Record(record)) => record,
            _ => return Ok(payload.clone()),
        };

        let mut out = payload.clone();
        for field in &record.fields {
            if let Some(value) = out.remove(&field.name) {
                let coerced = self.coerce_type(&field.schema, value).map_err(|source| {
                    BackendError::Coercion {
                        field: field.name.clone(),
                        source,
                    }
                })?;
                out.insert(field.name.clone(), coerced);
            }
        }
        Ok(out)
    }

    /// Coerce a single value to `schema`.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use avrokey::coerce::SchemaCoercer;
    /// use avrokey::schema::AvroSchema;
    /// use avrokey::Value;
    ///
    /// let coercer = SchemaCoercer::new(Arc::new(AvroSchema::Null));
    /// assert_eq!(coercer.coerce_type(&AvroSchema::Int, Value::from(" 42 ")).unwrap(), Value::Int(42));
    /// assert_eq!(coercer.coerce_type(&AvroSchema::Boolean, Value::Null).unwrap(), Value::Boolean(false));
    /// ```
    pub fn coerce_type(&self, schema: &AvroSchema, value: Value) -> Result<Value, CoercionError> {
        match schema {
            AvroSchema::Union(_) => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                match schema.first_non_null() {
                    Some(branch) => self.coerce_type(branch, value),
                    None => Ok(value),
                }
            }
            AvroSchema::Named(name) => {
                let resolved = self
                    .context
                    .get(name)
                    .ok_or_else(|| CoercionError::UnresolvedName(name.clone()))?;
                self.coerce_type(resolved, value)
            }
            AvroSchema::Logical(logical) => match (&logical.logical_type, logical.base.as_ref(), value) {
                (LogicalTypeName::TimestampMillis, AvroSchema::Long, Value::Timestamp(ts)) => {
                    Ok(Value::Long(ts.timestamp_millis()))
                }
                (LogicalTypeName::TimestampMicros, AvroSchema::Long, Value::Timestamp(ts)) => {
                    Ok(Value::Long(ts.timestamp_micros()))
                }
                (LogicalTypeName::Date, AvroSchema::Int, Value::Timestamp(ts)) => {
                    narrow_int(ts.timestamp().div_euclid(SECONDS_PER_DAY))
                }
                (LogicalTypeName::TimeMillis, AvroSchema::Int, Value::Timestamp(ts)) => {
                    narrow_int(micros_since_midnight(&ts) / 1_000)
                }
                (LogicalTypeName::TimeMicros, AvroSchema::Long, Value::Timestamp(ts)) => {
                    Ok(Value::Long(micros_since_midnight(&ts)))
                }
                (
                    name @ (LogicalTypeName::Date
                    | LogicalTypeName::TimeMillis
                    | LogicalTypeName::TimeMicros),
                    _,
                    value @ Value::Timestamp(_),
                ) => Err(CoercionError::Incompatible {
                    expected: name.name(),
                    found: value.kind(),
                }),
                (_, base, value) => self.coerce_type(base, value),
            },
            AvroSchema::Int => coerce_int(value),
            AvroSchema::Long => coerce_long(value),
            AvroSchema::Float => coerce_float(value, "float", |f| Value::Float(f as f32)),
            AvroSchema::Double => coerce_float(value, "double", Value::Double),
            AvroSchema::String => coerce_string(value),
            AvroSchema::Boolean => coerce_boolean(value),
            _ => Ok(value),
        }
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_)
    )
}

fn parse_integer(s: &str, expected: &'static str) -> Result<i64, CoercionError> {
    s.trim().parse::<i64>().map_err(|_| CoercionError::InvalidNumber {
        expected,
        value: s.to_string(),
    })
}

const SECONDS_PER_DAY: i64 = 86_400;

fn epoch_seconds(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp()
}

fn micros_since_midnight(ts: &DateTime<Utc>) -> i64 {
    i64::from(ts.num_seconds_from_midnight()) * 1_000_000 + i64::from(ts.nanosecond() / 1_000)
}

fn narrow_int(value: i64) -> Result<Value, CoercionError> {
    i32::try_from(value)
        .map(Value::Int)
        .map_err(|_| CoercionError::OutOfRange {
            expected: "int",
            value,
        })
}

fn coerce_int(value: Value) -> Result<Value, CoercionError> {
    match value {
        v if is_numeric(&v) => Ok(v),
        Value::String(s) => narrow_int(parse_integer(&s, "int")?),
        Value::Timestamp(ts) => narrow_int(epoch_seconds(&ts)),
        other => Err(CoercionError::Incompatible {
            expected: "int",
            found: other.kind(),
        }),
    }
}

fn coerce_long(value: Value) -> Result<Value, CoercionError> {
    match value {
        v if is_numeric(&v) => Ok(v),
        Value::String(s) => parse_integer(&s, "long").map(Value::Long),
        Value::Timestamp(ts) => Ok(Value::Long(epoch_seconds(&ts))),
        other => Err(CoercionError::Incompatible {
            expected: "long",
            found: other.kind(),
        }),
    }
}

fn coerce_float(
    value: Value,
    expected: &'static str,
    build: impl Fn(f64) -> Value,
) -> Result<Value, CoercionError> {
    match value {
        v if is_numeric(&v) => Ok(v),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(build(f)),
            _ => Err(CoercionError::InvalidNumber { expected, value: s }),
        },
        other => Err(CoercionError::Incompatible {
            expected,
            found: other.kind(),
        }),
    }
}

fn coerce_string(value: Value) -> Result<Value, CoercionError> {
    match value {
        Value::String(s) => Ok(Value::String(s)),
        Value::Symbol(s) => Ok(Value::String(s)),
        Value::StringLike(s) => Ok(Value::String(s.to_avro_string())),
        Value::Boolean(b) => Ok(Value::String(b.to_string())),
        Value::Int(i) => Ok(Value::String(i.to_string())),
        Value::Long(l) => Ok(Value::String(l.to_string())),
        Value::Float(f) => Ok(Value::String(f.to_string())),
        Value::Double(d) => Ok(Value::String(d.to_string())),
        other => Err(CoercionError::Incompatible {
            expected: "string",
            found: other.kind(),
        }),
    }
}

fn coerce_boolean(value: Value) -> Result<Value, CoercionError> {
    match value {
        Value::Null => Ok(Value::Boolean(false)),
        Value::Boolean(b) => Ok(Value::Boolean(b)),
        other => Err(CoercionError::Incompatible {
            expected: "boolean",
            found: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use crate::schema::{parse_schema, LogicalType};
    use chrono::TimeZone;

    fn coercer() -> SchemaCoercer {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Order", "fields": [
                {"name": "id", "type": "long"},
                {"name": "qty", "type": "int"},
                {"name": "label", "type": ["null", "string"]},
                {"name": "paid", "type": "boolean"}
            ]}"#,
        )
        .unwrap();
        SchemaCoercer::new(Arc::new(schema))
    }

    fn may_5_2019() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 5, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_integers() {
        let c = coercer();
        assert_eq!(c.coerce_type(&AvroSchema::Int, Value::from("1")).unwrap(), Value::Int(1));
        assert_eq!(c.coerce_type(&AvroSchema::Long, Value::from("-7")).unwrap(), Value::Long(-7));
        assert_eq!(c.coerce_type(&AvroSchema::Int, Value::Double(1.5)).unwrap(), Value::Double(1.5));
        assert_eq!(
            c.coerce_type(&AvroSchema::Int, Value::from("abc")).unwrap_err(),
            CoercionError::InvalidNumber {
                expected: "int",
                value: "abc".to_string()
            }
        );
        assert!(matches!(
            c.coerce_type(&AvroSchema::Int, Value::from("99999999999")),
            Err(CoercionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_timestamps() {
        let c = coercer();
        assert_eq!(
            c.coerce_type(&AvroSchema::Int, Value::from(may_5_2019())).unwrap(),
            Value::Int(1557014400)
        );
        assert_eq!(
            c.coerce_type(&AvroSchema::Long, Value::from(may_5_2019())).unwrap(),
            Value::Long(1557014400)
        );

        let millis = AvroSchema::Logical(LogicalType::new(
            AvroSchema::Long,
            LogicalTypeName::TimestampMillis,
        ));
        assert_eq!(
            c.coerce_type(&millis, Value::from(may_5_2019())).unwrap(),
            Value::Long(1557014400000)
        );
    }

    fn logical(base: AvroSchema, name: LogicalTypeName) -> AvroSchema {
        AvroSchema::Logical(LogicalType::new(base, name))
    }

    #[test]
    fn test_date_and_time_of_day() {
        let c = coercer();
        let at = Utc.with_ymd_and_hms(2019, 5, 5, 13, 30, 15).unwrap();

        let date = logical(AvroSchema::Int, LogicalTypeName::Date);
        assert_eq!(c.coerce_type(&date, Value::from(may_5_2019())).unwrap(), Value::Int(18021));
        assert_eq!(c.coerce_type(&date, Value::from(at)).unwrap(), Value::Int(18021));

        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(c.coerce_type(&date, Value::from(before_epoch)).unwrap(), Value::Int(-1));

        let millis = logical(AvroSchema::Int, LogicalTypeName::TimeMillis);
        assert_eq!(c.coerce_type(&millis, Value::from(at)).unwrap(), Value::Int(48_615_000));
        assert_eq!(c.coerce_type(&millis, Value::from(may_5_2019())).unwrap(), Value::Int(0));

        let micros = logical(AvroSchema::Long, LogicalTypeName::TimeMicros);
        assert_eq!(
            c.coerce_type(&micros, Value::from(at)).unwrap(),
            Value::Long(48_615_000_000)
        );
    }

    #[test]
    fn test_time_of_day_over_wrong_base_is_rejected() {
        let c = coercer();
        let date = logical(AvroSchema::Long, LogicalTypeName::Date);
        assert_eq!(
            c.coerce_type(&date, Value::from(may_5_2019())).unwrap_err(),
            CoercionError::Incompatible {
                expected: "date",
                found: Value::from(may_5_2019()).kind(),
            }
        );
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let c = coercer();
        for input in ["inf", "-inf", "NaN", "infinity"] {
            assert_eq!(
                c.coerce_type(&AvroSchema::Double, Value::from(input)).unwrap_err(),
                CoercionError::InvalidNumber {
                    expected: "double",
                    value: input.to_string()
                }
            );
            assert!(c.coerce_type(&AvroSchema::Float, Value::from(input)).is_err());
        }
        assert_eq!(
            c.coerce_type(&AvroSchema::Float, Value::from(" 1.5 ")).unwrap(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn test_strings() {
        let c = coercer();
        assert_eq!(c.coerce_type(&AvroSchema::String, Value::symbol("hi")).unwrap(), Value::from("hi"));
        assert_eq!(c.coerce_type(&AvroSchema::String, Value::Long(1)).unwrap(), Value::from("1"));
        assert_eq!(c.coerce_type(&AvroSchema::String, Value::Boolean(true)).unwrap(), Value::from("true"));
        assert!(c
            .coerce_type(&AvroSchema::String, Value::Array(vec![]))
            .is_err());
    }

    #[test]
    fn test_union_with_null() {
        let c = coercer();
        let schema = AvroSchema::Union(vec![AvroSchema::Null, AvroSchema::String]);
        assert_eq!(c.coerce_type(&schema, Value::Null).unwrap(), Value::Null);
        assert_eq!(c.coerce_type(&schema, Value::symbol("x")).unwrap(), Value::from("x"));
    }

    #[test]
    fn test_boolean_null_is_false() {
        let c = coercer();
        assert_eq!(c.coerce_type(&AvroSchema::Boolean, Value::Null).unwrap(), Value::Boolean(false));
        assert!(c.coerce_type(&AvroSchema::Boolean, Value::from("true")).is_err());
    }

    #[test]
    fn test_coerce_record_keeps_unknown_and_absent() {
        let c = coercer();
        let p = payload! { "id" => "12", "paid" => Value::Null, "extra" => Value::symbol("kept") };
        let out = c.coerce_record(&p).unwrap();
        assert_eq!(
            out,
            payload! { "id" => 12i64, "paid" => false, "extra" => Value::symbol("kept") }
        );
    }

    #[test]
    fn test_coerce_record_reports_field() {
        let c = coercer();
        let err = c.coerce_record(&payload! { "qty" => "lots" }).unwrap_err();
        assert!(matches!(err, BackendError::Coercion { ref field, .. } if field == "qty"));
    }
}
