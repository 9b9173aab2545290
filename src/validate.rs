//! Strict payload validation.
//!
//! Validation is closed-world and recursive: at every record level each
//! payload key must be declared by the schema, each declared field must be
//! present unless it is nullable or has a default, and every value must
//! have the declared type. The first violation is reported with its path.

use crate::error::{ValidationError, ValidationReason};
use crate::schema::{AvroSchema, RecordSchema, SchemaResolutionContext};
use crate::value::{Payload, Value};

/// Validate `payload` against a record schema.
///
/// `schema` must be a record (or a reference resolving to one through the
/// context built from `schema` itself).
pub fn validate_payload(payload: &Payload, schema: &AvroSchema) -> Result<(), ValidationError> {
    let context = SchemaResolutionContext::build_from_schema(schema);
    let schema_name = schema.fullname().unwrap_or_else(|| schema.type_tag().to_string());
    let validator = Validator {
        context: &context,
    };

    let record = match context.deref(schema) {
        Some(AvroSchema::Record(record)) => record,
        _ => {
            return Err(ValidationError::new(
                schema_name,
                ROOT,
                ValidationReason::TypeMismatch {
                    expected: describe(schema),
                    found: "record".to_string(),
                },
            ))
        }
    };

    validator
        .check_record(record, payload, "")
        .map_err(|(path, reason)| ValidationError::new(schema_name, path, reason))
}

/// Whether `value` is acceptable for `schema` under strict validation.
pub fn value_matches(schema: &AvroSchema, value: &Value, context: &SchemaResolutionContext) -> bool {
    Validator { context }.check(schema, value, "").is_ok()
}

const ROOT: &str = "$root";

type Failure = (String, ValidationReason);

struct Validator<'a> {
    context: &'a SchemaResolutionContext,
}

impl Validator<'_> {
    fn check_record(&self, record: &RecordSchema, payload: &Payload, path: &str) -> Result<(), Failure> {
        if let Some(extra) = payload.keys().find(|key| record.field(key).is_none()) {
            return Err((join(path, extra), ValidationReason::ExtraField));
        }

        for field in &record.fields {
            let field_path = join(path, &field.name);
            match payload.get(&field.name) {
                Some(value) => self.check(&field.schema, value, &field_path)?,
                None if field.is_optional() => {}
                None => return Err((field_path, ValidationReason::MissingField)),
            }
        }

        Ok(())
    }

    fn check(&self, schema: &AvroSchema, value: &Value, path: &str) -> Result<(), Failure> {
        let mismatch = || {
            Err((
                display_path(path),
                ValidationReason::TypeMismatch {
                    expected: describe(schema),
                    found: value.kind().to_string(),
                },
            ))
        };

        match (schema, value) {
            (AvroSchema::Null, Value::Null)
            | (AvroSchema::Boolean, Value::Boolean(_))
            | (AvroSchema::Int, Value::Int(_))
            | (AvroSchema::Long, Value::Int(_) | Value::Long(_))
            | (
                AvroSchema::Float | AvroSchema::Double,
                Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_),
            )
            | (AvroSchema::Bytes, Value::Bytes(_))
            | (AvroSchema::String, Value::String(_)) => Ok(()),

            (AvroSchema::Int, Value::Long(l)) => {
                if i32::try_from(*l).is_ok() {
                    Ok(())
                } else {
                    Err((display_path(path), ValidationReason::OutOfRange { value: *l }))
                }
            }

            (AvroSchema::Enum(enum_schema), Value::String(symbol)) => {
                if enum_schema.symbol_index(symbol).is_some() {
                    Ok(())
                } else {
                    Err((
                        display_path(path),
                        ValidationReason::UnknownSymbol {
                            symbol: symbol.clone(),
                        },
                    ))
                }
            }

            (AvroSchema::Record(record), Value::Record(fields) | Value::Map(fields)) => {
                self.check_record(record, fields, path)
            }

            (AvroSchema::Array(items), Value::Array(values)) => {
                for (i, item) in values.iter().enumerate() {
                    self.check(items, item, &format!("{}[{}]", display_path(path), i))?;
                }
                Ok(())
            }

            (AvroSchema::Map(values), Value::Map(entries) | Value::Record(entries)) => {
                for (key, item) in entries {
                    self.check(values, item, &format!("{}[{}]", display_path(path), key))?;
                }
                Ok(())
            }

            (AvroSchema::Union(variants), _) => {
                if variants
                    .iter()
                    .any(|variant| self.check(variant, value, path).is_ok())
                {
                    Ok(())
                } else {
                    mismatch()
                }
            }

            (AvroSchema::Named(name), _) => match self.context.get(name) {
                Some(resolved) => self.check(resolved, value, path),
                None => Err((
                    display_path(path),
                    ValidationReason::UnresolvedName { name: name.clone() },
                )),
            },

            (AvroSchema::Logical(logical), _) => self.check(&logical.base, value, path),

            _ => mismatch(),
        }
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        ROOT.to_string()
    } else {
        path.to_string()
    }
}

/// Human-readable name of a schema type for error messages.
pub(crate) fn describe(schema: &AvroSchema) -> String {
    match schema {
        AvroSchema::Record(_) | AvroSchema::Enum(_) | AvroSchema::Named(_) => {
            format!("{} {}", schema.type_tag(), schema.fullname().unwrap_or_default())
        }
        AvroSchema::Array(items) => format!("array<{}>", describe(items)),
        AvroSchema::Map(values) => format!("map<{}>", describe(values)),
        AvroSchema::Union(variants) => format!(
            "union[{}]",
            variants.iter().map(describe).collect::<Vec<_>>().join(", ")
        ),
        AvroSchema::Logical(logical) => {
            format!("{} ({})", logical.base.type_tag(), logical.logical_type.name())
        }
        primitive => primitive.type_tag().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use crate::schema::parse_schema;

    fn user_schema() -> AvroSchema {
        parse_schema(
            r#"{"type": "record", "name": "User", "namespace": "com.example", "fields": [
                {"name": "id", "type": "long"},
                {"name": "nick", "type": ["null", "string"]},
                {"name": "age", "type": "int", "default": 0},
                {"name": "address", "type": {"type": "record", "name": "Address", "fields": [
                    {"name": "city", "type": "string"}
                ]}}
            ]}"#,
        )
        .unwrap()
    }

    fn address(city: impl Into<Value>) -> Value {
        let city: Value = city.into();
        Value::Record(payload! { "city" => city })
    }

    #[test]
    fn test_accepts_optional_subset() {
        let p = payload! { "id" => 1i64, "address" => address("Paris") };
        assert!(validate_payload(&p, &user_schema()).is_ok());
    }

    #[test]
    fn test_rejects_extra_field() {
        let p = payload! { "id" => 1i64, "address" => address("Paris"), "bogus" => true };
        let err = validate_payload(&p, &user_schema()).unwrap_err();
        assert_eq!(err.path, "bogus");
        assert_eq!(err.reason, ValidationReason::ExtraField);
        assert_eq!(err.schema, "com.example.User");
    }

    #[test]
    fn test_rejects_nested_extra_field() {
        let nested = Value::Record(payload! { "city" => "Paris", "zip" => "75001" });
        let p = payload! { "id" => 1i64, "address" => nested };
        let err = validate_payload(&p, &user_schema()).unwrap_err();
        assert_eq!(err.path, "address.zip");
        assert_eq!(err.reason, ValidationReason::ExtraField);
    }

    #[test]
    fn test_rejects_missing_required_field() {
        let p = payload! { "address" => address("Paris") };
        let err = validate_payload(&p, &user_schema()).unwrap_err();
        assert_eq!(err.path, "id");
        assert_eq!(err.reason, ValidationReason::MissingField);
    }

    #[test]
    fn test_rejects_nested_type_mismatch() {
        let p = payload! { "id" => 1i64, "address" => address(5i32) };
        let err = validate_payload(&p, &user_schema()).unwrap_err();
        assert_eq!(err.path, "address.city");
        assert_eq!(
            err.reason,
            ValidationReason::TypeMismatch {
                expected: "string".to_string(),
                found: "int".to_string()
            }
        );
    }

    #[test]
    fn test_int_range() {
        let p = payload! { "id" => 1i64, "age" => i64::MAX, "address" => address("Paris") };
        let err = validate_payload(&p, &user_schema()).unwrap_err();
        assert_eq!(err.reason, ValidationReason::OutOfRange { value: i64::MAX });
    }

    #[test]
    fn test_loose_values_are_not_valid() {
        let p = payload! { "id" => 1i64, "nick" => Value::symbol("x"), "address" => address("Paris") };
        let err = validate_payload(&p, &user_schema()).unwrap_err();
        assert_eq!(err.path, "nick");
    }

    #[test]
    fn test_enum_symbols_and_array_paths() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Bag", "fields": [
                {"name": "colors", "type": {"type": "array", "items":
                    {"type": "enum", "name": "Color", "symbols": ["RED", "BLUE"]}}}
            ]}"#,
        )
        .unwrap();
        let ok = payload! { "colors" => Value::Array(vec![Value::from("RED")]) };
        assert!(validate_payload(&ok, &schema).is_ok());

        let bad = payload! { "colors" => Value::Array(vec![Value::from("RED"), Value::from("PINK")]) };
        let err = validate_payload(&bad, &schema).unwrap_err();
        assert_eq!(err.path, "colors[1]");
        assert_eq!(
            err.reason,
            ValidationReason::UnknownSymbol {
                symbol: "PINK".to_string()
            }
        );
    }

    #[test]
    fn test_recursive_schema() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Node", "fields": [
                {"name": "value", "type": "int"},
                {"name": "next", "type": ["null", "Node"]}
            ]}"#,
        )
        .unwrap();
        let tail = Value::Record(payload! { "value" => 2i32, "next" => Value::Null });
        let head = payload! { "value" => 1i32, "next" => tail };
        assert!(validate_payload(&head, &schema).is_ok());
    }
}
