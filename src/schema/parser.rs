//! JSON schema parser for Avro schemas.
//!
//! Parses Avro schema JSON into the AvroSchema type hierarchy.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SchemaError;
use crate::schema::{
    AvroSchema, EnumSchema, FieldOrder, FieldSchema, LogicalType, LogicalTypeName, RecordSchema,
};

/// Parse an Avro schema from a JSON string.
///
/// # Example
/// ```
/// use avrokey::schema::parse_schema;
///
/// let schema = parse_schema(r#""string""#).unwrap();
/// ```
pub fn parse_schema(json: &str) -> Result<AvroSchema, SchemaError> {
    parse_schema_with_options(json, false)
}

/// Parse an Avro schema from a JSON string with validation options.
///
/// In strict mode names must follow Avro naming rules and unions may not
/// repeat a type or nest another union. In permissive mode (default) these
/// violations are logged and parsing continues.
pub fn parse_schema_with_options(json: &str, strict: bool) -> Result<AvroSchema, SchemaError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| SchemaError::ParseError(format!("Invalid JSON: {}", e)))?;

    let mut parser = SchemaParser::new().with_strict(strict);
    parser.parse(&value)
}

/// Schema parser with named type resolution context.
///
/// Maintains a registry of named types (records, enums) defined while
/// parsing, so later references can be recognised.
#[derive(Debug, Default)]
pub struct SchemaParser {
    /// Registry of named types by their fully qualified name
    named_types: HashMap<String, AvroSchema>,
    /// Current namespace for resolving unqualified names
    current_namespace: Option<String>,
    /// Whether to enforce strict schema validation
    strict_schema: bool,
}

impl SchemaParser {
    /// Create a new SchemaParser with default settings (permissive mode).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to use strict schema validation.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict_schema = strict;
        self
    }

    /// Parse a JSON value into an AvroSchema.
    pub fn parse(&mut self, value: &Value) -> Result<AvroSchema, SchemaError> {
        match value {
            Value::String(s) => Ok(self.parse_string_schema(s)),
            Value::Object(obj) => self.parse_object_schema(obj),
            Value::Array(arr) => self.parse_union_schema(arr),
            _ => Err(SchemaError::InvalidSchema(format!(
                "Expected string, object, or array, found: {}",
                value
            ))),
        }
    }

    /// Parse a primitive type or named type reference from a string.
    ///
    /// Unknown names become `Named` references; they may be defined later
    /// in the same schema or be supplied by the store.
    fn parse_string_schema(&self, s: &str) -> AvroSchema {
        primitive(s).unwrap_or_else(|| AvroSchema::Named(self.resolve_name(s)))
    }

    /// Parse a complex type from a JSON object.
    fn parse_object_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        if let Some(logical_type) = obj.get("logicalType") {
            return self.parse_logical_type(obj, logical_type);
        }

        let type_value = obj
            .get("type")
            .ok_or_else(|| SchemaError::InvalidSchema("Missing 'type' field".to_string()))?;

        let type_str = match type_value {
            Value::String(s) => s.as_str(),
            // {"type": {...}} or {"type": [...]} wraps another schema
            nested => return self.parse(nested),
        };

        match type_str {
            "record" => self.parse_record_schema(obj),
            "enum" => self.parse_enum_schema(obj),
            "array" => self.parse_array_schema(obj),
            "map" => self.parse_map_schema(obj),
            "fixed" => Err(SchemaError::UnsupportedType(
                "fixed is not supported".to_string(),
            )),
            other => Ok(self.parse_string_schema(other)),
        }
    }

    /// Parse a union schema from a JSON array.
    fn parse_union_schema(&mut self, arr: &[Value]) -> Result<AvroSchema, SchemaError> {
        if arr.is_empty() {
            return Err(SchemaError::InvalidSchema(
                "Union schema cannot be empty".to_string(),
            ));
        }

        let variants = arr
            .iter()
            .map(|v| self.parse(v))
            .collect::<Result<Vec<_>, _>>()?;

        self.validate_union(&variants)?;

        Ok(AvroSchema::Union(variants))
    }

    /// Split a possibly dotted name into (short name, namespace) using the
    /// explicit namespace or the enclosing one.
    fn qualify(&self, name: &str, namespace: Option<String>) -> (String, Option<String>) {
        if let Some((ns, short)) = name.rsplit_once('.') {
            return (short.to_string(), Some(ns.to_string()));
        }
        let namespace = namespace
            .or_else(|| self.current_namespace.clone())
            .filter(|ns| !ns.is_empty());
        (name.to_string(), namespace)
    }

    /// Parse a record schema.
    fn parse_record_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let raw_name = required_str(obj, "name", "Record")?;
        let (name, namespace) = self.qualify(raw_name, optional_string(obj, "namespace"));
        self.validate_name(&name, "Record")?;

        let fullname = full_name(&name, namespace.as_deref());

        // Register before parsing fields so self references resolve
        self.named_types
            .insert(fullname.clone(), AvroSchema::Named(fullname.clone()));

        let fields_value = obj
            .get("fields")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                SchemaError::InvalidSchema(format!("Record {} missing 'fields' array", fullname))
            })?;

        let prev_namespace = std::mem::replace(&mut self.current_namespace, namespace.clone());
        let fields = fields_value
            .iter()
            .map(|f| self.parse_field_schema(f))
            .collect::<Result<Vec<_>, _>>();
        self.current_namespace = prev_namespace;
        let fields = fields?;

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Record {} declares field '{}' more than once",
                    fullname, field.name
                )));
            }
        }

        let schema = AvroSchema::Record(RecordSchema {
            name,
            namespace,
            fields,
            doc: optional_string(obj, "doc"),
            aliases: string_list(obj, "aliases"),
        });

        self.named_types.insert(fullname, schema.clone());

        Ok(schema)
    }

    /// Parse a field schema within a record.
    fn parse_field_schema(&mut self, value: &Value) -> Result<FieldSchema, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::InvalidSchema("Field must be an object".to_string()))?;

        let name = required_str(obj, "name", "Field")?.to_string();
        self.validate_name(&name, "Field")?;

        let type_value = obj.get("type").ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Field '{}' missing 'type'", name))
        })?;

        let schema = self.parse(type_value)?;

        let order = match obj.get("order").and_then(|v| v.as_str()) {
            Some("descending") => FieldOrder::Descending,
            Some("ignore") => FieldOrder::Ignore,
            _ => FieldOrder::Ascending,
        };

        Ok(FieldSchema {
            name,
            schema,
            default: obj.get("default").cloned(),
            doc: optional_string(obj, "doc"),
            order,
            aliases: string_list(obj, "aliases"),
        })
    }

    /// Parse an enum schema.
    fn parse_enum_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let raw_name = required_str(obj, "name", "Enum")?;
        let (name, namespace) = self.qualify(raw_name, optional_string(obj, "namespace"));
        self.validate_name(&name, "Enum")?;

        let symbols = obj
            .get("symbols")
            .and_then(|v| v.as_array())
            .ok_or_else(|| SchemaError::InvalidSchema("Enum missing 'symbols' array".to_string()))?
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect::<Vec<_>>();

        if symbols.is_empty() {
            return Err(SchemaError::InvalidSchema(
                "Enum must have at least one symbol".to_string(),
            ));
        }

        for symbol in &symbols {
            self.validate_name(symbol, "Enum symbol")?;
        }

        let fullname = full_name(&name, namespace.as_deref());
        let schema = AvroSchema::Enum(EnumSchema {
            name,
            namespace,
            symbols,
            doc: optional_string(obj, "doc"),
            aliases: string_list(obj, "aliases"),
            default: optional_string(obj, "default"),
        });
        self.named_types.insert(fullname, schema.clone());

        Ok(schema)
    }

    /// Parse an array schema.
    fn parse_array_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let items = obj
            .get("items")
            .ok_or_else(|| SchemaError::InvalidSchema("Array missing 'items' field".to_string()))?;

        Ok(AvroSchema::Array(Box::new(self.parse(items)?)))
    }

    /// Parse a map schema.
    fn parse_map_schema(&mut self, obj: &Map<String, Value>) -> Result<AvroSchema, SchemaError> {
        let values = obj
            .get("values")
            .ok_or_else(|| SchemaError::InvalidSchema("Map missing 'values' field".to_string()))?;

        Ok(AvroSchema::Map(Box::new(self.parse(values)?)))
    }

    /// Parse a logical type annotation.
    fn parse_logical_type(
        &mut self,
        obj: &Map<String, Value>,
        logical_type_value: &Value,
    ) -> Result<AvroSchema, SchemaError> {
        let logical_type_name = logical_type_value.as_str().ok_or_else(|| {
            SchemaError::InvalidSchema("logicalType must be a string".to_string())
        })?;

        let type_str = obj.get("type").and_then(|v| v.as_str()).ok_or_else(|| {
            SchemaError::InvalidSchema("Logical type missing 'type' field".to_string())
        })?;

        let base_schema = match primitive(type_str) {
            Some(base) => base,
            None if type_str == "fixed" => {
                return Err(SchemaError::UnsupportedType(
                    "fixed is not supported".to_string(),
                ))
            }
            None => {
                return Err(SchemaError::InvalidSchema(format!(
                    "Invalid base type for logical type: {}",
                    type_str
                )))
            }
        };

        let logical_type = match (logical_type_name, &base_schema) {
            ("decimal", AvroSchema::Bytes) => {
                let precision = obj
                    .get("precision")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        SchemaError::InvalidSchema("Decimal missing 'precision'".to_string())
                    })? as u32;
                let scale = obj.get("scale").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                LogicalTypeName::Decimal { precision, scale }
            }
            ("uuid", AvroSchema::String) => LogicalTypeName::Uuid,
            ("date", AvroSchema::Int) => LogicalTypeName::Date,
            ("time-millis", AvroSchema::Int) => LogicalTypeName::TimeMillis,
            ("time-micros", AvroSchema::Long) => LogicalTypeName::TimeMicros,
            ("timestamp-millis", AvroSchema::Long) => LogicalTypeName::TimestampMillis,
            ("timestamp-micros", AvroSchema::Long) => LogicalTypeName::TimestampMicros,
            // Unknown or misplaced logical types fall back to the base type
            _ => return Ok(base_schema),
        };

        Ok(AvroSchema::Logical(LogicalType::new(
            base_schema,
            logical_type,
        )))
    }

    /// Resolve a type name to its fully qualified form.
    fn resolve_name(&self, name: &str) -> String {
        match &self.current_namespace {
            Some(ns) if !name.contains('.') && !self.named_types.contains_key(name) => {
                format!("{}.{}", ns, name)
            }
            _ => name.to_string(),
        }
    }

    /// Validate that a name follows Avro naming rules: `[A-Za-z_][A-Za-z0-9_]*`.
    fn validate_name(&self, name: &str, context: &str) -> Result<(), SchemaError> {
        let mut chars = name.chars();
        let problem = match chars.next() {
            None => Some(format!("{} name cannot be empty", context)),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => Some(format!(
                "{} name '{}' must start with a letter or underscore",
                context, name
            )),
            Some(_) => chars
                .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
                .map(|ch| {
                    format!(
                        "{} name '{}' contains invalid character '{}'",
                        context, name, ch
                    )
                }),
        };

        match problem {
            Some(msg) if self.strict_schema => Err(SchemaError::InvalidSchema(msg)),
            Some(msg) => {
                warn!("{}", msg);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Validate union schema rules: no nested unions, no duplicate types.
    fn validate_union(&self, variants: &[AvroSchema]) -> Result<(), SchemaError> {
        let mut seen_types = HashSet::new();
        for (i, variant) in variants.iter().enumerate() {
            let msg = if matches!(variant, AvroSchema::Union(_)) {
                Some(format!("Union contains nested union at position {}", i))
            } else {
                let key = type_key(variant);
                (!seen_types.insert(key.clone()))
                    .then(|| format!("Union contains duplicate type '{}' at position {}", key, i))
            };

            if let Some(msg) = msg {
                if self.strict_schema {
                    return Err(SchemaError::InvalidSchema(msg));
                }
                warn!("{}", msg);
            }
        }

        Ok(())
    }
}

fn primitive(name: &str) -> Option<AvroSchema> {
    match name {
        "null" => Some(AvroSchema::Null),
        "boolean" => Some(AvroSchema::Boolean),
        "int" => Some(AvroSchema::Int),
        "long" => Some(AvroSchema::Long),
        "float" => Some(AvroSchema::Float),
        "double" => Some(AvroSchema::Double),
        "bytes" => Some(AvroSchema::Bytes),
        "string" => Some(AvroSchema::String),
        _ => None,
    }
}

/// A unique key for a schema type (for duplicate detection in unions).
fn type_key(schema: &AvroSchema) -> String {
    match schema.fullname() {
        Some(name) => format!("{}:{}", schema.type_tag(), name),
        None => schema.type_tag().to_string(),
    }
}

fn full_name(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{}.{}", ns, name),
        None => name.to_string(),
    }
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    context: &str,
) -> Result<&'a str, SchemaError> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| SchemaError::InvalidSchema(format!("{} missing '{}' field", context, key)))
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
