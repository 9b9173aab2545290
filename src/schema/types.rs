//! Avro schema types and representations.
//!
//! Covers the primitives, records, enums, arrays, maps, unions and the
//! logical-type annotations this crate coerces or passes through.

use serde_json::{json, Map, Value};

/// Represents an Avro schema.
#[derive(Debug, Clone, PartialEq)]
pub enum AvroSchema {
    // Primitive types
    /// Null type - no value.
    Null,
    /// Boolean type.
    Boolean,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE 754 floating-point.
    Float,
    /// 64-bit IEEE 754 floating-point.
    Double,
    /// Sequence of bytes.
    Bytes,
    /// Unicode string.
    String,

    // Complex types
    /// Record type with named fields.
    Record(RecordSchema),
    /// Enumeration type.
    Enum(EnumSchema),
    /// Array of items with a single schema.
    Array(Box<AvroSchema>),
    /// Map with string keys and values of a single schema.
    Map(Box<AvroSchema>),
    /// Union of multiple schemas.
    Union(Vec<AvroSchema>),

    /// Named type reference, by full name.
    Named(String),

    /// Logical type wrapper.
    Logical(LogicalType),
}

/// Schema for a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    /// The name of the record.
    pub name: String,
    /// Optional namespace for the record.
    pub namespace: Option<String>,
    /// The fields of the record, in declaration order.
    pub fields: Vec<FieldSchema>,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Aliases for this record.
    pub aliases: Vec<String>,
}

impl RecordSchema {
    /// Create a new RecordSchema with the given name and fields.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            fields,
            doc: None,
            aliases: Vec::new(),
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the documentation.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Get the fully qualified name.
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}.{}", ns, self.name),
            _ => self.name.clone(),
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Serialize the record schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!("record"));
        obj.insert("name".to_string(), json!(&self.name));

        if let Some(ns) = &self.namespace {
            obj.insert("namespace".to_string(), json!(ns));
        }

        if let Some(doc) = &self.doc {
            obj.insert("doc".to_string(), json!(doc));
        }

        if !self.aliases.is_empty() {
            obj.insert("aliases".to_string(), json!(&self.aliases));
        }

        let fields: Vec<Value> = self.fields.iter().map(|f| f.to_json_value()).collect();
        obj.insert("fields".to_string(), Value::Array(fields));

        Value::Object(obj)
    }
}

/// Schema for a field within a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// The name of the field.
    pub name: String,
    /// The schema of the field's value.
    pub schema: AvroSchema,
    /// Optional default value for the field.
    pub default: Option<Value>,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Field ordering (ascending, descending, ignore).
    pub order: FieldOrder,
    /// Aliases for this field.
    pub aliases: Vec<String>,
}

impl FieldSchema {
    /// Create a new FieldSchema with the given name and schema.
    pub fn new(name: impl Into<String>, schema: AvroSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            default: None,
            doc: None,
            order: FieldOrder::Ascending,
            aliases: Vec::new(),
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the documentation.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Whether a payload may omit this field.
    pub fn is_optional(&self) -> bool {
        self.default.is_some() || self.schema.is_nullable()
    }

    /// Serialize the field schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".to_string(), json!(&self.name));
        obj.insert("type".to_string(), self.schema.to_json_value());

        if let Some(default) = &self.default {
            obj.insert("default".to_string(), default.clone());
        }

        if let Some(doc) = &self.doc {
            obj.insert("doc".to_string(), json!(doc));
        }

        if self.order != FieldOrder::Ascending {
            obj.insert("order".to_string(), json!(self.order.as_str()));
        }

        if !self.aliases.is_empty() {
            obj.insert("aliases".to_string(), json!(&self.aliases));
        }

        Value::Object(obj)
    }
}

/// Field ordering for record comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    #[default]
    Ascending,
    Descending,
    Ignore,
}

impl FieldOrder {
    fn as_str(&self) -> &'static str {
        match self {
            FieldOrder::Ascending => "ascending",
            FieldOrder::Descending => "descending",
            FieldOrder::Ignore => "ignore",
        }
    }
}

/// Schema for an enumeration type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    /// The name of the enum.
    pub name: String,
    /// Optional namespace for the enum.
    pub namespace: Option<String>,
    /// The symbols (variants) of the enum.
    pub symbols: Vec<String>,
    /// Optional documentation.
    pub doc: Option<String>,
    /// Aliases for this enum.
    pub aliases: Vec<String>,
    /// Default symbol.
    pub default: Option<String>,
}

impl EnumSchema {
    /// Create a new EnumSchema with the given name and symbols.
    pub fn new(name: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            symbols,
            doc: None,
            aliases: Vec::new(),
            default: None,
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Get the fully qualified name.
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}.{}", ns, self.name),
            _ => self.name.clone(),
        }
    }

    /// Get the index of a symbol.
    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Serialize the enum schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), json!("enum"));
        obj.insert("name".to_string(), json!(&self.name));

        if let Some(ns) = &self.namespace {
            obj.insert("namespace".to_string(), json!(ns));
        }

        if let Some(doc) = &self.doc {
            obj.insert("doc".to_string(), json!(doc));
        }

        if !self.aliases.is_empty() {
            obj.insert("aliases".to_string(), json!(&self.aliases));
        }

        obj.insert("symbols".to_string(), json!(&self.symbols));

        if let Some(default) = &self.default {
            obj.insert("default".to_string(), json!(default));
        }

        Value::Object(obj)
    }
}

/// Logical type annotation over a primitive base schema.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalType {
    /// The underlying Avro schema.
    pub base: Box<AvroSchema>,
    /// The logical type name and parameters.
    pub logical_type: LogicalTypeName,
}

impl LogicalType {
    /// Create a new LogicalType.
    pub fn new(base: AvroSchema, logical_type: LogicalTypeName) -> Self {
        Self {
            base: Box::new(base),
            logical_type,
        }
    }

    /// Serialize as the base type object plus `logicalType` and its parameters.
    pub fn to_json_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), self.base.to_json_value());
        obj.insert("logicalType".to_string(), json!(self.logical_type.name()));

        if let LogicalTypeName::Decimal { precision, scale } = &self.logical_type {
            obj.insert("precision".to_string(), json!(precision));
            if *scale > 0 {
                obj.insert("scale".to_string(), json!(scale));
            }
        }

        Value::Object(obj)
    }
}

/// Logical type names with their parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalTypeName {
    /// Decimal with precision and scale, over bytes.
    Decimal { precision: u32, scale: u32 },
    /// UUID over string.
    Uuid,
    /// Days since Unix epoch, over int.
    Date,
    /// Milliseconds since midnight, over int.
    TimeMillis,
    /// Microseconds since midnight, over long.
    TimeMicros,
    /// Milliseconds since Unix epoch, over long.
    TimestampMillis,
    /// Microseconds since Unix epoch, over long.
    TimestampMicros,
}

impl LogicalTypeName {
    /// Get the string name of the logical type.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalTypeName::Decimal { .. } => "decimal",
            LogicalTypeName::Uuid => "uuid",
            LogicalTypeName::Date => "date",
            LogicalTypeName::TimeMillis => "time-millis",
            LogicalTypeName::TimeMicros => "time-micros",
            LogicalTypeName::TimestampMillis => "timestamp-millis",
            LogicalTypeName::TimestampMicros => "timestamp-micros",
        }
    }
}

impl AvroSchema {
    /// Check if this schema is a primitive type.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            AvroSchema::Null
                | AvroSchema::Boolean
                | AvroSchema::Int
                | AvroSchema::Long
                | AvroSchema::Float
                | AvroSchema::Double
                | AvroSchema::Bytes
                | AvroSchema::String
        )
    }

    /// Get the fully qualified name of a named type, if applicable.
    pub fn fullname(&self) -> Option<String> {
        match self {
            AvroSchema::Record(r) => Some(r.fullname()),
            AvroSchema::Enum(e) => Some(e.fullname()),
            AvroSchema::Named(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// The record definition, if this schema is a record.
    pub fn as_record(&self) -> Option<&RecordSchema> {
        match self {
            AvroSchema::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Check if this schema is a union containing null.
    pub fn is_nullable(&self) -> bool {
        match self {
            AvroSchema::Union(variants) => variants.iter().any(|v| matches!(v, AvroSchema::Null)),
            _ => false,
        }
    }

    /// For a union, the first branch that is not null.
    pub fn first_non_null(&self) -> Option<&AvroSchema> {
        match self {
            AvroSchema::Union(variants) => variants.iter().find(|v| !matches!(v, AvroSchema::Null)),
            _ => None,
        }
    }

    /// The type symbol of this schema: the primitive name for primitives,
    /// the complex kind otherwise. Logical types report their base type.
    pub fn type_tag(&self) -> &'static str {
        match self {
            AvroSchema::Null => "null",
            AvroSchema::Boolean => "boolean",
            AvroSchema::Int => "int",
            AvroSchema::Long => "long",
            AvroSchema::Float => "float",
            AvroSchema::Double => "double",
            AvroSchema::Bytes => "bytes",
            AvroSchema::String => "string",
            AvroSchema::Record(_) => "record",
            AvroSchema::Enum(_) => "enum",
            AvroSchema::Array(_) => "array",
            AvroSchema::Map(_) => "map",
            AvroSchema::Union(_) => "union",
            AvroSchema::Named(_) => "named",
            AvroSchema::Logical(lt) => lt.base.type_tag(),
        }
    }

    /// Serialize the schema to a JSON string.
    ///
    /// # Example
    /// ```
    /// use avrokey::schema::AvroSchema;
    ///
    /// let schema = AvroSchema::String;
    /// assert_eq!(schema.to_json(), r#""string""#);
    /// ```
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Serialize the schema to a JSON Value.
    pub fn to_json_value(&self) -> Value {
        match self {
            AvroSchema::Record(r) => r.to_json_value(),
            AvroSchema::Enum(e) => e.to_json_value(),
            AvroSchema::Array(items) => {
                json!({
                    "type": "array",
                    "items": items.to_json_value()
                })
            }
            AvroSchema::Map(values) => {
                json!({
                    "type": "map",
                    "values": values.to_json_value()
                })
            }
            AvroSchema::Union(variants) => {
                Value::Array(variants.iter().map(|v| v.to_json_value()).collect())
            }
            AvroSchema::Named(name) => json!(name),
            AvroSchema::Logical(lt) => lt.to_json_value(),
            primitive => json!(primitive.type_tag()),
        }
    }
}
