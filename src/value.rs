//! Loosely-typed datum model.
//!
//! [`Value`] is what callers hand to the backend and what the codecs hand
//! back. Besides the canonical Avro shapes it carries three input-only
//! forms (`Symbol`, `Timestamp`, `StringLike`) that the coercer turns into
//! canonical values before anything is validated or encoded.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number};

/// A record or map payload, keyed by field name.
pub type Payload = BTreeMap<String, Value>;

/// Anything that can produce a string representation for a `string` field.
///
/// # Example
/// ```
/// use avrokey::{StringLike, Value};
///
/// #[derive(Debug)]
/// struct OrderId(u64);
///
/// impl StringLike for OrderId {
///     fn to_avro_string(&self) -> String {
///         format!("order-{}", self.0)
///     }
/// }
///
/// let value = Value::string_like(OrderId(7));
/// assert_eq!(value, Value::from("order-7"));
/// ```
pub trait StringLike: fmt::Debug + Send + Sync {
    /// The string this value stands for.
    fn to_avro_string(&self) -> String;
}

/// A datum, either canonical (as the codecs produce it) or loose input.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string (also carries enum symbols)
    String(String),
    /// Symbolic name, coerced to its string form
    Symbol(String),
    /// Wall-clock instant, coerced to epoch seconds/millis/micros
    Timestamp(DateTime<Utc>),
    /// Duck-typed string source, coerced through [`StringLike`]
    StringLike(Arc<dyn StringLike>),
    /// Array of values
    Array(Vec<Value>),
    /// Map with string keys
    Map(BTreeMap<String, Value>),
    /// Record with named fields
    Record(Payload),
}

impl Value {
    /// Build a symbol value.
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    /// Wrap a string-like value.
    pub fn string_like(value: impl StringLike + 'static) -> Self {
        Value::StringLike(Arc::new(value))
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Timestamp(_) => "timestamp",
            Value::StringLike(_) => "string-like",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    /// Integer content of `Int`/`Long`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Numeric content widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(l) => Some(*l as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// String content of `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a serde_json::Value.
    ///
    /// Bytes become base64 strings, timestamps RFC 3339 strings and loose
    /// string forms their string content.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Long(l) => Json::Number((*l).into()),
            Value::Float(f) => Number::from_f64(*f as f64)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Double(d) => Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null),
            Value::Bytes(b) => {
                Json::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::String(s) | Value::Symbol(s) => Json::String(s.clone()),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
            Value::StringLike(s) => Json::String(s.to_avro_string()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) | Value::Record(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Convert from a serde_json::Value.
    ///
    /// Integers become `Long`, other numbers `Double`, objects `Record`.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            Json::Object(obj) => Value::Record(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;

        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) | (Record(a), Record(b)) => a == b,
            // string-likes compare by the string they produce
            (String(_) | StringLike(_), String(_) | StringLike(_)) => {
                string_content(self) == string_content(other)
            }
            _ => false,
        }
    }
}

fn string_content(value: &Value) -> Option<std::borrow::Cow<'_, str>> {
    match value {
        Value::String(s) => Some(std::borrow::Cow::Borrowed(s)),
        Value::StringLike(s) => Some(std::borrow::Cow::Owned(s.to_avro_string())),
        _ => None,
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Payload> for Value {
    fn from(payload: Payload) -> Self {
        Value::Record(payload)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Build a [`Payload`] from `key => value` pairs.
///
/// ```
/// use avrokey::{payload, Value};
///
/// let p = payload! { "id" => 1i64, "name" => "widget" };
/// assert_eq!(p["name"], Value::from("widget"));
/// ```
#[macro_export]
macro_rules! payload {
    () => { $crate::Payload::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut p = $crate::Payload::new();
        $( p.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        p
    }};
}
