//! End-to-end tests for the schema backend: key synthesis, encoding,
//! decoding and validation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use avrokey::schema::AvroSchema;
use avrokey::{
    payload, BackendConfig, BackendError, BackendKind, LocalSchemaStore, Payload, SchemaBackend,
    SchemaStore, StoreError, ValidationReason, Value,
};
use serde_json::{json, Value as Json};

/// Store wrapper counting insertions.
#[derive(Default)]
struct CountingStore {
    inner: LocalSchemaStore,
    inserts: AtomicUsize,
}

impl SchemaStore for CountingStore {
    fn find(&self, name: &str, namespace: &str) -> Result<Arc<AvroSchema>, StoreError> {
        self.inner.find(name, namespace)
    }

    fn add_schema(&self, literal: &Json) -> Result<Arc<AvroSchema>, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.add_schema(literal)
    }
}

fn my_schema() -> Json {
    json!({
        "type": "record",
        "name": "MySchema",
        "namespace": "com.my-namespace",
        "fields": [
            {"name": "test_id", "type": "string"},
            {"name": "some_int", "type": "int"},
            {"name": "updated_at", "type": ["null", "long"], "default": null},
            {"name": "address", "type": {"type": "record", "name": "Address", "fields": [
                {"name": "city", "type": "string"},
                {"name": "zip", "type": ["null", "string"], "default": null}
            ]}}
        ]
    })
}

fn counting_backend() -> (SchemaBackend, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::default());
    store.inner.add_schema(&my_schema()).unwrap();
    let backend = SchemaBackend::new("MySchema", "com.my-namespace", store.clone());
    (backend, store)
}

fn address(city: &str) -> Value {
    Value::Record(payload! { "city" => city })
}

// ============================================================================
// Key Schemas
// ============================================================================

#[test]
fn test_key_schema_literal() {
    let (backend, _) = counting_backend();
    let key = backend.key_schema("test_id").unwrap();

    assert_eq!(
        key.literal,
        json!({
            "type": "record",
            "name": "MySchema_key",
            "namespace": "com.my-namespace",
            "doc": "Key for com.my-namespace.MySchema",
            "fields": [{"name": "test_id", "type": "string"}]
        })
    );
    let stored = backend
        .schema_store()
        .find("MySchema_key", "com.my-namespace")
        .unwrap();
    assert_eq!(stored.to_json_value(), key.literal);
}

#[test]
fn test_key_schema_inserted_once() {
    let (backend, store) = counting_backend();
    backend.encode_key("test_id", "a", None).unwrap();
    backend.encode_key("test_id", "b", Some("my-topic")).unwrap();
    backend.decode_key(&[0x02, b'c'], "test_id").unwrap();
    assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_key_schema_inserted_once_concurrently() {
    let (backend, store) = counting_backend();
    let backend = Arc::new(backend);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || backend.encode_key("test_id", format!("id-{}", i), None))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_value_suffix_is_stripped() {
    let store = Arc::new(LocalSchemaStore::new());
    store
        .add_schema(&json!({
            "type": "record", "name": "orders-value", "namespace": "shop",
            "fields": [{"name": "order_id", "type": "long"}]
        }))
        .unwrap();
    let backend = SchemaBackend::new("orders-value", "shop", store.clone());

    let key = backend.key_schema("order_id").unwrap();
    assert_eq!(key.name(), "orders_key");
    assert!(store.contains("shop.orders_key"));
}

#[test]
fn test_missing_key_field() {
    let (backend, store) = counting_backend();
    let err = backend.encode_key("nope", "x", None).unwrap_err();
    assert!(matches!(
        err,
        BackendError::KeyFieldNotFound { ref schema, ref field }
            if schema == "com.my-namespace.MySchema" && field == "nope"
    ));
    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_value_schema() {
    let backend = SchemaBackend::new("Ghost", "com.example", Arc::new(LocalSchemaStore::new()));
    let err = backend.encode_key("id", 1i64, None).unwrap_err();
    assert_eq!(err.to_string(), "Schema com.example.Ghost not found");
}

#[test]
fn test_missing_dependency_is_not_reported_as_missing_schema() {
    let dir = tempfile::tempdir().unwrap();
    let user = json!({
        "type": "record", "name": "User",
        "fields": [{"name": "home", "type": "Address"}]
    });
    std::fs::write(dir.path().join("User.avsc"), user.to_string()).unwrap();

    let store = Arc::new(LocalSchemaStore::new().with_path(dir.path()));
    let backend = SchemaBackend::new("User", "", store);
    let err = backend.resolve(None).unwrap_err();
    assert!(matches!(err, BackendError::Store(StoreError::NotFound(ref n)) if n == "Address"));

    let missing = SchemaBackend::new("Ghost", "", Arc::new(LocalSchemaStore::new().with_path(dir.path())));
    assert_eq!(missing.resolve(None).unwrap_err().to_string(), "Schema Ghost not found");
}

#[test]
fn test_schema_without_fields() {
    let store = Arc::new(LocalSchemaStore::new());
    store
        .add_schema(&json!({"type": "record", "name": "Empty", "fields": []}))
        .unwrap();
    let backend = SchemaBackend::new("Empty", "", store);
    assert!(matches!(
        backend.key_schema("id"),
        Err(BackendError::SchemaHasNoFields(ref s)) if s == "Empty"
    ));
}

// ============================================================================
// Key Encoding
// ============================================================================

#[test]
fn test_encode_key_round_trip() {
    let (backend, _) = counting_backend();
    let bytes = backend.encode_key("test_id", "123", Some("my-topic")).unwrap();
    assert_eq!(backend.decode_key(&bytes, "test_id").unwrap(), Value::from("123"));
}

#[test]
fn test_encode_key_coerces_value() {
    let (backend, _) = counting_backend();
    let bytes = backend.encode_key("test_id", 1i64, None).unwrap();
    assert_eq!(backend.decode_key(&bytes, "test_id").unwrap(), Value::from("1"));
}

#[test]
fn test_integer_key() {
    let (backend, _) = counting_backend();
    let bytes = backend.encode_key("some_int", "42", None).unwrap();
    assert_eq!(&bytes[..], &[0x54]);
    assert_eq!(backend.decode_key(&bytes, "some_int").unwrap(), Value::Int(42));
}

// ============================================================================
// Value Encoding
// ============================================================================

#[test]
fn test_encode_decode_value() {
    let (backend, _) = counting_backend();
    let input = payload! {
        "test_id" => Value::symbol("abc"),
        "some_int" => "3",
        "address" => address("Paris"),
    };

    let bytes = backend.encode(&input, None, Some("my-topic")).unwrap();
    let decoded = backend.decode(&bytes, None).unwrap();
    assert_eq!(
        decoded,
        payload! {
            "test_id" => "abc",
            "some_int" => 3i32,
            "updated_at" => Value::Null,
            "address" => Value::Record(payload! { "city" => "Paris", "zip" => Value::Null }),
        }
    );
}

#[test]
fn test_encode_rejects_extra_fields() {
    let (backend, _) = counting_backend();
    let input = payload! {
        "test_id" => "abc",
        "some_int" => 3i32,
        "address" => address("Paris"),
        "surprise" => true,
    };
    let err = backend.encode(&input, None, None).unwrap_err();
    match err {
        BackendError::Validation(v) => {
            assert_eq!(v.path, "surprise");
            assert_eq!(v.reason, ValidationReason::ExtraField);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_encode_reports_coercion_failure() {
    let (backend, _) = counting_backend();
    let input = payload! { "test_id" => "abc", "some_int" => "three", "address" => address("Paris") };
    assert!(matches!(
        backend.encode(&input, None, None),
        Err(BackendError::Coercion { ref field, .. }) if field == "some_int"
    ));
}

#[test]
fn test_decode_with_unknown_schema() {
    let (backend, _) = counting_backend();
    assert!(matches!(
        backend.decode(&[0x00], Some("Nope")),
        Err(BackendError::SchemaNotFound { ref name, .. }) if name == "Nope"
    ));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validate_accepts_subset_of_optional_fields() {
    let (backend, _) = counting_backend();
    let p = payload! { "test_id" => "a", "some_int" => 1i32, "address" => address("Paris") };
    assert!(backend.validate(&p, "MySchema").is_ok());
}

#[test]
fn test_validate_rejects_nested_extra_field() {
    let (backend, _) = counting_backend();
    let p = payload! {
        "test_id" => "a",
        "some_int" => 1i32,
        "address" => Value::Record(payload! { "city" => "Paris", "street" => "Main" }),
    };
    let err = backend.validate(&p, "MySchema").unwrap_err();
    assert!(err.to_string().contains("address.street"));
}

#[test]
fn test_validate_does_not_coerce() {
    let (backend, _) = counting_backend();
    let p = payload! { "test_id" => Value::symbol("a"), "some_int" => 1i32, "address" => address("Paris") };
    assert!(backend.validate(&p, "MySchema").is_err());
}

// ============================================================================
// Schema Access and Configuration
// ============================================================================

#[test]
fn test_schema_fields() {
    let (backend, _) = counting_backend();
    let names: Vec<String> = backend
        .schema_fields()
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["test_id", "some_int", "updated_at", "address"]);
    assert_eq!(backend.schema(), "MySchema");
    assert_eq!(backend.namespace(), "com.my-namespace");
}

#[test]
fn test_set_schema_resynthesizes_key() {
    let (mut backend, store) = counting_backend();
    store
        .inner
        .add_schema(&json!({
            "type": "record", "name": "Other", "namespace": "com.my-namespace",
            "fields": [{"name": "other_id", "type": "long"}]
        }))
        .unwrap();

    backend.key_schema("test_id").unwrap();
    backend.set_schema("Other");
    let key = backend.key_schema("other_id").unwrap();
    assert_eq!(key.name(), "Other_key");
    assert_eq!(store.inserts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_mock_backend_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let ns_dir = dir.path().join("com").join("my-namespace");
    std::fs::create_dir_all(&ns_dir).unwrap();
    std::fs::write(ns_dir.join("MySchema.avsc"), my_schema().to_string()).unwrap();

    let mut opts = HashMap::new();
    opts.insert("schema_path".to_string(), dir.path().display().to_string());
    opts.insert("backend".to_string(), BackendKind::mock().name().to_string());
    let config = BackendConfig::from_dict(&opts).unwrap();

    let backend = SchemaBackend::from_config(&config, "MySchema", "com.my-namespace");
    let input = payload! { "test_id" => "a", "some_int" => "1", "address" => address("Paris") };
    let bytes = backend.encode(&input, None, None).unwrap();

    let json: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json, json!({"test_id": "a", "some_int": 1, "address": {"city": "Paris"}}));

    let decoded: Payload = backend.decode(&bytes, None).unwrap();
    assert_eq!(decoded["some_int"], Value::Long(1));

    let key = backend.encode_key("test_id", "k", None).unwrap();
    assert_eq!(backend.decode_key(&key, "test_id").unwrap(), Value::from("k"));
}
