//! Schema stores.
//!
//! A [`SchemaStore`] maps full schema names to resolved record schemas. The
//! backend looks value schemas up through it and registers synthesized key
//! schemas with it.
//!
//! [`LocalSchemaStore`] keeps an in-memory registry and, when configured
//! with a directory, loads missing schemas from `.avsc` files laid out by
//! namespace:
//!
//! ```text
//! <path>/com/example/User.avsc   -> com.example.User
//! <path>/Plain.avsc              -> Plain
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value as Json;
use tracing::debug;

use crate::error::{SchemaError, StoreError};
use crate::schema::{external_references, AvroSchema, SchemaParser, SchemaResolutionContext};

/// Lookup key for a schema: a name and the namespace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef {
    pub name: String,
    pub namespace: String,
}

impl SchemaRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// `namespace.name`, or `name` alone when the namespace is empty or the
    /// name is already qualified.
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() || self.name.contains('.') {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

/// A registry of resolved schemas.
pub trait SchemaStore: Send + Sync {
    /// Find the schema `name` in `namespace`.
    ///
    /// Returns `StoreError::NotFound` when the store has no such schema.
    fn find(&self, name: &str, namespace: &str) -> Result<Arc<AvroSchema>, StoreError>;

    /// Parse, resolve and register a schema literal, replacing any schema
    /// already registered under the same full name.
    fn add_schema(&self, literal: &Json) -> Result<Arc<AvroSchema>, StoreError>;
}

/// In-memory schema store with an optional directory of schema files.
#[derive(Debug, Default)]
pub struct LocalSchemaStore {
    schemas: RwLock<HashMap<String, Arc<AvroSchema>>>,
    path: Option<PathBuf>,
    strict: bool,
}

impl LocalSchemaStore {
    /// Create an empty store that never touches the filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load schemas missing from the registry from files under `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Enforce Avro naming rules when parsing schemas.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The schema directory, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a schema is registered under `fullname` (files are not consulted).
    pub fn contains(&self, fullname: &str) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(fullname)
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registered(&self, fullname: &str) -> Option<Arc<AvroSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fullname)
            .cloned()
    }

    fn parse(&self, fullname: &str, literal: &Json) -> Result<AvroSchema, StoreError> {
        SchemaParser::new()
            .with_strict(self.strict)
            .parse(literal)
            .map_err(|source| StoreError::Schema {
                name: fullname.to_string(),
                source,
            })
    }

    /// Look `fullname` up, loading it from disk if needed. `loading` holds the
    /// files currently being loaded, to detect reference cycles across files.
    fn lookup(&self, fullname: &str, loading: &mut Vec<String>) -> Result<Arc<AvroSchema>, StoreError> {
        if let Some(schema) = self.registered(fullname) {
            return Ok(schema);
        }

        let dir = self
            .path
            .as_ref()
            .ok_or_else(|| StoreError::NotFound(fullname.to_string()))?;

        if loading.iter().any(|name| name == fullname) {
            return Err(StoreError::Schema {
                name: fullname.to_string(),
                source: SchemaError::InvalidSchema(format!(
                    "Circular reference between schema files: {}",
                    loading.join(" -> ")
                )),
            });
        }

        let file = schema_file(dir, fullname);
        let contents = std::fs::read_to_string(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(fullname.to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        debug!(schema = fullname, file = %file.display(), "Loading schema file");

        let literal: Json = serde_json::from_str(&contents).map_err(|e| StoreError::Schema {
            name: fullname.to_string(),
            source: SchemaError::ParseError(format!("Invalid JSON in {}: {}", file.display(), e)),
        })?;
        let schema = self.parse(fullname, &literal)?;

        let defined = schema.fullname().unwrap_or_default();
        if defined != fullname {
            return Err(StoreError::Schema {
                name: fullname.to_string(),
                source: SchemaError::InvalidSchema(format!(
                    "{} defines '{}', expected '{}'",
                    file.display(),
                    defined,
                    fullname
                )),
            });
        }

        loading.push(fullname.to_string());
        let result = self.register(schema, loading);
        loading.pop();
        result
    }

    /// Resolve references of `schema` against the store and register it.
    fn register(&self, schema: AvroSchema, loading: &mut Vec<String>) -> Result<Arc<AvroSchema>, StoreError> {
        let fullname = schema.fullname().ok_or_else(|| StoreError::Schema {
            name: schema.type_tag().to_string(),
            source: SchemaError::InvalidSchema("Only named schemas can be stored".to_string()),
        })?;

        let mut context = SchemaResolutionContext::build_from_schema(&schema);
        for reference in external_references(&schema) {
            let dependency = self.lookup(&reference, loading)?;
            context.extract_named_types(&dependency);
        }

        let resolved = context.resolve(&schema).map_err(|source| StoreError::Schema {
            name: fullname.clone(),
            source,
        })?;
        let resolved = Arc::new(resolved);

        let replaced = self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fullname.clone(), Arc::clone(&resolved))
            .is_some();
        debug!(schema = %fullname, replaced, "Registered schema");

        Ok(resolved)
    }
}

impl SchemaStore for LocalSchemaStore {
    fn find(&self, name: &str, namespace: &str) -> Result<Arc<AvroSchema>, StoreError> {
        let fullname = SchemaRef::new(name, namespace).fullname();
        self.lookup(&fullname, &mut Vec::new())
    }

    fn add_schema(&self, literal: &Json) -> Result<Arc<AvroSchema>, StoreError> {
        let name = literal
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or("<anonymous>")
            .to_string();
        let schema = self.parse(&name, literal)?;
        self.register(schema, &mut Vec::new())
    }
}

/// `<dir>/<namespace as directories>/<name>.avsc`
fn schema_file(dir: &Path, fullname: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    let mut parts = fullname.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_some() {
            path.push(part);
        } else {
            path.push(format!("{}.avsc", part));
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_ref_fullname() {
        assert_eq!(SchemaRef::new("User", "com.example").fullname(), "com.example.User");
        assert_eq!(SchemaRef::new("User", "").fullname(), "User");
        assert_eq!(SchemaRef::new("a.b.User", "com.example").fullname(), "a.b.User");
    }

    #[test]
    fn test_schema_file_layout() {
        let dir = Path::new("/schemas");
        assert_eq!(
            schema_file(dir, "com.example.User"),
            PathBuf::from("/schemas/com/example/User.avsc")
        );
        assert_eq!(schema_file(dir, "Plain"), PathBuf::from("/schemas/Plain.avsc"));
    }

    #[test]
    fn test_add_then_find() {
        let store = LocalSchemaStore::new();
        store
            .add_schema(&json!({
                "type": "record", "name": "User", "namespace": "com.example",
                "fields": [{"name": "id", "type": "long"}]
            }))
            .unwrap();

        let found = store.find("User", "com.example").unwrap();
        assert_eq!(found.fullname().as_deref(), Some("com.example.User"));
        assert!(matches!(
            store.find("Nope", "com.example"),
            Err(StoreError::NotFound(ref n)) if n == "com.example.Nope"
        ));
    }

    #[test]
    fn test_add_schema_replaces() {
        let store = LocalSchemaStore::new();
        let literal = |field: &str| {
            json!({"type": "record", "name": "K", "fields": [{"name": field, "type": "string"}]})
        };
        store.add_schema(&literal("a")).unwrap();
        store.add_schema(&literal("b")).unwrap();

        assert_eq!(store.len(), 1);
        let found = store.find("K", "").unwrap();
        assert!(found.as_record().unwrap().field("b").is_some());
    }

    #[test]
    fn test_reference_to_registered_schema_is_inlined() {
        let store = LocalSchemaStore::new();
        store
            .add_schema(&json!({
                "type": "record", "name": "Address", "namespace": "com.example",
                "fields": [{"name": "city", "type": "string"}]
            }))
            .unwrap();
        let user = store
            .add_schema(&json!({
                "type": "record", "name": "User", "namespace": "com.example",
                "fields": [{"name": "home", "type": "Address"}]
            }))
            .unwrap();

        let home = &user.as_record().unwrap().fields[0].schema;
        assert!(matches!(home, AvroSchema::Record(r) if r.name == "Address"));
    }

    #[test]
    fn test_unknown_reference_fails() {
        let store = LocalSchemaStore::new();
        let err = store
            .add_schema(&json!({
                "type": "record", "name": "User",
                "fields": [{"name": "home", "type": "Address"}]
            }))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref n) if n == "Address"));
    }
}
