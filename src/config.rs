//! Backend configuration.
//!
//! Configuration comes either from builder calls or from a flat string
//! dictionary (as read from an application config file or environment).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{BinaryCodec, Codec, JsonCodec};
use crate::error::BackendError;
use crate::store::LocalSchemaStore;

/// Which codec a backend encodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Avro binary datums, schemas from the local store
    #[default]
    AvroLocal,
    /// Validation only: payloads are checked against their schema and
    /// carried as JSON
    AvroValidation,
}

impl BackendKind {
    /// Parse a backend name.
    ///
    /// # Example
    /// ```
    /// use avrokey::config::BackendKind;
    ///
    /// assert_eq!(BackendKind::from_name("avro_local").unwrap(), BackendKind::AvroLocal);
    ///
    /// let err = BackendKind::from_name("avro_registry").unwrap_err();
    /// assert!(err.to_string().contains("avro_registry"));
    /// ```
    pub fn from_name(name: &str) -> Result<Self, BackendError> {
        match name {
            "avro_local" => Ok(BackendKind::AvroLocal),
            "avro_validation" => Ok(BackendKind::AvroValidation),
            unknown => Err(BackendError::Configuration(format!(
                "Unknown backend '{}'. Supported backends: avro_local, avro_validation",
                unknown
            ))),
        }
    }

    /// The name this backend is configured by.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::AvroLocal => "avro_local",
            BackendKind::AvroValidation => "avro_validation",
        }
    }

    /// The backend to use in tests: validates without producing real Avro.
    pub fn mock() -> Self {
        BackendKind::AvroValidation
    }

    /// A codec for this backend.
    pub fn codec(&self) -> Arc<dyn Codec> {
        match self {
            BackendKind::AvroLocal => Arc::new(BinaryCodec),
            BackendKind::AvroValidation => Arc::new(JsonCodec),
        }
    }
}

/// Configuration shared by the backends of an application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendConfig {
    /// Directory holding `.avsc` files, laid out by namespace
    pub schema_path: Option<PathBuf>,
    /// Codec to encode with
    pub backend: BackendKind,
    /// Enforce Avro naming rules when parsing schemas
    pub strict_schema_names: bool,
}

impl BackendConfig {
    /// Create a new BackendConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a BackendConfig from a string dictionary.
    ///
    /// Supported keys:
    /// - `schema_path`: schema directory
    /// - `backend`: `avro_local` (default) or `avro_validation`
    /// - `strict_schema_names`: `true`/`false` (default: false)
    pub fn from_dict(opts: &HashMap<String, String>) -> Result<Self, BackendError> {
        let backend = match opts.get("backend") {
            Some(name) => BackendKind::from_name(name)?,
            None => BackendKind::default(),
        };

        let strict_schema_names = match opts.get("strict_schema_names").map(String::as_str) {
            None => false,
            Some(flag) => flag.parse().map_err(|_| {
                BackendError::Configuration(format!(
                    "strict_schema_names must be true or false, got '{}'",
                    flag
                ))
            })?,
        };

        Ok(Self {
            schema_path: opts.get("schema_path").map(PathBuf::from),
            backend,
            strict_schema_names,
        })
    }

    /// Set the schema directory.
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set whether schema names are checked strictly.
    pub fn with_strict_schema_names(mut self, strict: bool) -> Self {
        self.strict_schema_names = strict;
        self
    }

    /// Build the schema store this configuration describes.
    pub fn build_store(&self) -> LocalSchemaStore {
        let store = LocalSchemaStore::new().with_strict(self.strict_schema_names);
        match &self.schema_path {
            Some(path) => store.with_path(path.clone()),
            None => store,
        }
    }
}
