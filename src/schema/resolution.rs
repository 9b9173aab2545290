//! Schema resolution for named type references.
//!
//! Schemas coming out of the parser may refer to records and enums by name.
//! Before a schema is handed to the coercer, validator or codec, those
//! references are inlined. Recursive references cannot be inlined and stay
//! `Named`; walkers look them up through a [`SchemaResolutionContext`].

use std::collections::{HashMap, HashSet};

use crate::error::SchemaError;
use crate::schema::{AvroSchema, FieldSchema, LogicalType, RecordSchema};

/// A context for resolving named type references.
#[derive(Debug, Clone, Default)]
pub struct SchemaResolutionContext {
    /// Registry of named types by their fully qualified name
    named_types: HashMap<String, AvroSchema>,
}

impl SchemaResolutionContext {
    /// Create a new empty resolution context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named type in the context.
    pub fn register(&mut self, name: String, schema: AvroSchema) {
        self.named_types.insert(name, schema);
    }

    /// Get a named type from the context.
    pub fn get(&self, name: &str) -> Option<&AvroSchema> {
        self.named_types.get(name)
    }

    /// Check if a named type exists in the context.
    pub fn contains(&self, name: &str) -> bool {
        self.named_types.contains_key(name)
    }

    /// Build a resolution context by extracting all named types from a schema.
    pub fn build_from_schema(schema: &AvroSchema) -> Self {
        let mut context = Self::new();
        context.extract_named_types(schema);
        context
    }

    /// Register every named type defined inside `schema`.
    pub fn extract_named_types(&mut self, schema: &AvroSchema) {
        match schema {
            AvroSchema::Record(record) => {
                self.named_types.insert(record.fullname(), schema.clone());
                for field in &record.fields {
                    self.extract_named_types(&field.schema);
                }
            }
            AvroSchema::Enum(enum_schema) => {
                self.named_types
                    .insert(enum_schema.fullname(), schema.clone());
            }
            AvroSchema::Array(inner) | AvroSchema::Map(inner) => {
                self.extract_named_types(inner);
            }
            AvroSchema::Union(variants) => {
                for variant in variants {
                    self.extract_named_types(variant);
                }
            }
            AvroSchema::Logical(logical) => {
                self.extract_named_types(&logical.base);
            }
            _ => {}
        }
    }

    /// Follow `Named` references until a concrete schema is reached.
    pub fn deref<'a>(&'a self, schema: &'a AvroSchema) -> Option<&'a AvroSchema> {
        let mut current = schema;
        let mut hops = 0;
        while let AvroSchema::Named(name) = current {
            current = self.named_types.get(name)?;
            hops += 1;
            if hops > self.named_types.len() {
                return None;
            }
        }
        Some(current)
    }

    /// Resolve all Named references in a schema.
    ///
    /// Self-references of recursive types are kept as `Named`.
    pub fn resolve(&self, schema: &AvroSchema) -> Result<AvroSchema, SchemaError> {
        self.resolve_with_path(schema, &mut Vec::new())
    }

    fn resolve_with_path(
        &self,
        schema: &AvroSchema,
        path: &mut Vec<String>,
    ) -> Result<AvroSchema, SchemaError> {
        match schema {
            AvroSchema::Named(name) => {
                if path.contains(name) {
                    return Ok(schema.clone());
                }

                match self.named_types.get(name) {
                    Some(resolved) => {
                        path.push(name.clone());
                        let result = self.resolve_with_path(resolved, path);
                        path.pop();
                        result
                    }
                    None => Err(SchemaError::InvalidSchema(format!(
                        "Unresolved named type reference: '{}'",
                        name
                    ))),
                }
            }
            AvroSchema::Record(record) => {
                path.push(record.fullname());

                let fields = record
                    .fields
                    .iter()
                    .map(|field| {
                        Ok(FieldSchema {
                            schema: self.resolve_with_path(&field.schema, path)?,
                            ..field.clone()
                        })
                    })
                    .collect::<Result<Vec<_>, SchemaError>>();

                path.pop();

                Ok(AvroSchema::Record(RecordSchema {
                    fields: fields?,
                    ..record.clone()
                }))
            }
            AvroSchema::Array(items) => Ok(AvroSchema::Array(Box::new(
                self.resolve_with_path(items, path)?,
            ))),
            AvroSchema::Map(values) => Ok(AvroSchema::Map(Box::new(
                self.resolve_with_path(values, path)?,
            ))),
            AvroSchema::Union(variants) => Ok(AvroSchema::Union(
                variants
                    .iter()
                    .map(|v| self.resolve_with_path(v, path))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            AvroSchema::Logical(logical) => Ok(AvroSchema::Logical(LogicalType::new(
                self.resolve_with_path(&logical.base, path)?,
                logical.logical_type.clone(),
            ))),
            _ => Ok(schema.clone()),
        }
    }
}

/// Full names of every `Named` reference in `schema` that `schema` itself
/// does not define.
pub fn external_references(schema: &AvroSchema) -> Vec<String> {
    let defined = SchemaResolutionContext::build_from_schema(schema);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect_references(schema, &defined, &mut seen, &mut out);
    out
}

fn collect_references(
    schema: &AvroSchema,
    defined: &SchemaResolutionContext,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    match schema {
        AvroSchema::Named(name) => {
            if !defined.contains(name) && seen.insert(name.clone()) {
                out.push(name.clone());
            }
        }
        AvroSchema::Record(record) => {
            for field in &record.fields {
                collect_references(&field.schema, defined, seen, out);
            }
        }
        AvroSchema::Array(inner) | AvroSchema::Map(inner) => {
            collect_references(inner, defined, seen, out)
        }
        AvroSchema::Union(variants) => {
            for variant in variants {
                collect_references(variant, defined, seen, out);
            }
        }
        AvroSchema::Logical(logical) => collect_references(&logical.base, defined, seen, out),
        _ => {}
    }
}

/// Resolve all Named references in a schema using the types it defines itself.
pub fn resolve_schema(schema: &AvroSchema) -> Result<AvroSchema, SchemaError> {
    let context = SchemaResolutionContext::build_from_schema(schema);
    context.resolve(schema)
}
