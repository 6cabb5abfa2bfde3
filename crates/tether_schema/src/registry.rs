//! Schema registry - per-package type lookups
//!
//! A registry is built once per generated package, either in code with
//! [`SchemaRegistry::register`] or from the generator's JSON output with
//! [`SchemaRegistry::from_json`]. All lookups are pure reads; an absent
//! result means "not tracked" and is never an error.

use crate::error::{Result, SchemaError};
use crate::schema::{FieldSchema, MessageSchema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Declaring package of a fully-qualified type name.
///
/// `"library.common.Metadata"` is declared in `"library.common"`. A name
/// without a dot has no package and yields `""`.
pub fn package_of(type_name: &str) -> &str {
    type_name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

/// On-disk shape emitted by the code generator
#[derive(Serialize, Deserialize)]
struct RegistryDocument {
    package: String,
    #[serde(default)]
    messages: IndexMap<String, MessageSchema>,
}

/// Message schemas of one package, keyed by fully-qualified type name
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    package: String,
    messages: IndexMap<String, Arc<MessageSchema>>,
}

impl SchemaRegistry {
    /// Create an empty registry for a package
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            messages: IndexMap::new(),
        }
    }

    /// Load a registry from the generator's JSON output
    pub fn from_json(json: &str) -> Result<Self> {
        let document: RegistryDocument = serde_json::from_str(json)?;
        let mut registry = Self::new(document.package);

        for (key, mut schema) in document.messages {
            if schema.full_name.is_empty() {
                schema.full_name = key.clone();
            }
            if schema.full_name != key {
                return Err(SchemaError::KeyMismatch {
                    key,
                    full_name: schema.full_name,
                });
            }
            if schema.name.is_empty() {
                schema.name = MessageSchema::new(key.as_str()).name;
            }
            registry.register(schema)?;
        }

        log::debug!(
            "Loaded schema registry for package '{}' ({} messages)",
            registry.package,
            registry.len()
        );
        Ok(registry)
    }

    /// Serialize this registry in the generator's JSON shape
    pub fn to_json(&self) -> Result<String> {
        let document = RegistryDocument {
            package: self.package.clone(),
            messages: self
                .messages
                .iter()
                .map(|(name, schema)| (name.clone(), MessageSchema::clone(schema)))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Register a message schema
    pub fn register(&mut self, schema: MessageSchema) -> Result<&mut Self> {
        if !self.declares(&schema.full_name) {
            return Err(SchemaError::ForeignType {
                type_name: schema.full_name,
                package: self.package.clone(),
            });
        }
        if self.messages.contains_key(&schema.full_name) {
            return Err(SchemaError::DuplicateType(schema.full_name));
        }
        schema.validate()?;

        self.messages.insert(schema.full_name.clone(), Arc::new(schema));
        Ok(self)
    }

    /// Register a message schema (builder pattern)
    pub fn with_message(mut self, schema: MessageSchema) -> Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    /// The package this registry belongs to
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Get the schema of a type
    pub fn get_schema(&self, type_name: &str) -> Option<&MessageSchema> {
        self.messages.get(type_name).map(|s| s.as_ref())
    }

    /// Get a shared handle to the schema of a type
    pub fn get_schema_shared(&self, type_name: &str) -> Option<Arc<MessageSchema>> {
        self.messages.get(type_name).cloned()
    }

    /// Get a field of a type by name
    pub fn get_field_schema(&self, type_name: &str, field_name: &str) -> Option<&FieldSchema> {
        self.get_schema(type_name)?.field(field_name)
    }

    /// Get a field of a type by wire id
    pub fn get_field_schema_by_id(&self, type_name: &str, field_id: u32) -> Option<&FieldSchema> {
        self.get_schema(type_name)?.field_by_id(field_id)
    }

    /// Check if a field participates in a oneof group
    pub fn is_oneof_field(&self, type_name: &str, field_name: &str) -> bool {
        self.get_field_schema(type_name, field_name)
            .map(FieldSchema::is_oneof)
            .unwrap_or(false)
    }

    /// All fields of a oneof group (empty if the type or group is unknown)
    pub fn get_oneof_fields(&self, type_name: &str, oneof_group: &str) -> Vec<&FieldSchema> {
        self.get_schema(type_name)
            .map(|s| s.oneof_fields(oneof_group))
            .unwrap_or_default()
    }

    /// Check if this registry holds a schema for the type
    pub fn owns(&self, type_name: &str) -> bool {
        self.messages.contains_key(type_name)
    }

    /// Iterate over registered type names in registration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    /// Iterate over registered schemas in registration order
    pub fn iter(&self) -> impl Iterator<Item = &MessageSchema> {
        self.messages.values().map(|s| s.as_ref())
    }

    /// Every message type named by a field of this package, with the
    /// type that references it
    pub fn referenced_types(&self) -> BTreeSet<(String, String)> {
        self.iter()
            .flat_map(|schema| {
                schema.fields.iter().filter_map(move |field| {
                    field
                        .message_type
                        .as_ref()
                        .map(|target| (target.clone(), schema.full_name.clone()))
                })
            })
            .collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn declares(&self, type_name: &str) -> bool {
        if self.package.is_empty() {
            return true;
        }
        type_name
            .strip_prefix(self.package.as_str())
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("package", &self.package)
            .field("messages", &self.messages.len())
            .finish()
    }
}
