//! Message and field schemas
//!
//! A schema describes one generated message type: its fields, their wire
//! numbers and kinds, nested message types and oneof membership.

use crate::error::{Result, SchemaError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The kind of value a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Floating point number (f64)
    Number,
    /// 64-bit signed integer
    Integer,
    /// Boolean
    Boolean,
    /// Raw bytes, base64 encoded on the boundary
    Bytes,
    /// Enumerant, stored by number
    Enum,
    /// Nested message
    Message,
    /// Ordered sequence
    Repeated,
    /// String-keyed mapping, insertion ordered
    Map,
}

impl FieldType {
    /// Check if this kind holds a single scalar value
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Message | Self::Repeated | Self::Map)
    }

    /// Check if this kind is a sequence or a mapping
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Repeated | Self::Map)
    }

    /// Human-readable kind name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Bytes => "bytes",
            Self::Enum => "enum",
            Self::Message => "message",
            Self::Repeated => "repeated",
            Self::Map => "map",
        }
    }
}

/// Schema for one field of one message type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field name, unique within the message
    pub name: String,
    /// Wire field number, unique within the message
    pub id: u32,
    /// Field kind
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Element kind of a `Repeated` or `Map` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<FieldType>,
    /// Fully-qualified nested type for message fields and message elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Oneof group this field belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oneof_group: Option<String>,
    /// Enumerant names for `Enum` fields (or enum elements)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub enum_values: IndexMap<String, i64>,
}

impl FieldSchema {
    /// Create a field of the given kind
    pub fn new(name: impl Into<String>, id: u32, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            id,
            field_type,
            element_type: None,
            message_type: None,
            oneof_group: None,
            enum_values: IndexMap::new(),
        }
    }

    /// String field
    pub fn string(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, FieldType::String)
    }

    /// Number (f64) field
    pub fn number(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, FieldType::Number)
    }

    /// Integer (i64) field
    pub fn integer(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, FieldType::Integer)
    }

    /// Boolean field
    pub fn boolean(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, FieldType::Boolean)
    }

    /// Bytes field
    pub fn bytes(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, FieldType::Bytes)
    }

    /// Enum field
    pub fn enumeration(name: impl Into<String>, id: u32) -> Self {
        Self::new(name, id, FieldType::Enum)
    }

    /// Nested message field
    pub fn message(name: impl Into<String>, id: u32, message_type: impl Into<String>) -> Self {
        Self {
            message_type: Some(message_type.into()),
            ..Self::new(name, id, FieldType::Message)
        }
    }

    /// Sequence of scalars
    pub fn repeated(name: impl Into<String>, id: u32, element: FieldType) -> Self {
        Self {
            element_type: Some(element),
            ..Self::new(name, id, FieldType::Repeated)
        }
    }

    /// Sequence of messages
    pub fn repeated_message(
        name: impl Into<String>,
        id: u32,
        message_type: impl Into<String>,
    ) -> Self {
        Self {
            element_type: Some(FieldType::Message),
            message_type: Some(message_type.into()),
            ..Self::new(name, id, FieldType::Repeated)
        }
    }

    /// Mapping of scalars
    pub fn map(name: impl Into<String>, id: u32, element: FieldType) -> Self {
        Self {
            element_type: Some(element),
            ..Self::new(name, id, FieldType::Map)
        }
    }

    /// Mapping of messages
    pub fn map_message(name: impl Into<String>, id: u32, message_type: impl Into<String>) -> Self {
        Self {
            element_type: Some(FieldType::Message),
            message_type: Some(message_type.into()),
            ..Self::new(name, id, FieldType::Map)
        }
    }

    /// Place this field in a oneof group
    pub fn in_oneof(mut self, group: impl Into<String>) -> Self {
        self.oneof_group = Some(group.into());
        self
    }

    /// Add an enumerant name
    pub fn with_enum_value(mut self, name: impl Into<String>, number: i64) -> Self {
        self.enum_values.insert(name.into(), number);
        self
    }

    /// Kind of the elements of a `Repeated` or `Map` field.
    ///
    /// Returns `None` for non-container fields and for containers whose
    /// element kind is untracked (elements are then copied structurally).
    pub fn element_kind(&self) -> Option<FieldType> {
        if !self.field_type.is_container() {
            return None;
        }
        match self.element_type {
            Some(kind) => Some(kind),
            None if self.message_type.is_some() => Some(FieldType::Message),
            None => None,
        }
    }

    /// Check if this field belongs to a oneof group
    pub fn is_oneof(&self) -> bool {
        self.oneof_group.is_some()
    }

    /// Check if this field or its elements are nested messages
    pub fn references_message(&self) -> bool {
        self.field_type == FieldType::Message || self.element_kind() == Some(FieldType::Message)
    }

    fn validate(&self, message: &str) -> Result<()> {
        if self.references_message() && self.message_type.is_none() {
            return Err(SchemaError::MissingMessageType {
                message: message.to_string(),
                field: self.name.clone(),
            });
        }
        if let Some(element) = self.element_kind() {
            if element.is_container() {
                return Err(SchemaError::InvalidElementType {
                    message: message.to_string(),
                    field: self.name.clone(),
                    element: element.name().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Schema for one message type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSchema {
    /// Short type name
    #[serde(default)]
    pub name: String,
    /// Fully-qualified type name
    #[serde(default)]
    pub full_name: String,
    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl MessageSchema {
    /// Create an empty schema for a fully-qualified type name
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = short_name(&full_name).to_string();
        Self {
            name,
            full_name,
            fields: Vec::new(),
        }
    }

    /// Add a field (builder pattern)
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a field by wire id
    pub fn field_by_id(&self, id: u32) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// All fields of a oneof group, in declaration order
    pub fn oneof_fields(&self, group: &str) -> Vec<&FieldSchema> {
        self.fields
            .iter()
            .filter(|f| f.oneof_group.as_deref() == Some(group))
            .collect()
    }

    /// Names of the oneof groups declared on this message
    pub fn oneof_groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for group in self.fields.iter().filter_map(|f| f.oneof_group.as_deref()) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        groups
    }

    /// Check field name/id uniqueness and per-field consistency
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();

        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateFieldName {
                    message: self.full_name.clone(),
                    field: field.name.clone(),
                });
            }
            if !ids.insert(field.id) {
                return Err(SchemaError::DuplicateFieldId {
                    message: self.full_name.clone(),
                    id: field.id,
                });
            }
            field.validate(&self.full_name)?;
        }

        Ok(())
    }
}

fn short_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}
