//! Typed message instances
//!
//! A [`Message`] is the live, schema-shaped form of one generated type. Its
//! fields are pre-populated with schema defaults, so a field is always
//! present for every tracked name. Absent nested messages and inactive
//! oneof members hold [`FieldValue::Unset`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tether_ir::{Value, ValueMap};
use tether_schema::{FieldSchema, FieldType, MessageSchema};

/// Insertion-ordered entries of a map field
pub type FieldMap = IndexMap<String, FieldValue>;

/// The value of one field of a typed instance
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent message or inactive oneof member
    Unset,
    String(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Enumerant number
    Enum(i64),
    Message(Box<Message>),
    List(Vec<FieldValue>),
    Map(FieldMap),
    /// Untracked structural copy of the boundary value
    Dynamic(Value),
}

impl FieldValue {
    /// Schema default for a field
    pub fn default_for(field: &FieldSchema) -> Self {
        if field.is_oneof() {
            return Self::Unset;
        }
        Self::default_for_kind(field.field_type)
    }

    /// Zero value of a field kind
    pub fn default_for_kind(kind: FieldType) -> Self {
        match kind {
            FieldType::String => Self::String(String::new()),
            FieldType::Number => Self::Number(0.0),
            FieldType::Integer => Self::Integer(0),
            FieldType::Boolean => Self::Bool(false),
            FieldType::Bytes => Self::Bytes(Vec::new()),
            FieldType::Enum => Self::Enum(0),
            FieldType::Message => Self::Unset,
            FieldType::Repeated => Self::List(Vec::new()),
            FieldType::Map => Self::Map(FieldMap::new()),
        }
    }

    /// Check if unset
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) | Self::Enum(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<FieldValue>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<FieldValue>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut FieldMap> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Integer(_) => "integer",
            Self::Bool(_) => "boolean",
            Self::Bytes(_) => "bytes",
            Self::Enum(_) => "enum",
            Self::Message(_) => "message",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Dynamic(v) => v.kind_name(),
        }
    }

    /// Re-serialize to the boundary form
    pub fn to_value(&self) -> Value {
        match self {
            Self::Unset => Value::Null,
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Float(*n),
            Self::Integer(i) | Self::Enum(i) => Value::Int(*i),
            Self::Bool(b) => Value::Bool(*b),
            Self::Bytes(b) => Value::String(BASE64.encode(b)),
            Self::Message(m) => m.to_value(),
            Self::List(items) => Value::Array(items.iter().map(FieldValue::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Self::Dynamic(v) => v.clone(),
        }
    }
}

impl From<Message> for FieldValue {
    fn from(m: Message) -> Self {
        Self::Message(Box::new(m))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A typed instance of one message type
#[derive(Clone)]
pub struct Message {
    type_name: String,
    schema: Option<Arc<MessageSchema>>,
    fields: IndexMap<String, FieldValue>,
    unknown_fields: ValueMap,
}

impl Message {
    /// Create an instance with every field at its schema default
    pub fn from_schema(schema: Arc<MessageSchema>) -> Self {
        let fields = schema
            .fields
            .iter()
            .map(|f| (f.name.clone(), FieldValue::default_for(f)))
            .collect();
        Self {
            type_name: schema.full_name.clone(),
            schema: Some(schema),
            fields,
            unknown_fields: ValueMap::new(),
        }
    }

    /// Create an untracked instance with no schema; fields are copied structurally
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            schema: None,
            fields: IndexMap::new(),
            unknown_fields: ValueMap::new(),
        }
    }

    /// Fully-qualified type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Schema, when the type is tracked
    pub fn schema(&self) -> Option<&Arc<MessageSchema>> {
        self.schema.as_ref()
    }

    /// Schema of one field
    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.schema.as_ref()?.field(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.fields.get_mut(name)
    }

    /// Iterate fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set a field, clearing its oneof siblings when the new value is set.
    ///
    /// Field names are not checked against the schema.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Option<FieldValue> {
        let value = value.into();
        if !value.is_unset() {
            self.clear_oneof_siblings(name);
        }
        self.fields.insert(name.to_string(), value)
    }

    /// Set a field without oneof bookkeeping
    pub fn set_raw(&mut self, name: &str, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.to_string(), value)
    }

    /// Reset a field to its schema default, or drop it when untracked
    pub fn clear_field(&mut self, name: &str) -> bool {
        match self.field_schema(name).map(FieldValue::default_for) {
            Some(default) => {
                self.fields.insert(name.to_string(), default);
                true
            }
            None => self.fields.shift_remove(name).is_some(),
        }
    }

    /// Move a field's value out, leaving the schema default behind
    pub fn take(&mut self, name: &str) -> Option<FieldValue> {
        match self.field_schema(name).map(FieldValue::default_for) {
            Some(default) => self.fields.insert(name.to_string(), default),
            None => self.fields.shift_remove(name),
        }
    }

    /// Unset every other member of `name`'s oneof group
    pub fn clear_oneof_siblings(&mut self, name: &str) {
        let Some(schema) = self.schema.clone() else {
            return;
        };
        let Some(group) = schema.field(name).and_then(|f| f.oneof_group.as_deref()) else {
            return;
        };
        for sibling in schema.oneof_fields(group) {
            if sibling.name != name {
                self.fields.insert(sibling.name.clone(), FieldValue::Unset);
            }
        }
    }

    /// Name of the active member of a oneof group
    pub fn which_oneof(&self, group: &str) -> Option<&str> {
        let schema = self.schema.as_ref()?;
        schema
            .oneof_fields(group)
            .into_iter()
            .find(|f| self.fields.get(&f.name).map_or(false, |v| !v.is_unset()))
            .map(|f| f.name.as_str())
    }

    /// Data that matched no tracked field
    pub fn unknown_fields(&self) -> &ValueMap {
        &self.unknown_fields
    }

    pub fn unknown_fields_mut(&mut self) -> &mut ValueMap {
        &mut self.unknown_fields
    }

    /// Re-serialize to the boundary form.
    ///
    /// Unset fields are omitted and unknown fields are emitted after the
    /// tracked ones.
    pub fn to_value(&self) -> Value {
        let mut out = ValueMap::with_capacity(self.fields.len() + self.unknown_fields.len());
        for (name, value) in &self.fields {
            if !value.is_unset() {
                out.insert(name.clone(), value.to_value());
            }
        }
        for (name, value) in &self.unknown_fields {
            out.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(out)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.fields == other.fields
            && self.unknown_fields == other.unknown_fields
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Message");
        s.field("type_name", &self.type_name)
            .field("fields", &self.fields);
        if !self.unknown_fields.is_empty() {
            s.field("unknown_fields", &self.unknown_fields);
        }
        s.finish()
    }
}
