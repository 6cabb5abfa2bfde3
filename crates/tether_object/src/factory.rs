//! Factory methods - per-package instance construction
//!
//! Every generated package exposes a [`FactoryInterface`]: given a
//! fully-qualified type name it hands back the [`FactoryMethod`] that
//! allocates an instance of that type. Factories never write into their
//! parent; the deserializer owns every write-back.

use crate::message::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tether_ir::Value;
use tether_schema::SchemaRegistry;

/// Position of an instance inside its parent collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    /// Sequence index
    Index(usize),
    /// Mapping key
    Key(String),
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{}]", i),
            Self::Key(k) => write!(f, "['{}']", k),
        }
    }
}

/// Arguments of one factory invocation
#[derive(Debug, Clone, Copy)]
pub struct FactoryCall<'a> {
    /// Type being constructed
    pub type_name: &'a str,
    /// Type of the owning instance; `None` at the root
    pub parent: Option<&'a str>,
    /// Field of the parent being built
    pub attribute_name: Option<&'a str>,
    /// Index or key when building a collection element
    pub attribute_key: Option<&'a AttributeKey>,
    /// Raw data the instance will be populated from
    pub raw_data: &'a Value,
}

impl<'a> FactoryCall<'a> {
    /// Call for a root instance
    pub fn root(type_name: &'a str, raw_data: &'a Value) -> Self {
        Self {
            type_name,
            parent: None,
            attribute_name: None,
            attribute_key: None,
            raw_data,
        }
    }
}

/// An instance produced by a factory
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryResult<T> {
    pub instance: T,
    /// `true` when the factory populated the instance itself
    pub fully_loaded: bool,
}

impl<T> FactoryResult<T> {
    /// A default instance the engine still has to populate
    pub fn placeholder(instance: T) -> Self {
        Self {
            instance,
            fully_loaded: false,
        }
    }

    /// A ready instance the engine leaves untouched
    pub fn loaded(instance: T) -> Self {
        Self {
            instance,
            fully_loaded: true,
        }
    }
}

/// Shareable constructor for one message type
pub type FactoryMethod = Arc<dyn Fn(&FactoryCall<'_>) -> FactoryResult<Message> + Send + Sync>;

/// Per-package factory lookup
pub trait FactoryInterface: Send + Sync {
    /// Get the constructor for a type, if this package provides it
    fn get_factory_method(&self, type_name: &str) -> Option<FactoryMethod>;
}

/// Stock factory building schema-default instances, with per-type overrides
pub struct PackageFactory {
    schemas: Arc<SchemaRegistry>,
    overrides: HashMap<String, FactoryMethod>,
}

impl PackageFactory {
    /// Create a factory for a package's schemas
    pub fn new(schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            schemas,
            overrides: HashMap::new(),
        }
    }

    /// Replace the constructor of one type (builder pattern)
    pub fn with_method<F>(mut self, type_name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&FactoryCall<'_>) -> FactoryResult<Message> + Send + Sync + 'static,
    {
        self.overrides.insert(type_name.into(), Arc::new(method));
        self
    }

    /// The schemas this factory builds from
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }
}

impl FactoryInterface for PackageFactory {
    fn get_factory_method(&self, type_name: &str) -> Option<FactoryMethod> {
        if let Some(method) = self.overrides.get(type_name) {
            return Some(method.clone());
        }
        let schema = self.schemas.get_schema_shared(type_name)?;
        Some(Arc::new(move |_: &FactoryCall<'_>| {
            FactoryResult::placeholder(Message::from_schema(schema.clone()))
        }))
    }
}

impl fmt::Debug for PackageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageFactory")
            .field("package", &self.schemas.package())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}
