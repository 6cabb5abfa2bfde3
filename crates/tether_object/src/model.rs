//! Object model - the wired set of packages
//!
//! Packages are wired once at startup. Type resolution tries the package
//! that declares a type (its name up to the last `.`) first, then the
//! enclosing packages, and scans every package only when
//! [`ObjectConfig::fallback_scan`] is enabled.

use crate::deserialize::Deserializer;
use crate::error::WiringError;
use crate::factory::{FactoryInterface, FactoryMethod, PackageFactory};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tether_schema::{package_of, MessageSchema, SchemaRegistry};

/// Object model configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    /// Keep unrecognized raw fields in `Message::unknown_fields`
    pub preserve_unknown_fields: bool,
    /// Scan every package when the declaring package does not provide a type
    pub fallback_scan: bool,
    /// Reject wiring that leaves a referenced type unresolvable
    pub strict_wiring: bool,
    /// Maximum message nesting depth
    pub max_depth: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            preserve_unknown_fields: true,
            fallback_scan: false,
            strict_wiring: true,
            max_depth: 64,
        }
    }
}

/// One generated package: its schemas and its factory
#[derive(Clone)]
pub struct Package {
    name: String,
    schemas: Arc<SchemaRegistry>,
    factory: Arc<dyn FactoryInterface>,
}

impl Package {
    /// Wire a package with its own factory
    pub fn new(schemas: SchemaRegistry, factory: impl FactoryInterface + 'static) -> Self {
        Self::from_shared(Arc::new(schemas), Arc::new(factory))
    }

    /// Wire a package with the stock schema-default factory
    pub fn with_default_factory(schemas: SchemaRegistry) -> Self {
        let schemas = Arc::new(schemas);
        let factory = PackageFactory::new(schemas.clone());
        Self::from_shared(schemas, Arc::new(factory))
    }

    /// Wire a package from shared parts
    pub fn from_shared(schemas: Arc<SchemaRegistry>, factory: Arc<dyn FactoryInterface>) -> Self {
        Self {
            name: schemas.package().to_string(),
            schemas,
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn factory(&self) -> &dyn FactoryInterface {
        self.factory.as_ref()
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("types", &self.schemas.len())
            .finish()
    }
}

/// The wired packages
#[derive(Debug)]
pub struct ObjectModel {
    packages: IndexMap<String, Package>,
    config: ObjectConfig,
}

impl ObjectModel {
    /// Start wiring packages
    pub fn builder() -> ObjectModelBuilder {
        ObjectModelBuilder::default()
    }

    pub fn config(&self) -> &ObjectConfig {
        &self.config
    }

    /// Get a package by name
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Iterate packages in wiring order
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Find the package providing a type and its constructor
    pub fn resolve(&self, type_name: &str) -> Option<(&Package, FactoryMethod)> {
        let mut candidate = package_of(type_name);
        loop {
            if let Some(package) = self.packages.get(candidate) {
                if let Some(method) = package.factory.get_factory_method(type_name) {
                    log::trace!("Resolved '{}' in package '{}'", type_name, package.name);
                    return Some((package, method));
                }
            }
            if candidate.is_empty() {
                break;
            }
            candidate = package_of(candidate);
        }

        if self.config.fallback_scan {
            for package in self.packages.values() {
                if let Some(method) = package.factory.get_factory_method(type_name) {
                    log::debug!(
                        "Resolved '{}' by scanning; package '{}' does not declare it",
                        type_name,
                        package.name
                    );
                    return Some((package, method));
                }
            }
        }

        None
    }

    /// Get the constructor of a type
    pub fn factory_method(&self, type_name: &str) -> Option<FactoryMethod> {
        self.resolve(type_name).map(|(_, method)| method)
    }

    /// Get the schema of a type from the package that provides it
    pub fn schema(&self, type_name: &str) -> Option<Arc<MessageSchema>> {
        let (package, _) = self.resolve(type_name)?;
        package.schemas.get_schema_shared(type_name)
    }

    /// Create a deserializer over this model
    pub fn deserializer(&self) -> Deserializer<'_> {
        Deserializer::new(self)
    }
}

/// Startup wiring for an [`ObjectModel`]
#[derive(Default)]
pub struct ObjectModelBuilder {
    packages: Vec<Package>,
    config: ObjectConfig,
}

impl ObjectModelBuilder {
    /// Add a package
    pub fn package(mut self, package: Package) -> Self {
        self.packages.push(package);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: ObjectConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish wiring, checking that every referenced type resolves
    pub fn build(self) -> Result<ObjectModel, WiringError> {
        let mut packages = IndexMap::with_capacity(self.packages.len());
        for package in self.packages {
            if packages.contains_key(&package.name) {
                return Err(WiringError::DuplicatePackage(package.name));
            }
            packages.insert(package.name.clone(), package);
        }

        let model = ObjectModel {
            packages,
            config: self.config,
        };

        if model.config.strict_wiring {
            for package in model.packages.values() {
                for (type_name, referenced_by) in package.schemas.referenced_types() {
                    if model.resolve(&type_name).is_none() {
                        return Err(WiringError::UnresolvedPackage {
                            type_name,
                            referenced_by,
                        });
                    }
                }
            }
        }

        log::debug!("Wired object model with {} packages", model.packages.len());
        Ok(model)
    }
}
