//! # Tether Object - typed instances and factory dispatch
//!
//! Turns untyped boundary [`Value`](tether_ir::Value)s into schema-correct
//! [`Message`] instances, even when a nested field's type is declared in a
//! package generated independently of its parent.
//!
//! ## Architecture
//!
//! ```text
//! raw Value ──► Deserializer ──► ObjectModel ──► Package("library.common")
//!                   │                 │              ├─ SchemaRegistry
//!                   │                 │              └─ FactoryInterface
//!                   │                 └────────► Package("game") ...
//!                   ▼
//!            arena of nodes ──► leaf-first slot write-back ──► Message
//! ```
//!
//! ## Key Concepts
//!
//! - **Message / FieldValue**: a typed instance with schema defaults and an unknown-field side channel
//! - **FactoryInterface**: per-package `type name → FactoryMethod` lookup
//! - **ObjectModel**: the wired packages, declaring package first
//! - **Deserializer**: explicit-stack construction with per-field diagnostics

pub mod coerce;
pub mod deserialize;
pub mod error;
pub mod factory;
pub mod message;
pub mod model;

pub use deserialize::{Deserialized, Deserializer};
pub use error::{DeserializeError, WiringError};
pub use factory::{
    AttributeKey, FactoryCall, FactoryInterface, FactoryMethod, FactoryResult, PackageFactory,
};
pub use message::{FieldMap, FieldValue, Message};
pub use model::{ObjectConfig, ObjectModel, ObjectModelBuilder, Package};
