//! # Tether Sync - live entities and change transports
//!
//! Keeps typed instances current as patch batches arrive from the server,
//! from storage, from peers or from local edits.
//!
//! ## Architecture
//!
//! ```text
//! host bridge ──► ChangeSender ──► ChannelTransport ──callback──► inbox
//!                                                                   │
//!                                SyncEngine::pump ◄─────────────────┘
//!                                     │
//!                  staleness / gap check per entity
//!                                     │
//!                          PatchApplier ──► LiveEntity ──► listeners
//! ```
//!
//! ## Key Concepts
//!
//! - **ChangeTransport**: anything that delivers `Vec<PatchBatch>` through a callback
//! - **SyncEngine**: the only writer of live instances; one batch at a time
//! - **Change number**: per-entity high-water mark; older batches are stale
//! - **BatchReport**: what happened to one batch, handed to listeners

pub mod config;
pub mod engine;
pub mod error;
pub mod report;
pub mod transport;

pub use config::SyncConfig;
pub use engine::{ChangeListener, EntitySnapshot, LiveEntity, SyncEngine};
pub use error::{SyncError, SyncResult, SyncWarning};
pub use report::{BatchReport, BatchStatus, SyncStats};
pub use transport::{
    ChangeCallback, ChangeSender, ChangeTransport, ChannelTransport, TransportError,
    TransportResult, TransportStats,
};
