//! Sync engine - the single writer of live entities
//!
//! Every batch goes through [`SyncEngine::apply_batch`]: batches from
//! transports are queued by the attach callback and drained by
//! [`SyncEngine::pump`], local edits and call responses are applied
//! directly. Each batch is applied fully before the next one starts.
//!
//! Per entity, a batch whose change number is not newer than the entity's
//! is stale and changes nothing. A batch that skips change numbers is
//! applied with a [`SyncWarning::SequenceGap`].

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult, SyncWarning};
use crate::report::{BatchReport, BatchStatus, SyncStats};
use crate::transport::ChangeTransport;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_ir::{ChangeSource, MessagePatch, PatchBatch, PatchResponse, Value};
use tether_object::{DeserializeError, Message, ObjectModel, Package};
use tether_patch::PatchApplier;

/// A live, addressable instance
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntity {
    pub instance: Message,
    /// Change number of the last applied batch
    pub change_number: u64,
    /// Origin of the last applied batch
    pub source: Option<ChangeSource>,
}

impl LiveEntity {
    /// Fully-qualified type of the instance
    pub fn type_name(&self) -> &str {
        self.instance.type_name()
    }
}

/// Serializable state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub message_type: String,
    pub change_number: u64,
    /// The instance in boundary form
    pub data: Value,
}

impl EntitySnapshot {
    /// Decode a snapshot from JSON
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode this snapshot as JSON
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Called after each applied batch with its report and the updated instance
pub type ChangeListener = Box<dyn FnMut(&BatchReport, &Message) + Send>;

/// Owns live entities and applies batches to them
pub struct SyncEngine {
    model: Arc<ObjectModel>,
    config: SyncConfig,
    entities: HashMap<String, LiveEntity>,
    inbox: Sender<PatchBatch>,
    queued: Receiver<PatchBatch>,
    /// Shared with attach callbacks
    dropped: Arc<AtomicU64>,
    listeners: Vec<ChangeListener>,
    stats: SyncStats,
}

impl SyncEngine {
    /// Create an engine over an already wired model
    pub fn new(model: Arc<ObjectModel>, config: SyncConfig) -> Self {
        let (inbox, queued) = bounded(config.inbox_capacity.max(1));
        Self {
            model,
            config,
            entities: HashMap::new(),
            inbox,
            queued,
            dropped: Arc::new(AtomicU64::new(0)),
            listeners: Vec::new(),
            stats: SyncStats::default(),
        }
    }

    /// Wire packages with `config.object` and create an engine over them
    pub fn with_packages(
        packages: impl IntoIterator<Item = Package>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let model = packages
            .into_iter()
            .fold(ObjectModel::builder(), |builder, package| builder.package(package))
            .config(config.object.clone())
            .build()?;
        Ok(Self::new(Arc::new(model), config))
    }

    /// The wired object model
    pub fn model(&self) -> &Arc<ObjectModel> {
        &self.model
    }

    /// Get the configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Build an entity from raw data and make it live.
    ///
    /// Replaces any entity with the same id. Returns the construction
    /// diagnostics; the entity is live even when there are some.
    pub fn materialize(
        &mut self,
        entity_id: impl Into<String>,
        type_name: &str,
        raw: &Value,
        change_number: u64,
    ) -> SyncResult<Vec<DeserializeError>> {
        let entity_id = entity_id.into();
        let built = self.model.deserializer().deserialize(type_name, raw)?;
        if !built.is_clean() {
            log::warn!(
                "Materialized {} ({}) with {} diagnostics",
                entity_id,
                type_name,
                built.diagnostics.len()
            );
        }

        self.entities.insert(
            entity_id,
            LiveEntity {
                instance: built.value,
                change_number,
                source: None,
            },
        );
        Ok(built.diagnostics)
    }

    /// Make an existing instance live, returning the entity it replaces
    pub fn insert_entity(
        &mut self,
        entity_id: impl Into<String>,
        instance: Message,
        change_number: u64,
    ) -> Option<LiveEntity> {
        self.entities.insert(
            entity_id.into(),
            LiveEntity {
                instance,
                change_number,
                source: None,
            },
        )
    }

    /// Get a live entity
    pub fn entity(&self, entity_id: &str) -> Option<&LiveEntity> {
        self.entities.get(entity_id)
    }

    /// Stop tracking an entity
    pub fn remove_entity(&mut self, entity_id: &str) -> Option<LiveEntity> {
        self.entities.remove(entity_id)
    }

    /// Ids of all live entities
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Register a listener for applied batches
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: FnMut(&BatchReport, &Message) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Route a transport's deliveries into this engine's inbox.
    ///
    /// Deliveries are queued only; call [`pump`](Self::pump) to apply them.
    pub fn attach(&mut self, transport: &mut dyn ChangeTransport) -> SyncResult<()> {
        let inbox = self.inbox.clone();
        let dropped = self.dropped.clone();

        transport.on_changes(Box::new(move |batches| {
            for batch in batches {
                if let Err(err) = inbox.try_send(batch) {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    let batch = err.into_inner();
                    log::warn!(
                        "Sync inbox full, dropped batch {} for {}",
                        batch.change_number,
                        batch.entity_id
                    );
                }
            }
        }))?;
        Ok(())
    }

    /// Number of queued batches
    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    /// Apply every queued batch in arrival order
    pub fn pump(&mut self) -> Vec<SyncResult<BatchReport>> {
        let mut results = Vec::new();
        while let Ok(batch) = self.queued.try_recv() {
            results.push(self.apply_queued(batch));
        }
        results
    }

    /// Wait up to `timeout` for a batch, then apply everything queued
    pub fn pump_timeout(&mut self, timeout: Duration) -> Vec<SyncResult<BatchReport>> {
        match self.queued.recv_timeout(timeout) {
            Ok(batch) => {
                let mut results = vec![self.apply_queued(batch)];
                results.extend(self.pump());
                results
            }
            Err(_) => Vec::new(),
        }
    }

    fn apply_queued(&mut self, batch: PatchBatch) -> SyncResult<BatchReport> {
        let result = self.apply_batch(&batch);
        if let Err(err) = &result {
            log::warn!("Rejected batch {} for {}: {}", batch.change_number, batch.entity_id, err);
        }
        result
    }

    /// Apply one batch now
    pub fn apply_batch(&mut self, batch: &PatchBatch) -> SyncResult<BatchReport> {
        let result = self.apply_to_entity(batch);
        if result.is_err() {
            self.stats.batches_rejected += 1;
        }
        result
    }

    fn apply_to_entity(&mut self, batch: &PatchBatch) -> SyncResult<BatchReport> {
        if batch.len() > self.config.max_patches_per_batch {
            return Err(SyncError::BatchTooLarge {
                len: batch.len(),
                max: self.config.max_patches_per_batch,
            });
        }

        let entity = self
            .entities
            .get_mut(&batch.entity_id)
            .ok_or_else(|| SyncError::UnknownEntity(batch.entity_id.clone()))?;

        if entity.instance.type_name() != batch.message_type {
            return Err(SyncError::TypeMismatch {
                entity_id: batch.entity_id.clone(),
                expected: entity.instance.type_name().to_string(),
                found: batch.message_type.clone(),
            });
        }

        if batch.change_number <= entity.change_number {
            if self.config.log_stale_batches {
                log::debug!(
                    "Discarding stale batch {} for {} (at {})",
                    batch.change_number,
                    batch.entity_id,
                    entity.change_number
                );
            }
            self.stats.batches_stale += 1;
            return Ok(BatchReport::new(batch, BatchStatus::Stale));
        }

        let mut report = BatchReport::new(batch, BatchStatus::Applied);

        let expected = entity.change_number + 1;
        let received = batch.first_change_number();
        if received > expected {
            log::warn!(
                "Sequence gap on {}: expected change {}, received {}",
                batch.entity_id,
                expected,
                received
            );
            report.warnings.push(SyncWarning::SequenceGap { expected, received });
            self.stats.sequence_gaps += 1;
        }

        report.patches = PatchApplier::new(&self.model).apply(&mut entity.instance, &batch.patches);
        entity.change_number = batch.change_number;
        entity.source = Some(batch.source);

        self.stats.batches_applied += 1;
        self.stats.patches_applied += report.patches.applied as u64;
        self.stats.patches_skipped += report.patches.skipped() as u64;

        log::debug!(
            "Applied batch {} to {} from {:?}: {} applied, {} skipped",
            batch.change_number,
            batch.entity_id,
            batch.source,
            report.patches.applied,
            report.patches.skipped()
        );

        for listener in &mut self.listeners {
            listener(&report, &entity.instance);
        }
        Ok(report)
    }

    /// Apply a local edit.
    ///
    /// The patches are numbered after the entity's change number. Returns
    /// the batch, ready to forward upstream, with its report.
    pub fn edit(
        &mut self,
        entity_id: &str,
        patches: impl IntoIterator<Item = MessagePatch>,
    ) -> SyncResult<(PatchBatch, BatchReport)> {
        let entity = self
            .entities
            .get(entity_id)
            .ok_or_else(|| SyncError::UnknownEntity(entity_id.to_string()))?;

        let batch = patches
            .into_iter()
            .fold(
                PatchBatch::builder(entity.type_name(), entity_id, ChangeSource::Local)
                    .after(entity.change_number),
                |builder, patch| builder.patch(patch),
            )
            .build();

        let report = self.apply_batch(&batch)?;
        Ok((batch, report))
    }

    /// Apply the batches of a patch-returning call, in order.
    ///
    /// A failed response is returned as [`SyncError::Remote`]. The first
    /// rejected batch stops the rest; batches before it stay applied.
    pub fn apply_response(&mut self, response: &PatchResponse) -> SyncResult<Vec<BatchReport>> {
        if !response.success {
            return Err(SyncError::Remote(
                response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "no error message".to_string()),
            ));
        }
        response
            .patch_batches
            .iter()
            .map(|batch| self.apply_batch(batch))
            .collect()
    }

    /// Capture an entity in boundary form
    pub fn snapshot(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.entities.get(entity_id).map(|entity| EntitySnapshot {
            entity_id: entity_id.to_string(),
            message_type: entity.type_name().to_string(),
            change_number: entity.change_number,
            data: entity.instance.to_value(),
        })
    }

    /// Rebuild an entity from a snapshot, replacing any live one
    pub fn restore(&mut self, snapshot: &EntitySnapshot) -> SyncResult<Vec<DeserializeError>> {
        self.materialize(
            snapshot.entity_id.clone(),
            &snapshot.message_type,
            &snapshot.data,
            snapshot.change_number,
        )
    }

    /// Get current statistics
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            inbox_dropped: self.dropped.load(Ordering::Relaxed),
            ..self.stats.clone()
        }
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("entities", &self.entities.len())
            .field("pending", &self.pending())
            .field("listeners", &self.listeners.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_object::FieldValue;
    use tether_schema::{FieldSchema, MessageSchema, SchemaRegistry};

    fn engine() -> SyncEngine {
        let schemas = SchemaRegistry::new("demo")
            .with_message(
                MessageSchema::new("demo.Counter")
                    .with_field(FieldSchema::integer("value", 1))
                    .with_field(FieldSchema::string("label", 2)),
            )
            .unwrap();
        SyncEngine::with_packages(
            [Package::with_default_factory(schemas)],
            SyncConfig::default().with_max_patches_per_batch(2),
        )
        .unwrap()
    }

    fn batch(change_number: u64, value: i64) -> PatchBatch {
        PatchBatch::new("demo.Counter", "c1", ChangeSource::Server)
            .with_patch(MessagePatch::set("value", value).with_change_number(change_number))
    }

    fn value(engine: &SyncEngine) -> Option<i64> {
        engine
            .entity("c1")
            .and_then(|e| e.instance.get("value"))
            .and_then(FieldValue::as_i64)
    }

    #[test]
    fn test_stale_batch_changes_nothing() {
        let mut engine = engine();
        engine.materialize("c1", "demo.Counter", &Value::Null, 3).unwrap();

        let report = engine.apply_batch(&batch(3, 9)).unwrap();
        assert_eq!(report.status, BatchStatus::Stale);
        assert_eq!(value(&engine), Some(0));
        assert_eq!(engine.stats().batches_stale, 1);
    }

    #[test]
    fn test_limits_and_lookup() {
        let mut engine = engine();
        assert!(matches!(
            engine.apply_batch(&batch(1, 1)),
            Err(SyncError::UnknownEntity(_))
        ));

        engine.materialize("c1", "demo.Counter", &Value::Null, 0).unwrap();
        let big = batch(1, 1)
            .with_patch(MessagePatch::set("label", "a"))
            .with_patch(MessagePatch::set("label", "b"));
        assert!(matches!(
            engine.apply_batch(&big),
            Err(SyncError::BatchTooLarge { len: 3, max: 2 })
        ));

        let mut other = batch(1, 1);
        other.message_type = "demo.Other".into();
        assert!(matches!(engine.apply_batch(&other), Err(SyncError::TypeMismatch { .. })));
        assert_eq!(engine.stats().batches_rejected, 3);
    }

    #[test]
    fn test_local_edit_numbers_after_entity() {
        let mut engine = engine();
        engine.materialize("c1", "demo.Counter", &Value::Null, 7).unwrap();

        let (batch, report) = engine
            .edit("c1", [MessagePatch::set("value", 1), MessagePatch::set("label", "x")])
            .unwrap();

        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(batch.source, ChangeSource::Local);
        assert_eq!(batch.first_change_number(), 8);
        assert_eq!(batch.change_number, 9);
        assert_eq!(engine.entity("c1").map(|e| e.change_number), Some(9));
        assert_eq!(engine.entity("c1").and_then(|e| e.source), Some(ChangeSource::Local));
    }
}
