//! Batch reports and engine statistics

use crate::error::SyncWarning;
use tether_ir::{ChangeSource, PatchBatch};
use tether_patch::PatchReport;

/// What happened to a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Patches were applied and the change number advanced
    Applied,
    /// The change number was not newer than the entity's; nothing changed
    Stale,
}

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub entity_id: String,
    pub message_type: String,
    pub source: ChangeSource,
    /// The batch's high-water mark
    pub change_number: u64,
    pub status: BatchStatus,
    /// Per-patch results; empty for stale batches
    pub patches: PatchReport,
    pub warnings: Vec<SyncWarning>,
    /// Distinct authors of the batch's patches, in patch order
    pub user_ids: Vec<String>,
    /// Distinct transactions of the batch's patches, in patch order
    pub transaction_ids: Vec<String>,
}

impl BatchReport {
    pub(crate) fn new(batch: &PatchBatch, status: BatchStatus) -> Self {
        let mut user_ids: Vec<String> = Vec::new();
        let mut transaction_ids: Vec<String> = Vec::new();
        for patch in &batch.patches {
            if let Some(user) = &patch.user_id {
                if !user_ids.contains(user) {
                    user_ids.push(user.clone());
                }
            }
            if let Some(transaction) = &patch.transaction_id {
                if !transaction_ids.contains(transaction) {
                    transaction_ids.push(transaction.clone());
                }
            }
        }

        Self {
            entity_id: batch.entity_id.clone(),
            message_type: batch.message_type.clone(),
            source: batch.source,
            change_number: batch.change_number,
            status,
            patches: PatchReport::default(),
            warnings: Vec::new(),
            user_ids,
            transaction_ids,
        }
    }

    /// Check if the batch was applied
    pub fn is_applied(&self) -> bool {
        self.status == BatchStatus::Applied
    }

    /// Check if the batch was applied with no skipped patches and no warnings
    pub fn is_clean(&self) -> bool {
        self.is_applied() && self.patches.is_clean() && self.warnings.is_empty()
    }
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Batches applied
    pub batches_applied: u64,
    /// Batches discarded as stale
    pub batches_stale: u64,
    /// Batches rejected with an error
    pub batches_rejected: u64,
    /// Patches applied
    pub patches_applied: u64,
    /// Patches skipped with an address error
    pub patches_skipped: u64,
    /// Sequence gaps seen
    pub sequence_gaps: u64,
    /// Deliveries dropped because the inbox was full
    pub inbox_dropped: u64,
}
