//! Embedding backfill request, report, and state types.

use serde::{Deserialize, Serialize};

use crate::memory::MemoryId;

/// Invocation parameters for one backfill batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Exclusive lower bound for the id cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<MemoryId>,
}

/// Outcome of a backfill batch (or an aggregate of batches).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub processed: u32,
    pub updated: u32,
    pub failed: u32,
    /// Id of the last record in the batch, whether or not it succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<MemoryId>,
}

impl ReconcileReport {
    /// Fold another batch into this running total.
    pub fn absorb(&mut self, batch: &ReconcileReport) {
        self.processed += batch.processed;
        self.updated += batch.updated;
        self.failed += batch.failed;
        if batch.last_id.is_some() {
            self.last_id = batch.last_id;
        }
    }
}

/// Lifecycle of the backfill reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerState {
    Idle,
    Scanning,
    Processing,
    Done,
}

impl std::fmt::Display for ReconcilerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReconcilerState::Idle => "idle",
            ReconcilerState::Scanning => "scanning",
            ReconcilerState::Processing => "processing",
            ReconcilerState::Done => "done",
        };
        f.write_str(s)
    }
}
