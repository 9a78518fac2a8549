//! Import transactions.
//!
//! A transaction buffers the operations of one import in memory. Nothing
//! reaches the store until [`TransactionManager::commit`], which hands the
//! whole batch to [`GridStore::apply_batch`]. Rolling back simply drops the
//! buffer.

use crate::error::{GridError, Result};
use crate::models::{FileEntry, Record};
use crate::store::{BatchSummary, GridStore, StagedOp};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle of an open transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of all open transactions against one store
#[derive(Debug)]
pub struct TransactionManager<S> {
    store: Arc<S>,
    staged: Mutex<HashMap<TransactionId, Vec<StagedOp>>>,
}

impl<S: GridStore> TransactionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            staged: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn staged(&self) -> MutexGuard<'_, HashMap<TransactionId, Vec<StagedOp>>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new, empty transaction
    pub fn begin(&self) -> TransactionId {
        let id = TransactionId::new();
        self.staged().insert(id, Vec::new());
        debug!("Began transaction {}", id);
        id
    }

    fn stage(&self, id: TransactionId, op: StagedOp) -> Result<()> {
        let mut staged = self.staged();
        let ops = staged
            .get_mut(&id)
            .ok_or_else(|| GridError::TransactionNotFound { id: id.to_string() })?;
        ops.push(op);
        Ok(())
    }

    /// Stage removal of a file entry and all of its records
    pub fn stage_delete_by_file(&self, id: TransactionId, file: &str) -> Result<()> {
        self.stage(id, StagedOp::DeleteByFile(file.to_string()))
    }

    pub fn stage_insert_file(&self, id: TransactionId, entry: FileEntry) -> Result<()> {
        self.stage(id, StagedOp::InsertFile(entry))
    }

    /// Stage records linked to `file`.
    ///
    /// The link is only checked at commit time, against the state the batch
    /// has built up to that point.
    pub fn stage_insert_records(
        &self,
        id: TransactionId,
        records: Vec<Record>,
        file: &str,
    ) -> Result<()> {
        self.stage(
            id,
            StagedOp::InsertRecords {
                file: file.to_string(),
                records,
            },
        )
    }

    /// Apply every staged operation as one unit.
    ///
    /// The transaction is closed whatever the outcome.
    pub async fn commit(&self, id: TransactionId) -> Result<BatchSummary> {
        let ops = self
            .staged()
            .remove(&id)
            .ok_or_else(|| GridError::TransactionNotFound { id: id.to_string() })?;

        let op_count = ops.len();
        let files = touched_files(&ops);
        match self.store.apply_batch(ops).await {
            Ok(summary) => {
                info!(
                    "Committed transaction {} for {:?} ({} operations, {} records inserted)",
                    id, files, op_count, summary.inserted_records
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("Commit of transaction {} for {:?} failed: {}", id, files, e);
                Err(match e {
                    e @ GridError::BatchInsertFailed { .. } => e,
                    other => GridError::batch_insert_failed(other.to_string()),
                })
            }
        }
    }

    /// Discard a transaction. Unknown ids are ignored.
    pub fn rollback(&self, id: TransactionId) {
        if let Some(ops) = self.staged().remove(&id) {
            debug!("Rolled back transaction {} ({} operations)", id, ops.len());
        }
    }

    pub fn is_active(&self, id: TransactionId) -> bool {
        self.staged().contains_key(&id)
    }

    /// Number of operations staged so far, `None` for unknown ids
    pub fn staged_len(&self, id: TransactionId) -> Option<usize> {
        self.staged().get(&id).map(Vec::len)
    }
}

/// Distinct file names a batch touches, in first-use order
fn touched_files(ops: &[StagedOp]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for name in ops.iter().map(StagedOp::file_name) {
        if !files.iter().any(|f| f == name) {
            files.push(name.to_string());
        }
    }
    files
}
