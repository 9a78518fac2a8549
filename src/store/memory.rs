//! In-memory store.

use super::{BatchSummary, FileSnapshot, GridStore, StagedOp, StoreState};
use crate::error::Result;
use crate::models::{FileEntry, Record};
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::debug;

/// Store keeping every file and record in memory.
///
/// A batch is staged and merged under the write lock, so readers see the
/// state from before or after it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GridStore for MemoryStore {
    async fn apply_batch(&self, ops: Vec<StagedOp>) -> Result<BatchSummary> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let (changeset, summary) = state.stage(&ops)?;
        state.merge(changeset);
        debug!("Applied in-memory batch: {:?}", summary);
        Ok(summary)
    }

    async fn file_entry(&self, name: &str) -> Result<Option<FileEntry>> {
        Ok(self.read().file_entry(name).cloned())
    }

    async fn list_files(&self) -> Result<Vec<FileEntry>> {
        Ok(self.read().files().cloned().collect())
    }

    async fn count_records(&self, name: &str) -> Result<usize> {
        Ok(self.read().count_records(name))
    }

    async fn fetch_records(
        &self,
        name: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>> {
        Ok(self.read().page(name, offset, limit))
    }

    async fn fetch_page(&self, name: &str, offset: usize, limit: usize) -> Result<FileSnapshot> {
        Ok(self.read().snapshot(name, offset, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GridError;
    use crate::models::{Grid, GridRef, YearRange};

    fn entry(name: &str) -> FileEntry {
        FileEntry::new(name, &YearRange::new(2000, 2001).unwrap()).unwrap()
    }

    fn insert_ops(name: &str, values: Vec<i64>) -> Vec<StagedOp> {
        let years = YearRange::new(2000, 2001).unwrap();
        let records = Grid::with_rows(GridRef { x: 5, y: 6 }, vec![values])
            .records(&years)
            .collect();
        vec![
            StagedOp::DeleteByFile(name.to_string()),
            StagedOp::InsertFile(entry(name)),
            StagedOp::InsertRecords {
                file: name.to_string(),
                records,
            },
        ]
    }

    #[tokio::test]
    async fn test_apply_and_read_back() {
        let store = MemoryStore::new();
        let summary = store.apply_batch(insert_ops("a", vec![1, 2, 3])).await.unwrap();

        assert_eq!(summary.inserted_files, 1);
        assert_eq!(summary.inserted_records, 3);
        assert_eq!(store.count_records("a").await.unwrap(), 3);
        assert_eq!(store.file_entry("a").await.unwrap(), Some(entry("a")));

        let page = store.fetch_records("a", 1, 10).await.unwrap();
        let values: Vec<i64> = page.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2, 3]);

        let snapshot = store.fetch_page("a", 2, 10).await.unwrap();
        assert_eq!(snapshot.entry, Some(entry("a")));
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.records.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_state_unchanged() {
        let store = MemoryStore::new();
        store.apply_batch(insert_ops("a", vec![1, 2])).await.unwrap();

        let mut ops = insert_ops("a", vec![7, 8, 9]);
        ops.push(StagedOp::InsertRecords {
            file: "orphan".to_string(),
            records: Vec::new(),
        });

        let result = store.apply_batch(ops).await;
        assert!(matches!(result, Err(GridError::BatchInsertFailed { .. })));

        let values: Vec<i64> = store
            .fetch_records("a", 0, 10)
            .await
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_list_files_sorted() {
        let store = MemoryStore::new();
        store.apply_batch(insert_ops("b", vec![1])).await.unwrap();
        store.apply_batch(insert_ops("a", vec![1])).await.unwrap();

        let names: Vec<String> = store
            .list_files()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
