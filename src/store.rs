//! Storage backends for imported grids.
//!
//! The importer only needs an atomic batch apply and a few predicate
//! fetches, expressed by [`GridStore`]. Both backends share [`StoreState`],
//! which stages a batch against the current state and merges it only when
//! every operation succeeded:
//!
//! - [`memory::MemoryStore`] keeps the state behind a lock
//! - [`parquet::ParquetStore`] also persists it as two Parquet tables

pub mod memory;
pub mod parquet;

pub use memory::MemoryStore;
pub use parquet::ParquetStore;

use crate::error::{GridError, Result};
use crate::models::{FileEntry, Record};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// One operation buffered by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedOp {
    /// Remove a file entry and every record linked to it
    DeleteByFile(String),
    /// Insert a file entry, replacing any entry with the same name
    InsertFile(FileEntry),
    /// Append records to a file that has an entry
    InsertRecords { file: String, records: Vec<Record> },
}

impl StagedOp {
    pub fn file_name(&self) -> &str {
        match self {
            Self::DeleteByFile(name) => name,
            Self::InsertFile(entry) => &entry.name,
            Self::InsertRecords { file, .. } => file,
        }
    }
}

/// Counts reported by a committed batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub deleted_files: usize,
    pub deleted_records: usize,
    pub inserted_files: usize,
    pub inserted_records: usize,
}

/// A file entry, its record count and one page of its records, read together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSnapshot {
    pub entry: Option<FileEntry>,
    pub total: usize,
    pub records: Vec<Record>,
}

/// Storage backend with atomic batches.
///
/// `apply_batch` must make either all or none of the operations visible to
/// readers. Readers running concurrently observe the state before or after a
/// batch for a given file name, never a mix.
#[async_trait]
pub trait GridStore: Send + Sync {
    /// Apply the operations in order as a single unit
    async fn apply_batch(&self, ops: Vec<StagedOp>) -> Result<BatchSummary>;

    async fn file_entry(&self, name: &str) -> Result<Option<FileEntry>>;

    /// All file entries ordered by name
    async fn list_files(&self) -> Result<Vec<FileEntry>>;

    async fn count_records(&self, name: &str) -> Result<usize>;

    /// Records of a file in insertion order, starting at `offset`
    async fn fetch_records(&self, name: &str, offset: usize, limit: usize)
    -> Result<Vec<Record>>;

    /// Entry, record count and a page of records from one consistent state
    async fn fetch_page(&self, name: &str, offset: usize, limit: usize) -> Result<FileSnapshot>;
}

#[derive(Debug, Clone, Default)]
struct FileSlot {
    entry: Option<FileEntry>,
    records: Vec<Record>,
}

/// Changes for the file names touched by one batch
#[derive(Debug, Default)]
pub struct Changeset {
    slots: HashMap<String, FileSlot>,
}

/// Files and records held by a store
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    files: BTreeMap<String, FileEntry>,
    records: HashMap<String, Vec<Record>>,
}

impl StoreState {
    pub(crate) fn from_parts(
        files: BTreeMap<String, FileEntry>,
        records: HashMap<String, Vec<Record>>,
    ) -> Self {
        Self { files, records }
    }

    pub fn file_entry(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    pub fn records(&self, name: &str) -> &[Record] {
        self.records.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn count_records(&self, name: &str) -> usize {
        self.records(name).len()
    }

    pub fn page(&self, name: &str, offset: usize, limit: usize) -> Vec<Record> {
        let records = self.records(name);
        let start = offset.min(records.len());
        let end = offset.saturating_add(limit).min(records.len());
        records[start..end].to_vec()
    }

    pub fn snapshot(&self, name: &str, offset: usize, limit: usize) -> FileSnapshot {
        FileSnapshot {
            entry: self.files.get(name).cloned(),
            total: self.count_records(name),
            records: self.page(name, offset, limit),
        }
    }

    /// Run a batch against this state without changing it.
    ///
    /// Fails with `BatchInsertFailed` when records are inserted for a file
    /// that has no entry at that point of the batch.
    pub fn stage(&self, ops: &[StagedOp]) -> Result<(Changeset, BatchSummary)> {
        let mut changeset = Changeset::default();
        let mut summary = BatchSummary::default();

        for op in ops {
            match op {
                StagedOp::DeleteByFile(name) => {
                    // Deleting never needs a copy of the current records
                    let (had_entry, dropped) = match changeset.slots.get(name) {
                        Some(slot) => (slot.entry.is_some(), slot.records.len()),
                        None => (self.files.contains_key(name), self.count_records(name)),
                    };
                    summary.deleted_files += usize::from(had_entry);
                    summary.deleted_records += dropped;
                    changeset.slots.insert(name.clone(), FileSlot::default());
                }
                StagedOp::InsertFile(entry) => {
                    self.slot(&mut changeset, &entry.name).entry = Some(entry.clone());
                    summary.inserted_files += 1;
                }
                StagedOp::InsertRecords { file, records } => {
                    let slot = self.slot(&mut changeset, file);
                    if slot.entry.is_none() {
                        return Err(GridError::batch_insert_failed(format!(
                            "{} records reference file '{}' which has no entry",
                            records.len(),
                            file
                        )));
                    }
                    slot.records.extend_from_slice(records);
                    summary.inserted_records += records.len();
                }
            }
        }

        debug!("Staged batch of {} operations: {:?}", ops.len(), summary);
        Ok((changeset, summary))
    }

    /// Slot for `name`, seeded from the current state on first use
    fn slot<'c>(&self, changeset: &'c mut Changeset, name: &str) -> &'c mut FileSlot {
        changeset
            .slots
            .entry(name.to_string())
            .or_insert_with(|| FileSlot {
                entry: self.files.get(name).cloned(),
                records: self.records(name).to_vec(),
            })
    }

    /// Make a staged changeset part of this state
    pub fn merge(&mut self, changeset: Changeset) {
        for (name, slot) in changeset.slots {
            match slot.entry {
                Some(entry) => {
                    self.files.insert(name.clone(), entry);
                    self.records.insert(name, slot.records);
                }
                None => {
                    self.files.remove(&name);
                    self.records.remove(&name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grid, GridRef, YearRange};

    fn entry(name: &str) -> FileEntry {
        FileEntry::new(name, &YearRange::new(1958, 1960).unwrap()).unwrap()
    }

    fn records(x: i64, values: Vec<i64>) -> Vec<Record> {
        let years = YearRange::new(1958, 1960).unwrap();
        Grid::with_rows(GridRef { x, y: 0 }, vec![values])
            .records(&years)
            .collect()
    }

    #[test]
    fn test_stage_and_merge() {
        let mut state = StoreState::default();
        let ops = vec![
            StagedOp::DeleteByFile("a".to_string()),
            StagedOp::InsertFile(entry("a")),
            StagedOp::InsertRecords {
                file: "a".to_string(),
                records: records(1, vec![1, 2, 3]),
            },
        ];

        let (changeset, summary) = state.stage(&ops).unwrap();
        assert_eq!(state.count_records("a"), 0);
        assert_eq!(summary.inserted_records, 3);
        assert_eq!(summary.deleted_records, 0);

        state.merge(changeset);
        assert_eq!(state.count_records("a"), 3);
        assert_eq!(state.file_entry("a"), Some(&entry("a")));
    }

    #[test]
    fn test_delete_replaces_previous_records() {
        let mut state = StoreState::default();
        let first = vec![
            StagedOp::InsertFile(entry("a")),
            StagedOp::InsertRecords {
                file: "a".to_string(),
                records: records(1, vec![1, 2]),
            },
        ];
        let (changeset, _) = state.stage(&first).unwrap();
        state.merge(changeset);

        let second = vec![
            StagedOp::DeleteByFile("a".to_string()),
            StagedOp::InsertFile(entry("a")),
            StagedOp::InsertRecords {
                file: "a".to_string(),
                records: records(2, vec![9]),
            },
        ];
        let (changeset, summary) = state.stage(&second).unwrap();
        assert_eq!(summary.deleted_files, 1);
        assert_eq!(summary.deleted_records, 2);
        state.merge(changeset);

        assert_eq!(state.count_records("a"), 1);
        assert_eq!(state.records("a")[0].xref, 2);
    }

    #[test]
    fn test_records_without_entry_fail_the_batch() {
        let state = StoreState::default();
        let ops = vec![
            StagedOp::InsertFile(entry("a")),
            StagedOp::InsertRecords {
                file: "b".to_string(),
                records: records(1, vec![1]),
            },
        ];

        assert!(matches!(
            state.stage(&ops),
            Err(GridError::BatchInsertFailed { .. })
        ));
        assert_eq!(state.files().count(), 0);
    }

    #[test]
    fn test_delete_only_removes_file() {
        let mut state = StoreState::default();
        let (changeset, _) = state
            .stage(&[
                StagedOp::InsertFile(entry("a")),
                StagedOp::InsertFile(entry("b")),
            ])
            .unwrap();
        state.merge(changeset);

        let (changeset, _) = state
            .stage(&[StagedOp::DeleteByFile("a".to_string())])
            .unwrap();
        state.merge(changeset);

        let names: Vec<&str> = state.files().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_page_bounds() {
        let mut state = StoreState::default();
        let (changeset, _) = state
            .stage(&[
                StagedOp::InsertFile(entry("a")),
                StagedOp::InsertRecords {
                    file: "a".to_string(),
                    records: records(1, vec![1, 2, 3, 4, 5]),
                },
            ])
            .unwrap();
        state.merge(changeset);

        let values = |page: Vec<Record>| page.into_iter().map(|r| r.value).collect::<Vec<_>>();
        assert_eq!(values(state.page("a", 0, 2)), vec![1, 2]);
        assert_eq!(values(state.page("a", 4, 2)), vec![5]);
        assert!(state.page("a", 10, 2).is_empty());
        assert!(state.page("missing", 0, 2).is_empty());

        let snapshot = state.snapshot("a", 3, 10);
        assert_eq!(snapshot.entry, Some(entry("a")));
        assert_eq!(snapshot.total, 5);
        assert_eq!(values(snapshot.records), vec![4, 5]);
        assert_eq!(state.snapshot("missing", 0, 2), FileSnapshot::default());
    }
}
