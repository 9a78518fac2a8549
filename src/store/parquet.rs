//! Parquet-backed store.
//!
//! The store directory holds two tables, `files.parquet` and
//! `records.parquet`. Everything is loaded into memory on open. A commit
//! writes both tables next to the live ones and renames them into place
//! before the in-memory state is swapped, so a failed write leaves both the
//! files on disk and the visible state untouched.
//!
//! The pending tables are written records first and renamed records first.
//! A lone `files.parquet.pending` therefore means the records table of a
//! commit is already live, and `open` completes that commit. Any other
//! leftover pending table belongs to a commit that never became live and
//! is removed.

use super::{BatchSummary, FileSnapshot, GridStore, StagedOp, StoreState};
use crate::constants::{FILES_TABLE, PENDING_SUFFIX, RECORDS_TABLE, columns};
use crate::error::{GridError, Result};
use crate::models::{FileEntry, Record, RecordDate};
use async_trait::async_trait;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};

/// Store persisted as Parquet tables in a directory
#[derive(Debug)]
pub struct ParquetStore {
    dir: PathBuf,
    state: RwLock<StoreState>,
    writer: Mutex<()>,
}

impl ParquetStore {
    /// Open the store in `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let state = task::spawn_blocking({
            let dir = dir.clone();
            move || load_state(&dir)
        })
        .await
        .map_err(|e| GridError::CorruptStore {
            path: dir.clone(),
            reason: format!("Failed to load tables: {}", e),
        })??;

        info!(
            "Opened store at {} with {} files",
            dir.display(),
            state.files().count()
        );

        Ok(Self {
            dir,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GridStore for ParquetStore {
    async fn apply_batch(&self, ops: Vec<StagedOp>) -> Result<BatchSummary> {
        // One writer at a time; readers keep using the current state
        let _writer = self.writer.lock().await;

        let (next, summary) = {
            let current = self.read();
            let (changeset, summary) = current.stage(&ops)?;
            let mut next = current.clone();
            next.merge(changeset);
            (next, summary)
        };

        let next = task::spawn_blocking({
            let dir = self.dir.clone();
            move || write_state(&dir, &next).map(|()| next)
        })
        .await
        .map_err(|e| GridError::batch_insert_failed(format!("Write task failed: {}", e)))?
        .map_err(|e| GridError::batch_insert_failed(format!("Failed to persist batch: {}", e)))?;

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        debug!("Committed batch to {}: {:?}", self.dir.display(), summary);
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

/// Build a frame of records in order, with a leading `file` column if given
pub(crate) fn records_frame(records: &[Record], file: Option<&str>) -> PolarsResult<DataFrame> {
    let mut frame_columns = Vec::with_capacity(7);
    if let Some(file) = file {
        frame_columns.push(Column::new(
            columns::FILE.into(),
            vec![file.to_string(); records.len()],
        ));
    }
    frame_columns.extend([
        Column::new(
            columns::XREF.into(),
            records.iter().map(|r| r.xref).collect::<Vec<i64>>(),
        ),
        Column::new(
            columns::YREF.into(),
            records.iter().map(|r| r.yref).collect::<Vec<i64>>(),
        ),
        Column::new(
            columns::DAY.into(),
            records.iter().map(|r| r.date.day).collect::<Vec<u32>>(),
        ),
        Column::new(
            columns::MONTH.into(),
            records.iter().map(|r| r.date.month).collect::<Vec<u32>>(),
        ),
        Column::new(
            columns::YEAR.into(),
            records.iter().map(|r| r.date.year).collect::<Vec<i32>>(),
        ),
        Column::new(
            columns::VALUE.into(),
            records.iter().map(|r| r.value).collect::<Vec<i64>>(),
        ),
    ]);
    DataFrame::new(frame_columns)
}

/// Write a frame as Snappy-compressed Parquet and flush it to disk
pub(crate) fn write_frame(path: &Path, frame: &mut DataFrame) -> Result<()> {
    let file = File::create(path)?;
    ParquetWriter::new(&file)
        .with_compression(ParquetCompression::Snappy)
        .finish(frame)?;
    file.sync_all()?;
    Ok(())
}

fn pending_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PENDING_SUFFIX);
    PathBuf::from(name)
}

fn write_state(dir: &Path, state: &StoreState) -> Result<()> {
    let entries: Vec<&FileEntry> = state.files().collect();
    let mut files = DataFrame::new(vec![
        Column::new(
            columns::NAME.into(),
            entries.iter().map(|e| e.name.clone()).collect::<Vec<String>>(),
        ),
        Column::new(
            columns::FROM_YEAR.into(),
            entries
                .iter()
                .map(|e| i32::from(e.from_year))
                .collect::<Vec<i32>>(),
        ),
        Column::new(
            columns::TO_YEAR.into(),
            entries
                .iter()
                .map(|e| i32::from(e.to_year))
                .collect::<Vec<i32>>(),
        ),
    ])?;

    let mut frames = Vec::with_capacity(entries.len());
    for entry in &entries {
        frames.push(records_frame(state.records(&entry.name), Some(entry.name.as_str()))?);
    }
    let mut records = match frames.len() {
        0 => records_frame(&[], Some(""))?,
        _ => {
            let mut frames = frames.into_iter();
            let mut combined = frames.next().unwrap_or_default();
            for frame in frames {
                combined.vstack_mut(&frame)?;
            }
            combined
        }
    };

    let files_path = dir.join(FILES_TABLE);
    let records_path = dir.join(RECORDS_TABLE);
    let files_pending = pending_path(&files_path);
    let records_pending = pending_path(&records_path);

    write_frame(&records_pending, &mut records)?;
    write_frame(&files_pending, &mut files)?;

    std::fs::rename(&records_pending, &records_path)?;
    std::fs::rename(&files_pending, &files_path)?;

    debug!(
        "Wrote {} files and {} records to {}",
        files.height(),
        records.height(),
        dir.display()
    );
    Ok(())
}

fn read_frame(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

fn corrupt(path: &Path, reason: impl Into<String>) -> GridError {
    GridError::CorruptStore {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Finish or discard a commit interrupted between writing and renaming
fn recover_pending(dir: &Path) -> Result<()> {
    let files_path = dir.join(FILES_TABLE);
    let files_pending = pending_path(&files_path);
    let records_pending = pending_path(&dir.join(RECORDS_TABLE));

    match (files_pending.exists(), records_pending.exists()) {
        (true, false) => {
            warn!(
                "Completing interrupted commit in {}: records table is live, installing files table",
                dir.display()
            );
            std::fs::rename(&files_pending, &files_path)?;
        }
        (files, records) => {
            if files {
                warn!("Removing unfinished {}", files_pending.display());
                std::fs::remove_file(&files_pending)?;
            }
            if records {
                warn!("Removing unfinished {}", records_pending.display());
                std::fs::remove_file(&records_pending)?;
            }
        }
    }
    Ok(())
}

fn load_state(dir: &Path) -> Result<StoreState> {
    recover_pending(dir)?;

    let files_path = dir.join(FILES_TABLE);
    let records_path = dir.join(RECORDS_TABLE);

    if !files_path.exists() {
        debug!("No tables in {}, starting empty", dir.display());
        return Ok(StoreState::default());
    }

    let files = load_files(&files_path)?;
    let records = if records_path.exists() {
        load_records(&records_path)?
    } else {
        HashMap::new()
    };

    if let Some(orphan) = records.keys().find(|name| !files.contains_key(*name)) {
        return Err(corrupt(
            &records_path,
            format!("records reference unknown file '{}'", orphan),
        ));
    }

    Ok(StoreState::from_parts(files, records))
}

fn load_files(path: &Path) -> Result<BTreeMap<String, FileEntry>> {
    let frame = read_frame(path)?;
    let names = frame.column(columns::NAME)?.str()?;
    let from_years = frame.column(columns::FROM_YEAR)?.i32()?;
    let to_years = frame.column(columns::TO_YEAR)?.i32()?;

    let mut files = BTreeMap::new();
    for row in 0..frame.height() {
        let (Some(name), Some(from_year), Some(to_year)) =
            (names.get(row), from_years.get(row), to_years.get(row))
        else {
            return Err(corrupt(path, format!("null value in row {}", row)));
        };
        let (Ok(from_year), Ok(to_year)) = (i16::try_from(from_year), i16::try_from(to_year))
        else {
            return Err(corrupt(path, format!("year out of range in row {}", row)));
        };

        files.insert(
            name.to_string(),
            FileEntry {
                name: name.to_string(),
                from_year,
                to_year,
            },
        );
    }
    Ok(files)
}

fn load_records(path: &Path) -> Result<HashMap<String, Vec<Record>>> {
    let frame = read_frame(path)?;
    let files = frame.column(columns::FILE)?.str()?;
    let xrefs = frame.column(columns::XREF)?.i64()?;
    let yrefs = frame.column(columns::YREF)?.i64()?;
    let days = frame.column(columns::DAY)?.u32()?;
    let months = frame.column(columns::MONTH)?.u32()?;
    let years = frame.column(columns::YEAR)?.i32()?;
    let values = frame.column(columns::VALUE)?.i64()?;

    let mut records: HashMap<String, Vec<Record>> = HashMap::new();
    for row in 0..frame.height() {
        let (
            Some(file),
            Some(xref),
            Some(yref),
            Some(day),
            Some(month),
            Some(year),
            Some(value),
        ) = (
            files.get(row),
            xrefs.get(row),
            yrefs.get(row),
            days.get(row),
            months.get(row),
            years.get(row),
            values.get(row),
        )
        else {
            return Err(corrupt(path, format!("null value in row {}", row)));
        };

        records.entry(file.to_string()).or_default().push(Record {
            xref,
            yref,
            date: RecordDate { day, month, year },
            value,
        });
    }
    Ok(records)
}
