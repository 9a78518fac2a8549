//! Import orchestration.
//!
//! An import replaces everything stored under one logical file name. The
//! previous entry is scheduled for deletion before the first line is read,
//! grids are staged as soon as the assembler closes them and the whole batch
//! is committed at the end. Any failure, cancellation or a dropped import
//! future leaves the store exactly as it was.

use crate::assembler::{AssemblyEvent, AssemblyStats, DocumentAssembler};
use crate::config::ImportConfig;
use crate::error::{GridError, Result};
use crate::models::{FileEntry, Grid, YearRange};
use crate::store::{BatchSummary, GridStore};
use crate::transaction::{TransactionId, TransactionManager};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Called with the number of lines read so far
pub type ProgressCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Outcome of a committed import
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub file: String,
    pub years: Option<YearRange>,
    pub grids: usize,
    pub records: usize,
    pub stats: AssemblyStats,
    pub batch: BatchSummary,
    pub elapsed: Duration,
}

/// Rolls the transaction back unless it was committed first
struct RollbackGuard<'a, S: GridStore> {
    transactions: &'a TransactionManager<S>,
    id: TransactionId,
}

impl<S: GridStore> Drop for RollbackGuard<'_, S> {
    fn drop(&mut self) {
        // No-op once committed, since commit closes the transaction
        self.transactions.rollback(self.id);
    }
}

/// Streams text files into a [`GridStore`], one transaction per file
pub struct Importer<S> {
    transactions: TransactionManager<S>,
    config: ImportConfig,
    progress: Option<ProgressCallback>,
}

impl<S: GridStore> Importer<S> {
    pub fn new(store: Arc<S>, config: ImportConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transactions: TransactionManager::new(store),
            config,
            progress: None,
        })
    }

    /// Report progress every `progress_interval` lines
    pub fn with_progress(mut self, callback: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn store(&self) -> &Arc<S> {
        self.transactions.store()
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn transactions(&self) -> &TransactionManager<S> {
        &self.transactions
    }

    /// Import a line stream under `file_name`, replacing any earlier import.
    pub async fn import<L>(
        &self,
        file_name: &str,
        lines: L,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary>
    where
        L: Stream<Item = io::Result<String>>,
    {
        let started = Instant::now();
        let id = self.transactions.begin();
        let _guard = RollbackGuard {
            transactions: &self.transactions,
            id,
        };
        info!("Importing '{}' in transaction {}", file_name, id);

        self.transactions.stage_delete_by_file(id, file_name)?;

        let mut assembler = DocumentAssembler::new(self.config.empty_rows);
        let mut grids = 0;
        let mut records = 0;

        let lines = lines.fuse();
        futures::pin_mut!(lines);
        loop {
            if cancel.is_cancelled() {
                return Err(interrupted(file_name));
            }
            let Some(line) = lines.next().await else {
                break;
            };

            match assembler.feed(&line?)? {
                Some(AssemblyEvent::YearsFound(years)) => {
                    let entry = FileEntry::new(file_name, &years)
                        .map_err(|e| e.at_line(assembler.stats().lines_read))?;
                    self.transactions.stage_insert_file(id, entry)?;
                }
                Some(AssemblyEvent::GridClosed(grid)) => {
                    grids += 1;
                    records += self.stage_grid(id, file_name, &grid, assembler.years())?;
                }
                None => {}
            }

            self.report_progress(assembler.stats().lines_read);
        }

        if let Some(grid) = assembler.finish()? {
            grids += 1;
            records += self.stage_grid(id, file_name, &grid, assembler.years())?;
        }

        let stats = assembler.stats().clone();
        if stats.lines_discarded > 0 {
            warn!(
                "Discarded {} unrecognised lines in '{}'",
                stats.lines_discarded, file_name
            );
        }

        let years = assembler.years();
        if years.is_none() {
            if self.config.require_years {
                return Err(GridError::MissingYears {
                    file: file_name.to_string(),
                });
            }
            warn!(
                "No Years header in '{}', committing removal of earlier records only",
                file_name
            );
        }

        if cancel.is_cancelled() {
            return Err(interrupted(file_name));
        }
        let batch = self.transactions.commit(id).await?;

        let summary = ImportSummary {
            file: file_name.to_string(),
            years,
            grids,
            records,
            stats,
            batch,
            elapsed: started.elapsed(),
        };
        info!(
            "Imported '{}': {} grids, {} records in {:?}",
            summary.file, summary.grids, summary.records, summary.elapsed
        );
        Ok(summary)
    }

    /// Import a file from disk, named after its file name unless `name` is set
    pub async fn import_path(
        &self,
        path: &Path,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary> {
        if !path.exists() {
            return Err(GridError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let file_name = match name {
            Some(name) => name.to_string(),
            None => logical_name(path)?,
        };
        let file = File::open(path).await?;
        debug!("Streaming {} as '{}'", path.display(), file_name);

        self.import(&file_name, line_stream(BufReader::new(file)), cancel)
            .await
    }

    fn stage_grid(
        &self,
        id: TransactionId,
        file_name: &str,
        grid: &Grid,
        years: Option<YearRange>,
    ) -> Result<usize> {
        let years = years.ok_or_else(|| GridError::MissingYears {
            file: file_name.to_string(),
        })?;
        let records: Vec<_> = grid.records(&years).collect();
        let count = records.len();
        debug!(
            "Staging grid {},{} with {} records",
            grid.x, grid.y, count
        );
        self.transactions.stage_insert_records(id, records, file_name)?;
        Ok(count)
    }

    fn report_progress(&self, lines_read: usize) {
        if let Some(callback) = &self.progress {
            if lines_read % self.config.progress_interval == 0 {
                callback(lines_read);
            }
        }
    }
}

fn interrupted(file_name: &str) -> GridError {
    GridError::Interrupted {
        reason: format!("import of '{}' was cancelled", file_name),
    }
}

/// Logical file name of a path: its final component
pub fn logical_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            GridError::configuration(format!("'{}' has no file name", path.display()))
        })
}

/// Lines of an async reader as a stream, without their line endings
pub fn line_stream<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(e), lines)),
        }
    })
}
