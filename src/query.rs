//! Paged reads of imported records.
//!
//! A [`QuerySession`] remembers the file name, page size and offset of its
//! last query, so callers pull one page at a time in insertion order.

use crate::error::{GridError, Result};
use crate::models::{Record, YearRange};
use crate::store::{FileSnapshot, GridStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Summary shown above each page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageHeader {
    pub file: String,
    /// `None` when nothing is stored under the file name
    pub years: Option<YearRange>,
    /// Records delivered by this query so far, this page included
    pub fetched: usize,
    /// Records stored for the file
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub header: PageHeader,
    pub records: Vec<Record>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone)]
struct ActiveQuery {
    file: String,
    limit: usize,
    offset: usize,
    total: usize,
}

/// Cursor over the records of one file at a time
#[derive(Debug)]
pub struct QuerySession<S> {
    store: Arc<S>,
    active: Option<ActiveQuery>,
}

impl<S: GridStore> QuerySession<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            active: None,
        }
    }

    /// Start a query and return its first page of at most `limit` records
    pub async fn fetch_by_file(&mut self, name: &str, limit: usize) -> Result<Page> {
        if limit == 0 {
            return Err(GridError::configuration("Page limit must be greater than 0"));
        }

        self.active = Some(ActiveQuery {
            file: name.to_string(),
            limit,
            offset: 0,
            total: 0,
        });
        self.fetch_next_page().await
    }

    /// Next page of the active query; empty once every record was returned
    pub async fn fetch_next_page(&mut self) -> Result<Page> {
        let query = self.active.as_mut().ok_or(GridError::NoActiveQuery)?;

        let FileSnapshot {
            entry,
            total,
            records,
        } = self
            .store
            .fetch_page(&query.file, query.offset, query.limit)
            .await?;

        query.offset += records.len();
        query.total = total;
        debug!(
            "Fetched {} records of '{}' ({}/{})",
            records.len(),
            query.file,
            query.offset,
            total
        );

        Ok(Page {
            header: PageHeader {
                file: query.file.clone(),
                years: entry.map(|e| e.years()),
                fetched: query.offset,
                total,
            },
            records,
        })
    }

    /// Whether the active query has records left
    pub fn has_more(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|query| query.offset < query.total)
    }

    /// Forget the active query
    pub fn reset(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileEntry, Grid, GridRef};
    use crate::store::{BatchSummary, MemoryStore, StagedOp};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store that lands a queued batch right after the next read returns
    struct CommitAfterRead {
        inner: MemoryStore,
        queued: Mutex<Option<Vec<StagedOp>>>,
    }

    impl CommitAfterRead {
        async fn land_queued(&self) {
            let queued = self.queued.lock().unwrap().take();
            if let Some(ops) = queued {
                self.inner.apply_batch(ops).await.unwrap();
            }
        }
    }

    #[async_trait]
    impl GridStore for CommitAfterRead {
        async fn apply_batch(&self, ops: Vec<StagedOp>) -> Result<BatchSummary> {
            self.inner.apply_batch(ops).await
        }

        async fn file_entry(&self, name: &str) -> Result<Option<FileEntry>> {
            let result = self.inner.file_entry(name).await;
            self.land_queued().await;
            result
        }

        async fn list_files(&self) -> Result<Vec<FileEntry>> {
            let result = self.inner.list_files().await;
            self.land_queued().await;
            result
        }

        async fn count_records(&self, name: &str) -> Result<usize> {
            let result = self.inner.count_records(name).await;
            self.land_queued().await;
            result
        }

        async fn fetch_records(
            &self,
            name: &str,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<Record>> {
            let result = self.inner.fetch_records(name, offset, limit).await;
            self.land_queued().await;
            result
        }

        async fn fetch_page(
            &self,
            name: &str,
            offset: usize,
            limit: usize,
        ) -> Result<FileSnapshot> {
            let result = self.inner.fetch_page(name, offset, limit).await;
            self.land_queued().await;
            result
        }
    }

    fn import_ops(years: YearRange, values: Vec<i64>) -> Vec<StagedOp> {
        let grid = Grid::with_rows(GridRef { x: 1, y: 2 }, vec![values]);
        vec![
            StagedOp::DeleteByFile("f".to_string()),
            StagedOp::InsertFile(FileEntry::new("f", &years).unwrap()),
            StagedOp::InsertRecords {
                file: "f".to_string(),
                records: grid.records(&years).collect(),
            },
        ]
    }

    async fn store_with(values: Vec<i64>) -> Arc<MemoryStore> {
        let years = YearRange::new(1958, 1960).unwrap();
        let grid = Grid::with_rows(GridRef { x: 1, y: 2 }, vec![values]);
        let store = Arc::new(MemoryStore::new());
        store
            .apply_batch(vec![
                StagedOp::InsertFile(FileEntry::new("f", &years).unwrap()),
                StagedOp::InsertRecords {
                    file: "f".to_string(),
                    records: grid.records(&years).collect(),
                },
            ])
            .await
            .unwrap();
        store
    }

    fn values(page: &Page) -> Vec<i64> {
        page.records.iter().map(|r| r.value).collect()
    }

    #[tokio::test]
    async fn test_pages_in_insertion_order() {
        let mut session = QuerySession::new(store_with(vec![1, 2, 3, 4, 5]).await);

        let first = session.fetch_by_file("f", 2).await.unwrap();
        assert_eq!(values(&first), vec![1, 2]);
        assert_eq!(first.header.total, 5);
        assert_eq!(first.header.fetched, 2);
        assert_eq!(first.header.years, Some(YearRange::new(1958, 1960).unwrap()));
        assert!(session.has_more());

        assert_eq!(values(&session.fetch_next_page().await.unwrap()), vec![3, 4]);
        let last = session.fetch_next_page().await.unwrap();
        assert_eq!(values(&last), vec![5]);
        assert_eq!(last.header.fetched, 5);
        assert!(!session.has_more());

        assert!(session.fetch_next_page().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_page_without_query() {
        let mut session = QuerySession::new(store_with(vec![1]).await);
        assert!(matches!(
            session.fetch_next_page().await,
            Err(GridError::NoActiveQuery)
        ));

        session.fetch_by_file("f", 1).await.unwrap();
        session.reset();
        assert!(matches!(
            session.fetch_next_page().await,
            Err(GridError::NoActiveQuery)
        ));
    }

    #[tokio::test]
    async fn test_new_query_restarts_offset() {
        let mut session = QuerySession::new(store_with(vec![1, 2, 3]).await);
        session.fetch_by_file("f", 2).await.unwrap();
        let again = session.fetch_by_file("f", 2).await.unwrap();
        assert_eq!(values(&again), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_file_gives_empty_page() {
        let mut session = QuerySession::new(store_with(vec![1]).await);
        let page = session.fetch_by_file("other", 10).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.header.years, None);
        assert_eq!(page.header.total, 0);
        assert!(!session.has_more());
    }

    #[tokio::test]
    async fn test_page_is_not_torn_by_concurrent_commit() {
        let old_years = YearRange::new(1958, 1960).unwrap();
        let new_years = YearRange::new(2000, 2000).unwrap();
        let inner = MemoryStore::new();
        inner
            .apply_batch(import_ops(old_years, vec![1, 2, 3, 4, 5]))
            .await
            .unwrap();
        let store = Arc::new(CommitAfterRead {
            inner,
            queued: Mutex::new(Some(import_ops(new_years, vec![9]))),
        });

        let mut session = QuerySession::new(store.clone());
        let page = session.fetch_by_file("f", 10).await.unwrap();
        assert_eq!(page.header.years, Some(old_years));
        assert_eq!(page.header.total, 5);
        assert_eq!(values(&page), vec![1, 2, 3, 4, 5]);

        let page = session.fetch_by_file("f", 10).await.unwrap();
        assert_eq!(page.header.years, Some(new_years));
        assert_eq!(page.header.total, 1);
        assert_eq!(values(&page), vec![9]);
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let mut session = QuerySession::new(store_with(vec![1]).await);
        assert!(matches!(
            session.fetch_by_file("f", 0).await,
            Err(GridError::Configuration { .. })
        ));
    }
}
