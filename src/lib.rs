//! Precipitation grid importer library
//!
//! A Rust library for streaming gridded precipitation text files into a
//! store keyed by logical file name, and reading the result back page by page.
//!
//! This library provides tools for:
//! - Scanning integers and delimited fields out of free-form text lines
//! - Parsing `[Key=Value]` header groups and the `Years` range
//! - Assembling `Grid-ref` blocks of monthly values with an explicit state machine
//! - Flattening grids into dated records
//! - Staging, committing and rolling back imports as one unit
//! - Paginated queries and Parquet export of imported files
//!
//! ```
//! use precip_grid::parse_document;
//!
//! let document = parse_document([
//!     "[Years=1958-1960]",
//!     "Grid-ref= 1, 2",
//!     "10 20 30",
//! ])
//! .unwrap();
//! assert_eq!(document.record_count(), 3);
//! ```

pub mod assembler;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod grid;
pub mod header;
pub mod importer;
pub mod models;
pub mod query;
pub mod scanner;
pub mod store;
pub mod transaction;

// Re-export commonly used types
pub use assembler::{AssemblyEvent, AssemblyStats, DocumentAssembler, parse_document};
pub use config::{EmptyRowPolicy, ImportConfig};
pub use error::{GridError, Result};
pub use export::export_file;
pub use importer::{ImportSummary, Importer, line_stream};
pub use models::{Document, FileEntry, Grid, GridRef, Record, RecordDate, YearRange};
pub use query::{Page, PageHeader, QuerySession};
pub use store::{BatchSummary, FileSnapshot, GridStore, MemoryStore, ParquetStore, StagedOp};
pub use transaction::{TransactionId, TransactionManager};
