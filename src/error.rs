//! Error handling for grid parsing, import transactions and queries.
//!
//! Structural problems in the input (a broken `Years` header or grid
//! reference) are fatal to the import that hit them. Storage failures and
//! misuse of the transaction or query APIs have their own variants so callers
//! can tell them apart.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Invalid Years header at line {line_number}: '{value}' ({reason})")]
    ParseYears {
        line_number: usize,
        value: String,
        reason: String,
    },

    #[error("Invalid grid reference at line {line_number}: '{line}'")]
    InvalidGridRef { line_number: usize, line: String },

    #[error("No Years header found in '{file}'")]
    MissingYears { file: String },

    #[error("Transaction not found: {id}")]
    TransactionNotFound { id: String },

    #[error("Batch insert failed: {reason}")]
    BatchInsertFailed { reason: String },

    #[error("No imported file named '{name}'")]
    UnknownFile { name: String },

    #[error("Store at {path} is corrupt: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("No active query; call fetch_by_file first")]
    NoActiveQuery,

    #[error("Document assembler already finished")]
    AssemblerFinished,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Import interrupted: {reason}")]
    Interrupted { reason: String },
}

impl GridError {
    pub(crate) fn parse_years(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseYears {
            line_number: 0,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_grid_ref(line: impl Into<String>) -> Self {
        Self::InvalidGridRef {
            line_number: 0,
            line: line.into(),
        }
    }

    pub fn batch_insert_failed(reason: impl Into<String>) -> Self {
        Self::BatchInsertFailed {
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Attach a 1-based source line number to a parse error.
    ///
    /// Other variants are returned unchanged.
    pub fn at_line(self, number: usize) -> Self {
        match self {
            Self::ParseYears { value, reason, .. } => Self::ParseYears {
                line_number: number,
                value,
                reason,
            },
            Self::InvalidGridRef { line, .. } => Self::InvalidGridRef {
                line_number: number,
                line,
            },
            other => other,
        }
    }

    /// Whether the error came from the input text rather than storage or I/O
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::ParseYears { .. } | Self::InvalidGridRef { .. })
    }
}

pub type Result<T> = std::result::Result<T, GridError>;
