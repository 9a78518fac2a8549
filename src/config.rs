//! Configuration management and validation.
//!
//! Provides the import configuration: how lenient the assembler is with
//! data noise, how missing headers are treated, and how often progress is
//! reported.

use crate::constants::{DEFAULT_PROGRESS_INTERVAL, DEFAULT_STORE_DIR_NAME};
use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// What to do with data lines that contain no integers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyRowPolicy {
    /// Append an empty row. It yields no records but still advances the year.
    #[default]
    Keep,
    /// Drop the line as noise
    Skip,
}

/// Global configuration for grid imports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Handling of data lines without numbers
    pub empty_rows: EmptyRowPolicy,

    /// Fail an import whose stream never carried a `Years` header.
    ///
    /// When unset such an import commits only the delete, so the file is
    /// absent afterwards.
    pub require_years: bool,

    /// Lines between progress callbacks
    pub progress_interval: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            empty_rows: EmptyRowPolicy::Keep,
            require_years: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl ImportConfig {
    /// Set the empty row policy
    pub fn with_empty_rows(mut self, policy: EmptyRowPolicy) -> Self {
        self.empty_rows = policy;
        self
    }

    /// Reject streams without a `Years` header with `MissingYears`
    pub fn with_require_years(mut self) -> Self {
        self.require_years = true;
        self
    }

    /// Set the number of lines between progress callbacks
    pub fn with_progress_interval(mut self, lines: usize) -> Self {
        self.progress_interval = lines;
        self
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval == 0 {
            return Err(GridError::configuration(
                "Progress interval must be greater than 0",
            ));
        }
        debug!("Validated import configuration: {:?}", self);
        Ok(())
    }
}

/// Default location of the Parquet store: `<data dir>/precip-grid/store`
pub fn default_store_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| GridError::configuration("Could not determine user data directory"))?;
    Ok(data_dir.join(DEFAULT_STORE_DIR_NAME).join("store"))
}
