//! Format literals and defaults for the precipitation grid importer
//!
//! This module holds the literals of the text format (header brackets,
//! grid-ref marker, separator sets) and the default values used by the
//! configuration, the stores and the CLI.

// =============================================================================
// Text Format
// =============================================================================

/// Opening bracket of a `[Key=Value]` header group
pub const HEADER_GROUP_OPEN: char = '[';

/// Closing bracket of a `[Key=Value]` header group
pub const HEADER_GROUP_CLOSE: char = ']';

/// Separator between key and value inside a header group
pub const HEADER_KEY_VALUE_SEPARATOR: char = '=';

/// Header key holding the year range of the document
pub const YEARS_KEY: &str = "Years";

/// Characters skipped while scanning the two years out of a `Years` value
pub const YEARS_SKIP: &[char] = &['=', '-', ' '];

/// Literal key that opens a new grid
pub const GRID_REF_KEY: &str = "Grid-ref";

/// Characters skipped while scanning the coordinates of a grid-ref line
pub const GRID_REF_SKIP: &[char] = &['=', ',', ' '];

/// Characters skipped while scanning a data row
pub const ROW_SKIP: &[char] = &[' ', '\t'];

/// Day of month assigned to every record (values are monthly)
pub const RECORD_DAY: u32 = 1;

// =============================================================================
// Defaults
// =============================================================================

/// Records per page when no limit is given
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Lines between progress callbacks during an import
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10_000;

/// Directory under the user data directory holding the default store
pub const DEFAULT_STORE_DIR_NAME: &str = "precip-grid";

// =============================================================================
// Parquet Store Layout
// =============================================================================

/// File holding one row per imported file entry
pub const FILES_TABLE: &str = "files.parquet";

/// File holding one row per record
pub const RECORDS_TABLE: &str = "records.parquet";

/// Suffix of the temporary files written before a commit renames them
pub const PENDING_SUFFIX: &str = "pending";

/// Column names shared by the Parquet store and the export
pub mod columns {
    pub const FILE: &str = "file";
    pub const NAME: &str = "name";
    pub const FROM_YEAR: &str = "from_year";
    pub const TO_YEAR: &str = "to_year";
    pub const XREF: &str = "xref";
    pub const YREF: &str = "yref";
    pub const DAY: &str = "day";
    pub const MONTH: &str = "month";
    pub const YEAR: &str = "year";
    pub const VALUE: &str = "value";
}
