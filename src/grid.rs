//! Grid reference and data row parsing.

use crate::constants::{GRID_REF_KEY, GRID_REF_SKIP, ROW_SKIP};
use crate::error::{GridError, Result};
use crate::models::GridRef;
use crate::scanner::LineScanner;

/// Parse a `Grid-ref= x, y` line.
///
/// Returns `Ok(None)` when the line is not a grid reference at all, and
/// `InvalidGridRef` when it is one but lacks either coordinate.
pub fn parse_grid_ref(line: &str) -> Result<Option<GridRef>> {
    let Some(rest) = line.trim_start().strip_prefix(GRID_REF_KEY) else {
        return Ok(None);
    };
    let Some(coordinates) = rest.trim_start().strip_prefix('=') else {
        return Ok(None);
    };

    let scanner = LineScanner::with_skip(coordinates, GRID_REF_SKIP);
    let mut values = scanner.integers();

    match (values.next(), values.next()) {
        (Some(x), Some(y)) => Ok(Some(GridRef { x, y })),
        _ => Err(GridError::invalid_grid_ref(line)),
    }
}

/// Integers of a data row in arrival order. A line without numbers gives an empty row.
pub fn parse_row(line: &str) -> Vec<i64> {
    LineScanner::with_skip(line, ROW_SKIP).integers().collect()
}
