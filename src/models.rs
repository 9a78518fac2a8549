//! Core data structures for precipitation grid processing.
//!
//! Defines the parsed document (year range and grids), the flattened
//! records written to the store, and the per-file entry that keys an import.

use crate::constants::RECORD_DAY;
use crate::error::{GridError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Inclusive range of years covered by a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    from: i32,
    to: i32,
}

impl YearRange {
    /// Create a range, rejecting `from > to`
    pub fn new(from: i32, to: i32) -> Result<Self> {
        if from > to {
            return Err(GridError::parse_years(
                format!("{from}-{to}"),
                "first year is after last year",
            ));
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> i32 {
        self.from
    }

    pub fn to(&self) -> i32 {
        self.to
    }

    /// Number of years in the range
    pub fn span(&self) -> usize {
        (self.to - self.from) as usize + 1
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Coordinates carried by a `Grid-ref` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRef {
    pub x: i64,
    pub y: i64,
}

/// One spatial grid: a grid reference and its rows of monthly values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub x: i64,
    pub y: i64,
    rows: Vec<Vec<i64>>,
}

impl Grid {
    pub fn new(grid_ref: GridRef) -> Self {
        Self::with_rows(grid_ref, Vec::new())
    }

    pub fn with_rows(grid_ref: GridRef, rows: Vec<Vec<i64>>) -> Self {
        Self {
            x: grid_ref.x,
            y: grid_ref.y,
            rows,
        }
    }

    pub fn grid_ref(&self) -> GridRef {
        GridRef {
            x: self.x,
            y: self.y,
        }
    }

    pub fn rows(&self) -> &[Vec<i64>] {
        &self.rows
    }

    pub fn push_row(&mut self, row: Vec<i64>) {
        self.rows.push(row);
    }

    /// Number of scalar values across all rows
    pub fn value_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Flatten into records in row, then column order.
    ///
    /// Row `r` maps to year `years.from() + r` and column `c` to month `c + 1`.
    pub fn records(&self, years: &YearRange) -> impl Iterator<Item = Record> + '_ + use<'_> {
        let from = years.from();
        self.rows.iter().enumerate().flat_map(move |(r, row)| {
            row.iter().enumerate().map(move |(c, &value)| Record {
                xref: self.x,
                yref: self.y,
                date: RecordDate::new(c as u32 + 1, from + r as i32),
                value,
            })
        })
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid-ref= {},{}", self.x, self.y)?;
        for row in &self.rows {
            writeln!(f)?;
            let cells: Vec<String> = row.iter().map(i64::to_string).collect();
            write!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

/// A parsed document: the header fields, year range and grids in source order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// `None` when the stream ended before a `Years` header
    pub years: Option<YearRange>,
    pub header: BTreeMap<String, String>,
    pub grids: Vec<Grid>,
}

impl Document {
    /// All records of the document in grid, row, column order
    pub fn records(&self) -> Vec<Record> {
        match &self.years {
            Some(years) => self.grids.iter().flat_map(|g| g.records(years)).collect(),
            None => Vec::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.grids.iter().map(Grid::value_count).sum()
    }
}

/// Monthly date of a record. Always the first day of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl RecordDate {
    pub fn new(month: u32, year: i32) -> Self {
        Self {
            day: RECORD_DAY,
            month,
            year,
        }
    }

    /// Calendar date, or `None` when the month is outside 1..=12
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

impl fmt::Display for RecordDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.day, self.month, self.year)
    }
}

/// One flattened value: location, date and reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub xref: i64,
    pub yref: i64,
    pub date: RecordDate,
    pub value: i64,
}

/// Stored description of one imported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub from_year: i16,
    pub to_year: i16,
}

impl FileEntry {
    /// Build the entry for `name`, failing if the years do not fit in `i16`
    pub fn new(name: impl Into<String>, years: &YearRange) -> Result<Self> {
        let narrow = |year: i32| {
            i16::try_from(year).map_err(|_| {
                GridError::parse_years(years.to_string(), format!("year {year} out of range"))
            })
        };

        Ok(Self {
            name: name.into(),
            from_year: narrow(years.from())?,
            to_year: narrow(years.to())?,
        })
    }

    pub fn years(&self) -> YearRange {
        YearRange {
            from: i32::from(self.from_year),
            to: i32::from(self.to_year),
        }
    }
}

/// Rebuild grids from records by `(xref, yref)`, in first-appearance order.
///
/// Each record lands at row `year - from_year` and column `month - 1`. Empty
/// rows have no records, so documents containing them do not survive the
/// round trip.
pub fn regroup(records: &[Record], from_year: i32) -> Vec<Grid> {
    let mut order: Vec<GridRef> = Vec::new();
    let mut cells: HashMap<GridRef, Vec<Vec<i64>>> = HashMap::new();

    for record in records {
        let key = GridRef {
            x: record.xref,
            y: record.yref,
        };
        let rows = cells.entry(key).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });

        let row_index = (record.date.year - from_year).max(0) as usize;
        let column = record.date.month.saturating_sub(1) as usize;

        if rows.len() <= row_index {
            rows.resize_with(row_index + 1, Vec::new);
        }
        let row = &mut rows[row_index];
        if row.len() <= column {
            row.resize(column + 1, 0);
        }
        row[column] = record.value;
    }

    order
        .into_iter()
        .map(|key| Grid::with_rows(key, cells.remove(&key).unwrap_or_default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn years() -> YearRange {
        YearRange::new(1958, 1960).unwrap()
    }

    #[test]
    fn test_year_range_rejects_reversed() {
        assert!(YearRange::new(1960, 1958).is_err());
        let range = years();
        assert_eq!(range.span(), 3);
        assert_eq!(range.to_string(), "1958-1960");
    }

    #[test]
    fn test_grid_records_derive_year_and_month() {
        let grid = Grid::with_rows(GridRef { x: 1, y: 2 }, vec![vec![10, 20, 30], vec![40]]);
        let records: Vec<Record> = grid.records(&years()).collect();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].date, RecordDate::new(1, 1958));
        assert_eq!(records[2].date, RecordDate::new(3, 1958));
        assert_eq!(records[2].value, 30);
        assert_eq!(records[3].date, RecordDate::new(1, 1959));
        assert!(records.iter().all(|r| r.xref == 1 && r.yref == 2));
    }

    #[test]
    fn test_empty_row_still_advances_year() {
        let grid = Grid::with_rows(GridRef { x: 0, y: 0 }, vec![vec![1], vec![], vec![3]]);
        let records: Vec<Record> = grid.records(&years()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].date.year, 1960);
    }

    #[test]
    fn test_record_date_display_and_chrono() {
        let date = RecordDate::new(3, 1958);
        assert_eq!(date.to_string(), "1/3/1958");
        assert_eq!(date.to_naive_date(), NaiveDate::from_ymd_opt(1958, 3, 1));
        assert_eq!(RecordDate::new(13, 1958).to_naive_date(), None);
    }

    #[test]
    fn test_file_entry_year_bounds() {
        let entry = FileEntry::new("cru.pre", &years()).unwrap();
        assert_eq!(entry.from_year, 1958);
        assert_eq!(entry.to_year, 1960);
        assert_eq!(entry.years(), years());

        let too_big = YearRange::new(1990, 40_000).unwrap();
        assert!(matches!(
            FileEntry::new("big", &too_big),
            Err(GridError::ParseYears { .. })
        ));
    }

    #[test]
    fn test_regroup_reconstructs_grids() {
        let grids = vec![
            Grid::with_rows(GridRef { x: 1, y: 2 }, vec![vec![10, 20, 30], vec![1, 2, 3]]),
            Grid::with_rows(GridRef { x: 3, y: 4 }, vec![vec![40, 50]]),
        ];
        let records: Vec<Record> = grids.iter().flat_map(|g| g.records(&years())).collect();

        assert_eq!(regroup(&records, 1958), grids);
    }

    #[test]
    fn test_grid_display() {
        let grid = Grid::with_rows(GridRef { x: 1, y: 2 }, vec![vec![10, 20]]);
        assert_eq!(grid.to_string(), "Grid-ref= 1,2\n10 20");
    }
}
