//! Document assembly over a line stream.
//!
//! [`DocumentAssembler`] is an explicit state machine fed one line at a time.
//! It never looks back at earlier lines: the only carried state is the year
//! range, the header fields seen so far and the grid currently receiving
//! rows. Closed grids are handed to the caller as [`AssemblyEvent`]s, so an
//! importer can stage them without holding the whole document.
//!
//! ```text
//! AwaitingYears --[Years=..]--> NoOpenGrid --Grid-ref--> GridOpen --end--> Done
//!                                                 ^            |
//!                                                 +--Grid-ref--+
//! ```

use crate::config::EmptyRowPolicy;
use crate::error::{GridError, Result};
use crate::grid::{parse_grid_ref, parse_row};
use crate::header::parse_header_fields;
use crate::models::{Document, Grid, YearRange};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Something the caller has to act on after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyEvent {
    /// The `Years` header was found; emitted once
    YearsFound(YearRange),
    /// A grid received its last row
    GridClosed(Grid),
}

#[derive(Debug)]
enum AssemblerState {
    AwaitingYears,
    NoOpenGrid,
    GridOpen(Grid),
    Done,
}

impl AssemblerState {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingYears => "awaiting-years",
            Self::NoOpenGrid => "no-open-grid",
            Self::GridOpen(_) => "grid-open",
            Self::Done => "done",
        }
    }
}

/// Line counts collected while assembling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    pub lines_read: usize,
    pub lines_discarded: usize,
    pub grids: usize,
    pub rows: usize,
    pub empty_rows: usize,
}

/// Incremental parser turning text lines into a year range and grids
#[derive(Debug)]
pub struct DocumentAssembler {
    state: AssemblerState,
    years: Option<YearRange>,
    header: BTreeMap<String, String>,
    empty_rows: EmptyRowPolicy,
    stats: AssemblyStats,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new(EmptyRowPolicy::default())
    }
}

impl DocumentAssembler {
    pub fn new(empty_rows: EmptyRowPolicy) -> Self {
        Self {
            state: AssemblerState::AwaitingYears,
            years: None,
            header: BTreeMap::new(),
            empty_rows,
            stats: AssemblyStats::default(),
        }
    }

    pub fn years(&self) -> Option<YearRange> {
        self.years
    }

    /// Header fields seen up to and including the `Years` line
    pub fn header(&self) -> &BTreeMap<String, String> {
        &self.header
    }

    pub fn stats(&self) -> &AssemblyStats {
        &self.stats
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, AssemblerState::Done)
    }

    /// Process the next line.
    ///
    /// A malformed `Years` value or grid reference is fatal: the error carries
    /// the 1-based line number and the assembler is finished afterwards.
    pub fn feed(&mut self, line: &str) -> Result<Option<AssemblyEvent>> {
        self.stats.lines_read += 1;
        let line_number = self.stats.lines_read;

        let state = std::mem::replace(&mut self.state, AssemblerState::Done);
        let (next, event) = self
            .step(state, line)
            .map_err(|e| e.at_line(line_number))?;
        self.state = next;

        Ok(event)
    }

    /// Close the open grid, if any, and finish the document
    pub fn finish(&mut self) -> Result<Option<Grid>> {
        let state = std::mem::replace(&mut self.state, AssemblerState::Done);
        debug!(
            "Assembler finished in state {}: {:?}",
            state.name(),
            self.stats
        );

        match state {
            AssemblerState::GridOpen(grid) => Ok(Some(grid)),
            AssemblerState::AwaitingYears | AssemblerState::NoOpenGrid => Ok(None),
            AssemblerState::Done => Err(GridError::AssemblerFinished),
        }
    }

    fn step(
        &mut self,
        state: AssemblerState,
        line: &str,
    ) -> Result<(AssemblerState, Option<AssemblyEvent>)> {
        match state {
            AssemblerState::Done => Err(GridError::AssemblerFinished),
            AssemblerState::AwaitingYears => self.step_header(line),
            AssemblerState::NoOpenGrid => match parse_grid_ref(line)? {
                Some(grid_ref) => {
                    self.stats.grids += 1;
                    debug!("Opening grid {},{}", grid_ref.x, grid_ref.y);
                    Ok((AssemblerState::GridOpen(Grid::new(grid_ref)), None))
                }
                None => {
                    self.stats.lines_discarded += 1;
                    Ok((AssemblerState::NoOpenGrid, None))
                }
            },
            AssemblerState::GridOpen(mut grid) => match parse_grid_ref(line)? {
                Some(grid_ref) => {
                    self.stats.grids += 1;
                    debug!("Opening grid {},{}", grid_ref.x, grid_ref.y);
                    Ok((
                        AssemblerState::GridOpen(Grid::new(grid_ref)),
                        Some(AssemblyEvent::GridClosed(grid)),
                    ))
                }
                None => {
                    let row = parse_row(line);
                    if row.is_empty() {
                        self.stats.empty_rows += 1;
                        if self.empty_rows == EmptyRowPolicy::Skip {
                            self.stats.lines_discarded += 1;
                            return Ok((AssemblerState::GridOpen(grid), None));
                        }
                    }
                    self.stats.rows += 1;
                    grid.push_row(row);
                    Ok((AssemblerState::GridOpen(grid), None))
                }
            },
        }
    }

    fn step_header(&mut self, line: &str) -> Result<(AssemblerState, Option<AssemblyEvent>)> {
        let fields = parse_header_fields(line);
        if fields.is_empty() {
            self.stats.lines_discarded += 1;
            return Ok((AssemblerState::AwaitingYears, None));
        }

        let years = fields.years()?;
        for (key, value) in fields.iter() {
            debug!("Header field {} = {}", key, value);
        }
        self.header.extend(fields.into_map());

        match years {
            Some(years) => {
                debug!("Found year range {}", years);
                self.years = Some(years);
                Ok((
                    AssemblerState::NoOpenGrid,
                    Some(AssemblyEvent::YearsFound(years)),
                ))
            }
            None => Ok((AssemblerState::AwaitingYears, None)),
        }
    }
}

/// Assemble a whole document in memory with the default empty row policy
pub fn parse_document<I, L>(lines: I) -> Result<Document>
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    parse_document_with(lines, EmptyRowPolicy::default())
}

/// Assemble a whole document in memory
pub fn parse_document_with<I, L>(lines: I, empty_rows: EmptyRowPolicy) -> Result<Document>
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    let mut assembler = DocumentAssembler::new(empty_rows);
    let mut grids = Vec::new();

    for line in lines {
        if let Some(AssemblyEvent::GridClosed(grid)) = assembler.feed(line.as_ref())? {
            grids.push(grid);
        }
    }
    if let Some(grid) = assembler.finish()? {
        grids.push(grid);
    }

    Ok(Document {
        years: assembler.years(),
        header: assembler.header().clone(),
        grids,
    })
}
