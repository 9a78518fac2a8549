//! Command implementations for the precip-grid CLI
//!
//! Each subcommand opens the Parquet store, runs against the library API and
//! prints its results. Errors are wrapped with context for `main` to report.

use crate::cli::args::{Args, Commands, ExportArgs, ImportArgs, OutputFormat, ShowArgs};
use crate::config::default_store_path;
use crate::error::GridError;
use crate::export::export_file;
use crate::importer::{ImportSummary, Importer};
use crate::models::Record;
use crate::query::{Page, QuerySession};
use crate::store::{GridStore, ParquetStore};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use colored::*;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Main command runner
pub async fn run(args: Args, cancel: CancellationToken) -> Result<()> {
    setup_logging(&args);
    debug!("Command line arguments: {:?}", args);

    let Some(command) = args.command.clone() else {
        bail!("No command given; run with --help for usage");
    };

    let store_path = match &args.store {
        Some(path) => path.clone(),
        None => default_store_path()?,
    };
    let store = Arc::new(
        ParquetStore::open(&store_path)
            .await
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
    );

    match command {
        Commands::Import(import_args) => run_import(&args, import_args, store, &cancel).await,
        Commands::Show(show_args) => run_show(show_args, store).await,
        Commands::List => run_list(store).await,
        Commands::Export(export_args) => run_export(&args, export_args, store).await,
    }
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("precip_grid={}", log_level)));

    // try_init: a subscriber may already be installed when run from tests
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(io::stderr),
        )
        .try_init();

    debug!("Logging initialized at level: {}", log_level);
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Expand glob patterns, keeping plain paths as given
fn resolve_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
            continue;
        }

        let before = paths.len();
        let matches =
            glob::glob(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?;
        for entry in matches {
            let path = entry.with_context(|| format!("Failed to read a match of '{}'", pattern))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.len() == before {
            bail!("Pattern '{}' matched no files", pattern);
        }
    }
    Ok(paths)
}

async fn run_import(
    args: &Args,
    import_args: ImportArgs,
    store: Arc<ParquetStore>,
    cancel: &CancellationToken,
) -> Result<()> {
    let start_time = Instant::now();
    let paths = resolve_paths(&import_args.paths)?;
    if import_args.name.is_some() && paths.len() > 1 {
        bail!(
            "--name can only be used with a single file, got {}",
            paths.len()
        );
    }

    let spinner = args.show_progress().then(|| create_spinner("Starting import..."));
    let mut importer = Importer::new(store, import_args.import_config())?;
    if let Some(pb) = &spinner {
        let pb = pb.clone();
        importer =
            importer.with_progress(move |lines| pb.set_message(format!("{} lines read", lines)));
    }

    info!("Importing {} files", paths.len());
    let mut summaries = Vec::with_capacity(paths.len());
    let mut failures = 0;

    for path in &paths {
        if let Some(pb) = &spinner {
            pb.set_message(format!("Importing {}", path.display()));
        }

        match importer
            .import_path(path, import_args.name.as_deref(), cancel)
            .await
        {
            Ok(summary) => {
                if let Some(pb) = &spinner {
                    pb.println(format_summary(&summary));
                }
                summaries.push(summary);
            }
            Err(e @ GridError::Interrupted { .. }) => {
                if let Some(pb) = &spinner {
                    pb.finish_and_clear();
                }
                return Err(e.into());
            }
            Err(e) => {
                error!("Failed to import {}: {}", path.display(), e);
                if let Some(pb) = &spinner {
                    pb.println(format_failure(path, &e));
                }
                failures += 1;
            }
        }
    }

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
        let records: usize = summaries.iter().map(|s| s.records).sum();
        println!(
            "{} Imported {} of {} files ({} records) in {}",
            "Done:".bright_green().bold(),
            summaries.len(),
            paths.len(),
            records,
            HumanDuration(start_time.elapsed())
        );
    }

    if failures > 0 {
        bail!("{} of {} files failed to import", failures, paths.len());
    }
    Ok(())
}

fn format_summary(summary: &ImportSummary) -> String {
    let years = summary
        .years
        .map(|y| format!("{}, {} years", y, y.span()))
        .unwrap_or_else(|| "no years".to_string());
    format!(
        "{} {} [{}] {} grids, {} records ({} replaced)",
        "✓".bright_green().bold(),
        summary.file.bright_cyan(),
        years,
        summary.grids,
        summary.records,
        summary.batch.deleted_records
    )
}

fn format_failure(path: &Path, error: &GridError) -> String {
    let kind = if error.is_parse_error() {
        "malformed input"
    } else {
        "failed"
    };
    format!(
        "{} {} ({}): {}",
        "✗".bright_red().bold(),
        path.display(),
        kind,
        error
    )
}

/// Flat record row for machine-readable output
#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    file: &'a str,
    xref: i64,
    yref: i64,
    day: u32,
    month: u32,
    year: i32,
    /// ISO date; empty for months outside 1..=12
    date: Option<NaiveDate>,
    value: i64,
}

impl<'a> RecordRow<'a> {
    fn new(file: &'a str, record: &Record) -> Self {
        Self {
            file,
            xref: record.xref,
            yref: record.yref,
            day: record.date.day,
            month: record.date.month,
            year: record.date.year,
            date: record.date.to_naive_date(),
            value: record.value,
        }
    }
}

async fn run_show(show_args: ShowArgs, store: Arc<ParquetStore>) -> Result<()> {
    let mut session = QuerySession::new(store);
    let mut page = session.fetch_by_file(&show_args.name, show_args.limit).await?;
    if page.header.years.is_none() {
        bail!(GridError::UnknownFile {
            name: show_args.name.clone()
        });
    }

    let mut out = io::stdout();
    let mut csv_writer = match show_args.format {
        OutputFormat::Csv => Some(csv::Writer::from_writer(io::stdout())),
        _ => None,
    };

    if show_args.format == OutputFormat::Human {
        let years = page.header.years.map(|y| y.to_string()).unwrap_or_default();
        writeln!(
            out,
            "{} {}  {} {}  {} {}",
            "File:".bold(),
            page.header.file.bright_cyan(),
            "Years:".bold(),
            years,
            "Records:".bold(),
            page.header.total
        )?;
    }

    let mut shown = 0;
    loop {
        match (&show_args.format, csv_writer.as_mut()) {
            (_, Some(writer)) => {
                for record in &page.records {
                    writer.serialize(RecordRow::new(&page.header.file, record))?;
                }
                writer.flush()?;
            }
            (OutputFormat::JsonLines, None) => {
                for record in &page.records {
                    let row = RecordRow::new(&page.header.file, record);
                    writeln!(out, "{}", serde_json::to_string(&row)?)?;
                }
            }
            _ => write_human_page(&mut out, &page)?,
        }

        shown += 1;
        if !session.has_more() || show_args.pages.is_some_and(|limit| shown >= limit) {
            break;
        }
        page = session.fetch_next_page().await?;
    }

    Ok(())
}

fn write_human_page(out: &mut impl Write, page: &Page) -> Result<()> {
    writeln!(
        out,
        "{}",
        format!(
            "{:>8} {:>8} {:>12} {:>10}",
            "xref", "yref", "date", "value"
        )
        .bright_black()
    )?;
    for record in &page.records {
        writeln!(
            out,
            "{:>8} {:>8} {:>12} {:>10}",
            record.xref,
            record.yref,
            record.date.to_string(),
            record.value
        )?;
    }
    writeln!(
        out,
        "{}",
        format!("-- {}/{} records --", page.header.fetched, page.header.total).bright_black()
    )?;
    Ok(())
}

async fn run_list(store: Arc<ParquetStore>) -> Result<()> {
    let files = store.list_files().await?;
    if files.is_empty() {
        println!("{}", "No files imported yet".bright_black());
        return Ok(());
    }

    println!("{}", "Imported files:".bright_green().bold());
    for entry in files {
        let count = store.count_records(&entry.name).await?;
        println!(
            "  {} {} {}",
            entry.name.bright_cyan(),
            entry.years(),
            format!("({} records)", count).bright_black()
        );
    }
    Ok(())
}

async fn run_export(args: &Args, export_args: ExportArgs, store: Arc<ParquetStore>) -> Result<()> {
    let rows = export_file(store.as_ref(), &export_args.name, &export_args.output)
        .await
        .with_context(|| {
            format!(
                "Failed to export '{}' to {}",
                export_args.name,
                export_args.output.display()
            )
        })?;

    if args.show_progress() {
        println!(
            "{} Wrote {} records of {} to {}",
            "Done:".bright_green().bold(),
            rows,
            export_args.name.bright_cyan(),
            export_args.output.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn write_grid_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "[Years=1958-1960]\nGrid-ref= 1, 2\n10 20 30\n").unwrap();
        path
    }

    #[test]
    fn test_resolve_paths_expands_globs() {
        let temp_dir = TempDir::new().unwrap();
        write_grid_file(&temp_dir, "a.pre");
        write_grid_file(&temp_dir, "b.pre");
        std::fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();

        let pattern = temp_dir.path().join("*.pre").to_string_lossy().into_owned();
        let paths = resolve_paths(&[pattern]).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.extension().is_some_and(|e| e == "pre")));
    }

    #[test]
    fn test_resolve_paths_keeps_plain_paths() {
        let paths = resolve_paths(&["missing.pre".to_string()]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("missing.pre")]);
    }

    #[test]
    fn test_resolve_paths_empty_glob_fails() {
        let temp_dir = TempDir::new().unwrap();
        let pattern = temp_dir.path().join("*.none").to_string_lossy().into_owned();
        assert!(resolve_paths(&[pattern]).is_err());
    }

    #[test]
    fn test_record_row_carries_iso_date() {
        let record = Record {
            xref: 1,
            yref: 148,
            date: crate::models::RecordDate::new(3, 1958),
            value: 2880,
        };
        let json = serde_json::to_string(&RecordRow::new("cru.pre", &record)).unwrap();
        assert!(json.contains(r#""date":"1958-03-01""#));

        let odd = Record {
            date: crate::models::RecordDate::new(13, 1958),
            ..record
        };
        let json = serde_json::to_string(&RecordRow::new("cru.pre", &odd)).unwrap();
        assert!(json.contains(r#""date":null"#));
    }

    #[test]
    fn test_format_failure_marks_malformed_input() {
        colored::control::set_override(false);
        let path = Path::new("bad.pre");

        let parse = GridError::invalid_grid_ref("Grid-ref=").at_line(3);
        assert!(format_failure(path, &parse).contains("(malformed input)"));

        let missing = GridError::FileNotFound {
            path: PathBuf::from("bad.pre"),
        };
        assert!(format_failure(path, &missing).contains("(failed)"));
    }

    #[test]
    fn test_format_summary_shows_year_span() {
        colored::control::set_override(false);
        let summary = ImportSummary {
            file: "cru.pre".to_string(),
            years: Some(crate::models::YearRange::new(1991, 2000).unwrap()),
            grids: 2,
            records: 48,
            stats: Default::default(),
            batch: Default::default(),
            elapsed: Duration::ZERO,
        };
        assert!(format_summary(&summary).contains("[1991-2000, 10 years]"));
    }

    #[tokio::test]
    async fn test_import_then_export() {
        let temp_dir = TempDir::new().unwrap();
        let input = write_grid_file(&temp_dir, "a.pre");
        let store_dir = temp_dir.path().join("store");
        let output = temp_dir.path().join("a.parquet");

        let import = Args::parse_from([
            "precip-grid",
            "-q",
            "--store",
            store_dir.to_str().unwrap(),
            "import",
            input.to_str().unwrap(),
        ]);
        run(import, CancellationToken::new()).await.unwrap();

        let export = Args::parse_from([
            "precip-grid",
            "-q",
            "--store",
            store_dir.to_str().unwrap(),
            "export",
            "a.pre",
            "--output",
            output.to_str().unwrap(),
        ]);
        run(export, CancellationToken::new()).await.unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_failed_import_reports_error() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("store");
        let input = temp_dir.path().join("broken.pre");
        std::fs::write(&input, "[Years=1958-1960]\nGrid-ref=\n").unwrap();

        let args = Args::parse_from([
            "precip-grid",
            "-q",
            "--store",
            store_dir.to_str().unwrap(),
            "import",
            input.to_str().unwrap(),
        ]);
        assert!(run(args, CancellationToken::new()).await.is_err());

        let store = ParquetStore::open(&store_dir).await.unwrap();
        assert!(store.list_files().await.unwrap().is_empty());
    }
}
