//! Parquet export of one imported file.

use crate::error::{GridError, Result};
use crate::store::parquet::{records_frame, write_frame};
use crate::store::{FileSnapshot, GridStore};
use std::io;
use std::path::Path;
use tokio::task;
use tracing::info;

/// Write every record of `name` to a Parquet file at `path`.
///
/// Columns are `xref, yref, day, month, year, value`, rows in insertion
/// order, all read from one state of the store. Returns the number of rows
/// written.
pub async fn export_file<S: GridStore + ?Sized>(
    store: &S,
    name: &str,
    path: &Path,
) -> Result<usize> {
    let FileSnapshot { entry, records, .. } = store.fetch_page(name, 0, usize::MAX).await?;
    if entry.is_none() {
        return Err(GridError::UnknownFile {
            name: name.to_string(),
        });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let rows = records.len();
    task::spawn_blocking({
        let path = path.to_path_buf();
        move || {
            let mut frame = records_frame(&records, None)?;
            write_frame(&path, &mut frame)
        }
    })
    .await
    .map_err(io::Error::from)??;

    info!("Exported {} records of '{}' to {}", rows, name, path.display());
    Ok(rows)
}
