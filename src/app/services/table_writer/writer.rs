//! Low-level file output for mart tables and reports
//!
//! All writes go through a temporary sibling file that is renamed into
//! place, so a crash mid-write never leaves a truncated CSV or JSON
//! file in the mart.

use crate::app::models::Table;
use crate::{Error, Result};

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Replace path separators, reserved punctuation and control
/// characters with underscores so a table name is always a safe
/// file name.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::io(
                format!("failed to create directory {}", parent.display()),
                e,
            )
        })?;
    }
    Ok(())
}

/// Write a table as CSV, replacing any existing file in one rename.
///
/// Returns the number of data rows written (the header line is not
/// counted).
pub fn write_csv_atomic(table: &Table, path: &Path) -> Result<usize> {
    ensure_parent(path)?;
    let tmp = temp_sibling(path);

    let mut writer = csv::Writer::from_path(&tmp).map_err(|e| {
        Error::csv_parsing(
            tmp.display().to_string(),
            "failed to open output file",
            Some(e),
        )
    })?;

    writer
        .write_record(&table.columns)
        .map_err(|e| Error::csv_parsing(tmp.display().to_string(), "failed to write header", Some(e)))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .map_err(|e| {
                Error::csv_parsing(tmp.display().to_string(), "failed to write row", Some(e))
            })?;
    }
    writer
        .flush()
        .map_err(|e| Error::io(format!("failed to flush {}", tmp.display()), e))?;
    drop(writer);

    fs::rename(&tmp, path)
        .map_err(|e| Error::io(format!("failed to move {} into place", path.display()), e))?;

    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(table.len())
}

/// Serialize a value as pretty JSON, atomically.
pub fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let tmp = temp_sibling(path);

    let payload = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, payload)
        .map_err(|e| Error::io(format!("failed to write {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::io(format!("failed to move {} into place", path.display()), e))?;

    debug!("Wrote {}", path.display());
    Ok(())
}
