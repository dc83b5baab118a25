//! Workbook access for loosely structured spreadsheet exports
//!
//! This module wraps calamine behind a small API: open a workbook, list
//! its sheets, and pull one sheet as a typed cell grid. Everything
//! downstream (header detection, reshaping, the normalizers) works on
//! [`RawGrid`] and [`SheetTable`] instead of raw calamine ranges.

use crate::app::models::Cell;
use crate::{Error, Result};
use calamine::{open_workbook_auto, Reader, Sheets};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod grid;
pub mod header;

pub use grid::{RawGrid, SheetTable};
pub use header::detect_header_row;

/// An open source workbook
pub struct Workbook {
    path: PathBuf,
    inner: Sheets<BufReader<File>>,
}

impl std::fmt::Debug for Workbook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbook")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Workbook {
    /// Open a workbook, auto-detecting xlsx/xls/ods by content
    pub fn open(path: &Path) -> Result<Self> {
        let inner = open_workbook_auto(path).map_err(|e| {
            Error::spreadsheet(
                path.display().to_string(),
                "could not open workbook",
                Some(e),
            )
        })?;
        debug!("Opened workbook {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Path the workbook was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for log and error context
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Names of all sheets, in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names().to_vec()
    }

    /// First sheet whose name contains `needle` (case-insensitive)
    pub fn find_sheet(&self, needle: &str) -> Option<String> {
        let needle = needle.trim().to_lowercase();
        self.sheet_names()
            .into_iter()
            .find(|name| name.to_lowercase().contains(&needle))
    }

    /// First sheet matching any of the given candidates, tried in order
    pub fn find_sheet_among(&self, candidates: &[String]) -> Option<String> {
        candidates.iter().find_map(|c| self.find_sheet(c))
    }

    /// Read one sheet into a typed cell grid
    pub fn grid(&mut self, sheet: &str) -> Result<RawGrid> {
        let range = self.inner.worksheet_range(sheet).map_err(|e| {
            Error::spreadsheet(
                self.file_name(),
                format!("could not read sheet '{}'", sheet),
                Some(e),
            )
        })?;

        let mut rows = Vec::with_capacity(range.height());
        for row in range.rows() {
            rows.push(row.iter().map(Cell::from_data).collect());
        }
        debug!(
            "Read sheet '{}' from {}: {} row(s), {} column(s)",
            sheet,
            self.file_name(),
            range.height(),
            range.width()
        );
        Ok(RawGrid {
            sheet: sheet.to_string(),
            rows,
        })
    }
}
