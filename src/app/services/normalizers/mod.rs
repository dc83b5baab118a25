//! Source normalizers, one module per source family
//!
//! Every normalizer turns one landing workbook into canonical
//! long-format datasets. All follow the same sequence: locate the
//! sheet(s), detect the header row, reshape wide month columns into
//! long rows, reconcile entity labels, derive YYYYMM period keys, then
//! deduplicate on the natural key keeping the last occurrence.

pub mod balance;
pub mod billing;
pub mod contracts;
pub mod hydrology;
pub mod intervals;
pub mod production;
pub mod reservoirs;

use crate::app::models::Dataset;
use crate::config::SourceSpec;
use crate::{Error, Result};

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Output of one normalizer stage
#[derive(Debug)]
pub struct NormalizedSource {
    /// Canonical datasets produced by the stage
    pub datasets: Vec<Dataset>,

    /// Raw data rows consumed, for stage logging
    pub rows_in: usize,
}

impl NormalizedSource {
    pub fn new(datasets: Vec<Dataset>, rows_in: usize) -> Self {
        Self { datasets, rows_in }
    }
}

/// Locate the landing file for a source.
///
/// Named policy: "first match wins". Candidates are the files whose
/// name contains the configured pattern (case-insensitive), ordered by
/// file name; the first is used and the rest are logged. A missing
/// required source is fatal; a missing optional one resolves to `None`.
pub fn discover_source(
    name: &str,
    spec: &SourceSpec,
    landing_dir: &Path,
) -> Result<Option<PathBuf>> {
    let candidates = candidate_files(landing_dir, &spec.pattern)?;

    if candidates.len() > 1 {
        let ignored: Vec<String> = candidates[1..]
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect();
        warn!(
            "Source '{}' matched {} files for pattern '{}'; using the first by name, ignoring: {}",
            name,
            candidates.len(),
            spec.pattern,
            ignored.join(", ")
        );
    }

    match candidates.into_iter().next() {
        Some(path) => Ok(Some(path)),
        None if spec.required => Err(Error::missing_required_source(
            name,
            &spec.pattern,
            landing_dir.display().to_string(),
        )),
        None => {
            warn!(
                "Optional source '{}' not found (pattern '{}' in {})",
                name,
                spec.pattern,
                landing_dir.display()
            );
            Ok(None)
        }
    }
}

/// Files in `dir` whose name contains `pattern` (case-insensitive),
/// sorted by file name. Shared with the `sources` diagnostics command.
pub fn candidate_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let needle = pattern.to_lowercase();
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::io(format!("failed to list {}", dir.display()), e))?;

    let mut matches = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::io(format!("failed to list {}", dir.display()), e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .to_lowercase()
            .contains(&needle)
        {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}
