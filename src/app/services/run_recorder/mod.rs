//! Run bookkeeping: quality review, `metadata.json` and the append-only
//! NDJSON run log
//!
//! The quality review inspects each normalized dataset and records
//! alerts on it; the recorder then aggregates per-dataset summaries,
//! the list of source files read, and per-table row counts into the
//! run artifacts. `metadata.json` is written wholesale on success only,
//! while the NDJSON log gains one line per run, success or not.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::table_writer::write_json_atomic;
use crate::constants::{METADATA_FILENAME, RUNS_LOG_FILENAME};
use crate::{Error, Result};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

// =============================================================================
// Quality review
// =============================================================================

/// Inspect a dataset and append quality alerts to it.
///
/// Checks run in a fixed order. A missing key column or an empty table
/// short-circuits the rest: the remaining checks are meaningless
/// without rows keyed as expected.
pub fn review(dataset: &mut Dataset) {
    let missing_key = dataset
        .key_columns
        .iter()
        .any(|key| dataset.table.column_index(key).is_none());
    if missing_key {
        dataset.push_alert("columnas_no_detectadas");
        return;
    }

    if dataset.is_empty() {
        dataset.push_alert("dataset_vacio");
        return;
    }

    let duplicates = surviving_duplicates(&dataset.table, &dataset.key_columns);
    if duplicates > 0 {
        dataset.push_alert(format!("duplicados:{}", duplicates));
    }

    let missing = key_blanks(&dataset.table, &dataset.key_columns);
    if missing > 0 {
        dataset.push_alert(format!("faltantes:{}", missing));
    }

    if has_negative_numbers(&dataset.table) {
        dataset.push_alert("valores_negativos");
    }
}

/// Rows in excess of distinct keys, i.e. duplicates still present
fn surviving_duplicates(table: &Table, key_columns: &[String]) -> usize {
    let key_indices = table.key_indices(key_columns);
    let distinct: HashSet<String> = table
        .rows
        .iter()
        .map(|row| Table::key_of(row, &key_indices))
        .collect();
    table.len() - distinct.len()
}

/// Blank cells across the key columns
fn key_blanks(table: &Table, key_columns: &[String]) -> usize {
    let key_indices = table.key_indices(key_columns);
    table
        .rows
        .iter()
        .map(|row| key_indices.iter().filter(|&&i| row[i].is_blank()).count())
        .sum()
}

fn has_negative_numbers(table: &Table) -> bool {
    table
        .rows
        .iter()
        .flatten()
        .any(|cell| matches!(cell, Cell::Number(n) if *n < 0.0))
}

/// Per-dataset counters derived from well-known columns
fn quality_counters(table: &Table) -> BTreeMap<String, u64> {
    let mut counters = BTreeMap::new();
    if let Some(idx) = table.column_index("central_id") {
        let unmapped = table.rows.iter().filter(|row| row[idx].is_blank()).count();
        counters.insert("centrales_no_mapeadas".to_string(), unmapped as u64);
    }
    if let Some(idx) = table.column_index("cliente") {
        let blank = table.rows.iter().filter(|row| row[idx].is_blank()).count();
        counters.insert("clientes_vacios".to_string(), blank as u64);
    }
    counters
}

/// Earliest and latest dates seen in a table, from date-typed cells and
/// six-digit `periodo` values (taken as the first of the month)
fn date_bounds(table: &Table) -> (Option<String>, Option<String>) {
    let mut min: Option<NaiveDateTime> = None;
    let mut max: Option<NaiveDateTime> = None;

    for (idx, column) in table.columns.iter().enumerate() {
        let from_periodo = column == "periodo";
        for row in &table.rows {
            let cell = &row[idx];
            let candidate = match cell {
                Cell::Date(dt) => Some(*dt),
                _ if from_periodo && !cell.is_blank() => period_start(&cell.label()),
                _ => None,
            };
            if let Some(dt) = candidate {
                min = Some(min.map_or(dt, |m| m.min(dt)));
                max = Some(max.map_or(dt, |m| m.max(dt)));
            }
        }
    }

    (
        min.map(|dt| dt.format(ISO_SECONDS).to_string()),
        max.map(|dt| dt.format(ISO_SECONDS).to_string()),
    )
}

fn period_start(periodo: &str) -> Option<NaiveDateTime> {
    if periodo.len() != 6 || !periodo.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = periodo[..4].parse().ok()?;
    let month: u32 = periodo[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

// =============================================================================
// Run artifacts
// =============================================================================

/// A source file read during the run
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub nombre: String,
    pub modified_time: f64,
    pub size: u64,
}

/// Summary of one dataset for `metadata.json`
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub filas: usize,
    pub alertas: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_min: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_max: Option<String>,

    #[serde(flatten)]
    pub counters: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    fecha_ejecucion: String,
    archivos_leidos: &'a [FileInfo],
    datasets: &'a BTreeMap<String, DatasetSummary>,
}

/// Final state of a run, for the NDJSON log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    fn label(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize)]
struct RunRecord<'a> {
    run_id: &'a str,
    started_at: &'a str,
    finished_at: String,
    status: &'static str,
    tables: &'a BTreeMap<String, usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Accumulates everything one run learns about its inputs and outputs
pub struct RunRecorder {
    run_id: String,
    started_at: String,
    files: Vec<FileInfo>,
    datasets: BTreeMap<String, DatasetSummary>,
    tables: BTreeMap<String, usize>,
}

impl RunRecorder {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now().format(ISO_SECONDS).to_string(),
            files: Vec::new(),
            datasets: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Note a source file that was read
    pub fn record_file(&mut self, path: &Path) -> Result<()> {
        let stat = fs::metadata(path)
            .map_err(|e| Error::io(format!("failed to stat {}", path.display()), e))?;
        let modified_time = stat
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let nombre = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.files.push(FileInfo {
            nombre,
            modified_time,
            size: stat.len(),
        });
        Ok(())
    }

    /// Summarize a reviewed dataset and track its row count
    pub fn record_dataset(&mut self, dataset: &Dataset) {
        let (fecha_min, fecha_max) = date_bounds(&dataset.table);
        let summary = DatasetSummary {
            filas: dataset.table.len(),
            alertas: dataset.alerts.clone(),
            fecha_min,
            fecha_max,
            counters: quality_counters(&dataset.table),
        };
        debug!(
            "Recorded dataset '{}': {} rows, {} alert(s)",
            dataset.name(),
            summary.filas,
            summary.alertas.len()
        );
        self.tables.insert(dataset.name().to_string(), summary.filas);
        self.datasets.insert(dataset.name().to_string(), summary);
    }

    /// Track a written table not covered by `record_dataset`
    /// (merged interval partitions report their final row counts here)
    pub fn record_table_rows(&mut self, table: &str, rows: usize) {
        self.tables.insert(table.to_string(), rows);
    }

    /// Write `metadata.json` into the mart directory.
    ///
    /// Only called on success; a failed run must not overwrite the
    /// metadata of the last good one.
    pub fn write_metadata(&self, output_dir: &Path) -> Result<PathBuf> {
        let metadata = Metadata {
            fecha_ejecucion: Utc::now().format(ISO_SECONDS).to_string(),
            archivos_leidos: &self.files,
            datasets: &self.datasets,
        };
        let path = output_dir.join(METADATA_FILENAME);
        write_json_atomic(&metadata, &path)?;
        Ok(path)
    }

    /// Append one line to the NDJSON run log
    pub fn append_run_log(
        &self,
        logs_dir: &Path,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<PathBuf> {
        let record = RunRecord {
            run_id: &self.run_id,
            started_at: &self.started_at,
            finished_at: Utc::now().format(ISO_SECONDS).to_string(),
            status: status.label(),
            tables: &self.tables,
            error,
        };

        fs::create_dir_all(logs_dir)
            .map_err(|e| Error::io(format!("failed to create {}", logs_dir.display()), e))?;
        let path = logs_dir.join(RUNS_LOG_FILENAME);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(format!("failed to open {}", path.display()), e))?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .map_err(|e| Error::io(format!("failed to append to {}", path.display()), e))?;
        Ok(path)
    }
}
