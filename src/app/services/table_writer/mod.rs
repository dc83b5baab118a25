//! Validated CSV output for the data mart
//!
//! The writer validates each dataset against its declared schema,
//! persists a JSON report when checks fail, and then writes the table
//! to the mart directory. In strict mode a failing table aborts the
//! run after the report is on disk; otherwise the table is written
//! with a warning.

pub mod schema;
pub mod writer;

pub use schema::{table_schema, validate, ColumnKind, ColumnSchema, TableSchema, Violation};
pub use writer::{sanitize_filename, write_csv_atomic, write_json_atomic};

use crate::app::models::Dataset;
use crate::config::Config;
use crate::constants::{mart_filename, validation_report_filename};
use crate::{Error, Result};

use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of writing one dataset
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Final path of the CSV file
    pub path: PathBuf,

    /// Data rows written
    pub rows: usize,

    /// Number of failed checks (0 when the table was clean or
    /// unvalidated)
    pub violations: usize,
}

/// Persisted validation report
#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    run_id: &'a str,
    tabla: &'a str,
    generado_en: String,
    filas: usize,
    violaciones: &'a [Violation],
}

/// Writes validated datasets into the mart directory
pub struct TableWriter<'a> {
    config: &'a Config,
    run_id: String,
}

impl<'a> TableWriter<'a> {
    pub fn new(config: &'a Config, run_id: impl Into<String>) -> Self {
        Self {
            config,
            run_id: run_id.into(),
        }
    }

    /// Validate and write one dataset.
    ///
    /// Empty tables skip validation but are still written so the mart
    /// always carries a header-only file for the table. When checks
    /// fail the report is persisted first; strict mode then returns an
    /// error, non-strict mode writes the table anyway.
    pub fn write_dataset(&self, dataset: &Dataset, strict: bool) -> Result<WriteOutcome> {
        let table = &dataset.table;

        let violations = if table.is_empty() {
            Vec::new()
        } else {
            let rules = self.config.table_rules(&table.name);
            let declared = schema::table_schema(&table.name);
            schema::validate(table, declared.as_ref(), &rules.required_columns)
        };

        if !violations.is_empty() {
            let report_path = self.persist_report(&table.name, table.len(), &violations)?;
            if strict {
                return Err(Error::schema_validation(
                    &table.name,
                    violations.len(),
                    report_path.display().to_string(),
                ));
            }
            warn!(
                "Table '{}' failed {} validation check(s), writing anyway (report: {})",
                table.name,
                violations.len(),
                report_path.display()
            );
        }

        let path = self
            .config
            .output_dir()
            .join(sanitize_filename(&mart_filename(&table.name)));
        let rows = write_csv_atomic(table, &path)?;
        info!("Wrote table '{}' ({} rows)", table.name, rows);

        Ok(WriteOutcome {
            path,
            rows,
            violations: violations.len(),
        })
    }

    fn persist_report(
        &self,
        table: &str,
        rows: usize,
        violations: &[Violation],
    ) -> Result<PathBuf> {
        let report = ValidationReport {
            run_id: &self.run_id,
            tabla: table,
            generado_en: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            filas: rows,
            violaciones: violations,
        };
        let path = self
            .config
            .reports_dir()
            .join(sanitize_filename(&validation_report_filename(
                &self.run_id,
                table,
            )));
        write_json_atomic(&report, &path)?;
        warn!(
            "Validation report for '{}' written to {}",
            table,
            path.display()
        );
        Ok(path)
    }
}
