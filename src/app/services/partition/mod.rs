//! Monthly partition handling for the 15-minute interval output
//!
//! The 15-minute series lands in one CSV per month
//! (`generacion_15min_YYYYMM.csv`). Source workbooks arrive
//! incrementally and overlap months already on disk, so re-running a
//! month must fold the fresh rows into the existing partition instead
//! of clobbering it.

use crate::app::models::{Cell, Table};
use crate::constants::{INTERVAL_PARTITION_GLOB, INTERVAL_PARTITION_PREFIX};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Existing 15-minute partitions in the mart directory as
/// (yyyymm, path) pairs, sorted by month
pub fn existing_partitions(mart_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let pattern = mart_dir.join(INTERVAL_PARTITION_GLOB);
    let pattern = pattern.to_string_lossy().to_string();
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::configuration(format!("invalid partition glob '{}': {}", pattern, e)))?;

    let mut partitions = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                if let Some(month) = partition_month(&path) {
                    partitions.push((month, path));
                }
            }
            Err(e) => warn!("Skipping unreadable partition candidate: {}", e),
        }
    }
    partitions.sort();
    Ok(partitions)
}

/// The YYYYMM suffix of a partition file name, when well-formed
pub fn partition_month(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let month = stem.strip_prefix(INTERVAL_PARTITION_PREFIX)?.strip_prefix('_')?;
    if month.len() == 6 && month.chars().all(|c| c.is_ascii_digit()) {
        Some(month.to_string())
    } else {
        None
    }
}

/// Read a previously written partition back into a table
pub fn read_partition(path: &Path, table_name: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| {
            Error::csv_parsing(
                path.display().to_string(),
                "could not open existing partition",
                Some(e),
            )
        })?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| {
            Error::csv_parsing(
                path.display().to_string(),
                "could not read partition header",
                Some(e),
            )
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = Table {
        name: table_name.to_string(),
        columns,
        rows: Vec::new(),
    };
    for record in reader.records() {
        let record = record.map_err(|e| {
            Error::csv_parsing(
                path.display().to_string(),
                "invalid partition row",
                Some(e),
            )
        })?;
        table.push_row(record.iter().map(Cell::from_csv_field).collect());
    }
    debug!(
        "Read partition {}: {} row(s)",
        path.display(),
        table.len()
    );
    Ok(table)
}

/// Merge an incoming partition over the one already on disk.
///
/// Named policy: "last wins". The result carries the union of both
/// column sets (columns one side lacks are null-filled), incoming rows
/// replace existing rows that share the natural key, and the output is
/// sorted by the timestamp column and then the key.
pub fn merge(
    existing: &Table,
    incoming: &Table,
    key_columns: &[String],
    sort_column: &str,
) -> Table {
    let mut columns = incoming.columns.clone();
    for column in &existing.columns {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }

    let mut merged = Table {
        name: incoming.name.clone(),
        columns,
        rows: Vec::new(),
    };

    // Existing rows first so the later incoming occurrence survives
    for source in [existing, incoming] {
        let mapping: Vec<Option<usize>> = merged
            .columns
            .iter()
            .map(|column| source.column_index(column))
            .collect();
        for row in &source.rows {
            let cells = mapping
                .iter()
                .map(|idx| {
                    idx.and_then(|i| row.get(i).cloned())
                        .unwrap_or(Cell::Empty)
                })
                .collect();
            merged.push_row(cells);
        }
    }

    let dropped = merged.dedup_keep_last(key_columns);
    if dropped > 0 {
        debug!(
            "Partition merge for '{}' replaced {} row(s) on the natural key",
            merged.name, dropped
        );
    }

    let mut sort_columns = vec![sort_column.to_string()];
    for key in key_columns {
        if key != sort_column {
            sort_columns.push(key.clone());
        }
    }
    merged.sort_by_columns(&sort_columns);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::parse_datetime_flexible;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn stamp(s: &str) -> Cell {
        Cell::Date(parse_datetime_flexible(s).unwrap())
    }

    fn interval_table(rows: &[(&str, &str, &str, f64)]) -> Table {
        let mut table = Table::new(
            "generacion_15min_202501",
            &["fecha_hora", "central_id", "central", "unidad", "energia_mwh"],
        );
        for (ts, id, unidad, mwh) in rows {
            table.push_row(vec![
                stamp(ts),
                text(id),
                text("CHARCANI V"),
                text(unidad),
                Cell::Number(*mwh),
            ]);
        }
        table
    }

    fn interval_key() -> Vec<String> {
        vec![
            "fecha_hora".to_string(),
            "central_id".to_string(),
            "unidad".to_string(),
        ]
    }

    #[test]
    fn test_partition_month_parsing() {
        assert_eq!(
            partition_month(Path::new("/mart/generacion_15min_202501.csv")).as_deref(),
            Some("202501")
        );
        assert_eq!(
            partition_month(Path::new("generacion_15min_2025.csv")),
            None
        );
        assert_eq!(partition_month(Path::new("ventas_mensual_mwh.csv")), None);
    }

    #[test]
    fn test_merge_new_value_wins_and_row_count_is_stable() {
        let existing = interval_table(&[
            ("2025-01-15 00:00:00", "CH5", "U1", 10.0),
            ("2025-01-15 00:15:00", "CH5", "U1", 11.0),
        ]);
        // Same keys, one corrected value
        let incoming = interval_table(&[
            ("2025-01-15 00:00:00", "CH5", "U1", 10.0),
            ("2025-01-15 00:15:00", "CH5", "U1", 99.0),
        ]);

        let merged = merge(&existing, &incoming, &interval_key(), "fecha_hora");
        assert_eq!(merged.len(), 2);
        assert_eq!(*merged.cell(1, "energia_mwh"), Cell::Number(99.0));
    }

    #[test]
    fn test_merge_keeps_rows_the_incoming_side_lacks() {
        let existing = interval_table(&[
            ("2025-01-15 00:00:00", "CH5", "U1", 10.0),
            ("2025-01-15 00:15:00", "CH5", "U1", 11.0),
        ]);
        let incoming = interval_table(&[("2025-01-15 00:30:00", "CH5", "U1", 12.0)]);

        let merged = merge(&existing, &incoming, &interval_key(), "fecha_hora");
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_sorts_by_timestamp_then_key() {
        let existing = interval_table(&[("2025-01-15 00:15:00", "CH5", "U1", 11.0)]);
        let incoming = interval_table(&[
            ("2025-01-15 00:00:00", "CT1", "U1", 2.0),
            ("2025-01-15 00:00:00", "CH5", "U1", 1.0),
        ]);

        let merged = merge(&existing, &incoming, &interval_key(), "fecha_hora");
        let order: Vec<String> = merged
            .rows
            .iter()
            .map(|r| format!("{} {}", r[0].label(), r[1].label()))
            .collect();
        assert_eq!(
            order,
            vec![
                "2025-01-15 00:00:00 CH5",
                "2025-01-15 00:00:00 CT1",
                "2025-01-15 00:15:00 CH5",
            ]
        );
    }

    #[test]
    fn test_merge_unions_drifted_columns() {
        let mut existing = interval_table(&[("2025-01-15 00:00:00", "CH5", "U1", 10.0)]);
        // An earlier release wrote an extra column
        existing.ensure_column("observacion");
        let idx = existing.column_index("observacion").unwrap();
        existing.rows[0][idx] = text("ok");

        let incoming = interval_table(&[("2025-01-15 00:15:00", "CH5", "U1", 11.0)]);
        let merged = merge(&existing, &incoming, &interval_key(), "fecha_hora");

        assert!(merged.column_index("observacion").is_some());
        assert_eq!(merged.cell(0, "observacion").label(), "ok");
        // The incoming row is null-filled in the drifted column
        assert!(merged.cell(1, "observacion").is_blank());
    }

    #[test]
    fn test_read_partition_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generacion_15min_202501.csv");
        std::fs::write(
            &path,
            "fecha_hora,central_id,central,unidad,energia_mwh\n\
             2025-01-15 00:00:00,CH5,CHARCANI V,U1,10.5\n\
             2025-01-15 00:15:00,CH5,CHARCANI V,U1,\n",
        )
        .unwrap();

        let table = read_partition(&path, "generacion_15min_202501").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns.len(), 5);
        assert!(matches!(table.cell(0, "fecha_hora"), Cell::Date(_)));
        assert_eq!(*table.cell(0, "energia_mwh"), Cell::Number(10.5));
        assert!(table.cell(1, "energia_mwh").is_blank());
    }

    #[test]
    fn test_existing_partitions_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "generacion_15min_202502.csv",
            "generacion_15min_202501.csv",
            "generacion_15min_borrador.csv",
            "ventas_mensual_mwh.csv",
        ] {
            std::fs::write(dir.path().join(name), "a\n1\n").unwrap();
        }

        let partitions = existing_partitions(dir.path()).unwrap();
        let months: Vec<&str> = partitions.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(months, vec!["202501", "202502"]);
    }
}
