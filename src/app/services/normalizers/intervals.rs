//! 15-minute interval generation readings, partitioned by month
//!
//! The source sheet carries a two-row composite header: the first row
//! labels entity groups (merged cells arrive blank and are filled from
//! the left), the second labels the sub-unit meters. One column holds
//! the combined date+time stamp. Readings arrive in kWh and are
//! published in MWh, one partition per YYYYMM.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::entity_registry::EntityRegistry;
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::sheet_parser::{detect_header_row, RawGrid, Workbook};
use crate::constants::{
    interval_partition_table, DEFAULT_UNIT, INTERVAL_HEADER_KEYWORDS, KWH_PER_MWH,
    PREVIEW_ROWS_DEFAULT,
};
use crate::Result;

use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const KEY: &[&str] = &["fecha_hora", "central_id", "unidad"];
const COLUMNS: &[&str] = &["fecha_hora", "central_id", "central", "unidad", "energia_mwh"];

/// One fallback partition so the mart always carries the expected file
pub fn empty(month: &str) -> NormalizedSource {
    let table = Table::new(interval_partition_table(month), COLUMNS);
    NormalizedSource::new(vec![Dataset::new(table, KEY)], 0)
}

/// Normalize the interval workbook into one dataset per month.
///
/// When nothing usable comes out (no timestamp column, no parseable
/// rows) the result degrades to a single empty partition for
/// `fallback_month`.
pub fn normalize(
    workbook: &mut Workbook,
    registry: &mut EntityRegistry,
    fallback_month: &str,
) -> Result<NormalizedSource> {
    let Some(sheet) = workbook.sheet_names().into_iter().next() else {
        warn!("No sheets in {}", workbook.file_name());
        return Ok(empty(fallback_month));
    };
    let grid = workbook.grid(&sheet)?;
    let file = workbook.file_name();
    Ok(normalize_grid(grid, &file, registry, fallback_month))
}

fn normalize_grid(
    grid: RawGrid,
    file: &str,
    registry: &mut EntityRegistry,
    fallback_month: &str,
) -> NormalizedSource {
    let header_row = detect_header_row(
        grid.preview(PREVIEW_ROWS_DEFAULT),
        INTERVAL_HEADER_KEYWORDS,
        &[],
    );

    let sheet = grid.sheet;
    let rows = grid.rows;
    let group_row = rows.get(header_row).cloned().unwrap_or_default();
    let unit_row = rows.get(header_row + 1).cloned().unwrap_or_default();
    let data_start = (header_row + 2).min(rows.len());
    let data = &rows[data_start..];
    let rows_in = data.len();

    let groups = forward_fill(&group_row);
    let Some(timestamp_col) = groups
        .iter()
        .position(|label| label.to_lowercase().contains("fecha"))
    else {
        warn!(
            "Sheet '{}' of {} has no timestamp column, skipped",
            sheet, file
        );
        return NormalizedSource::new(empty(fallback_month).datasets, rows_in);
    };

    let measures = measure_columns(&groups, &unit_row, timestamp_col, &sheet, registry);

    let mut staged = Table::new("generacion_15min", COLUMNS);
    let mut dropped_timestamps = 0;
    for row in data {
        let Some(ts) = row.get(timestamp_col).and_then(|c| c.as_date()) else {
            if row.iter().any(|c| !c.is_blank()) {
                dropped_timestamps += 1;
            }
            continue;
        };
        for measure in &measures {
            let energia = row
                .get(measure.idx)
                .and_then(|c| c.as_number())
                .map(|kwh| Cell::Number(kwh / KWH_PER_MWH))
                .unwrap_or(Cell::Empty);
            staged.push_row(vec![
                Cell::Date(ts),
                measure.central_id.clone(),
                Cell::Text(measure.central.clone()),
                Cell::Text(measure.unidad.clone()),
                energia,
            ]);
        }
    }
    if dropped_timestamps > 0 {
        warn!(
            "Dropped {} row(s) with unparseable timestamps from sheet '{}' of {}",
            dropped_timestamps, sheet, file
        );
    }

    let key_columns: Vec<String> = KEY.iter().map(|c| c.to_string()).collect();
    let dropped = staged.dedup_keep_last(&key_columns);
    if dropped > 0 {
        debug!("Removed {} duplicate interval reading(s)", dropped);
    }

    let mut by_month: BTreeMap<String, Table> = BTreeMap::new();
    for row in staged.rows {
        let Cell::Date(ts) = &row[0] else { continue };
        let month = ts.format("%Y%m").to_string();
        by_month
            .entry(month.clone())
            .or_insert_with(|| Table::new(interval_partition_table(&month), COLUMNS))
            .push_row(row);
    }

    if by_month.is_empty() {
        return NormalizedSource::new(empty(fallback_month).datasets, rows_in);
    }

    let datasets = by_month
        .into_values()
        .map(|table| {
            let mut dataset = Dataset::new(table, KEY);
            dataset.sort_on_key();
            dataset
        })
        .collect();
    NormalizedSource::new(datasets, rows_in)
}

struct MeasureColumn {
    idx: usize,
    central: String,
    central_id: Cell,
    unidad: String,
}

/// Resolve the measurement columns from the composite header.
///
/// Columns whose forward-filled group label is blank (or is the
/// timestamp/time axis) carry no entity and are dropped, with a warning
/// for the blank ones.
fn measure_columns(
    groups: &[String],
    unit_row: &[Cell],
    timestamp_col: usize,
    sheet: &str,
    registry: &mut EntityRegistry,
) -> Vec<MeasureColumn> {
    let mut measures = Vec::new();
    for (idx, group) in groups.iter().enumerate() {
        if idx == timestamp_col {
            continue;
        }
        let lower = group.to_lowercase();
        if lower.contains("fecha") || lower.contains("hora") {
            continue;
        }
        let central = strip_kwh_tokens(group);
        if central.is_empty() {
            warn!(
                "Column {} of sheet '{}' has no entity label, dropped",
                idx, sheet
            );
            continue;
        }

        let unidad = {
            let label = unit_row
                .get(idx)
                .map(|c| strip_kwh_tokens(&c.label()))
                .unwrap_or_default();
            if label.is_empty() {
                DEFAULT_UNIT.to_string()
            } else {
                label
            }
        };
        let central_id = match registry.map_label(&central) {
            Some(id) => Cell::Text(id),
            None => Cell::Empty,
        };
        measures.push(MeasureColumn {
            idx,
            central,
            central_id,
            unidad,
        });
    }
    measures
}

/// Fill blank labels from the left, the way merged header cells read
fn forward_fill(cells: &[Cell]) -> Vec<String> {
    let mut filled = Vec::with_capacity(cells.len());
    let mut last = String::new();
    for cell in cells {
        let label = cell.label();
        let label = label.trim();
        if !label.is_empty() {
            last = label.to_string();
        }
        filled.push(last.clone());
    }
    filled
}

/// Remove "kWh" / "(kWh)" tokens from a header label
fn strip_kwh_tokens(label: &str) -> String {
    label
        .split_whitespace()
        .filter(|token| {
            token
                .trim_matches(|c| c == '(' || c == ')')
                .to_lowercase()
                != "kwh"
        })
        .collect::<Vec<_>>()
        .join(" ")
}
