//! Energy balance workbook (sheets "Perfil" and "R")
//!
//! Both sheets are label-by-month matrices whose month columns are
//! date-typed header cells. "Perfil" carries energy concepts in GWh
//! and is republished in both GWh and MWh; "R" carries sales segments
//! already in MWh. Labels are uppercased and filtered against fixed
//! vocabularies, after correcting a known source typo in the concept
//! column. Sheet names are matched exactly: the single-letter "R"
//! would otherwise collide with nearly every other sheet name.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::reshaper::melt;
use crate::app::services::sheet_parser::{SheetTable, Workbook};
use crate::config::SourceSpec;
use crate::constants::{
    BALANCE_CONCEPTS, BALANCE_CONCEPT_TYPO, BALANCE_SEGMENTS, MWH_PER_GWH, PREVIEW_ROWS_BALANCE,
};
use crate::Result;

use chrono::{Datelike, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub const PERFIL_TABLE: &str = "balance_perfil_mensual";
pub const R_TABLE: &str = "balance_r_mensual";
pub const PERFIL_KEY: &[&str] = &["periodo", "concepto"];
pub const R_KEY: &[&str] = &["periodo", "segmento"];

const PERFIL_COLUMNS: &[&str] = &["periodo", "fecha_mes", "concepto", "energia_mwh", "energia_gwh"];
const R_COLUMNS: &[&str] = &["periodo", "fecha_mes", "segmento", "energia_mwh"];

/// Correctly-shaped empty outputs, for when the source file is absent
pub fn empty() -> NormalizedSource {
    NormalizedSource::new(
        vec![
            Dataset::new(Table::new(PERFIL_TABLE, PERFIL_COLUMNS), PERFIL_KEY),
            Dataset::new(Table::new(R_TABLE, R_COLUMNS), R_KEY),
        ],
        0,
    )
}

/// Normalize the energy balance workbook
pub fn normalize(workbook: &mut Workbook, spec: &SourceSpec) -> Result<NormalizedSource> {
    let mut rows_in = 0;

    let perfil = match read_sheet(workbook, spec, "perfil", "Perfil", "Concepto")? {
        Some(sheet) => {
            rows_in += sheet.row_count();
            perfil_table(&sheet)
        }
        None => Table::new(PERFIL_TABLE, PERFIL_COLUMNS),
    };

    let r = match read_sheet(workbook, spec, "r", "R", "Año")? {
        Some(sheet) => {
            rows_in += sheet.row_count();
            r_table(&sheet)
        }
        None => Table::new(R_TABLE, R_COLUMNS),
    };

    let mut datasets = Vec::new();
    for (table, key) in [(perfil, PERFIL_KEY), (r, R_KEY)] {
        let mut dataset = Dataset::new(table, key);
        dataset.dedup_on_key();
        dataset.sort_on_key();
        datasets.push(dataset);
    }
    Ok(NormalizedSource::new(datasets, rows_in))
}

fn read_sheet(
    workbook: &mut Workbook,
    spec: &SourceSpec,
    role: &str,
    fallback: &str,
    header_keyword: &str,
) -> Result<Option<SheetTable>> {
    let candidates = spec.sheet_candidates(role, &[fallback]);
    let Some(sheet) = workbook.sheet_names().into_iter().find(|name| {
        candidates
            .iter()
            .any(|c| name.trim().eq_ignore_ascii_case(c.trim()))
    }) else {
        warn!(
            "No sheet named {:?} in {}, writing empty table",
            candidates,
            workbook.file_name()
        );
        return Ok(None);
    };
    let grid = workbook.grid(&sheet)?;
    let header_row = exact_header_row(grid.preview(PREVIEW_ROWS_BALANCE), header_keyword);
    Ok(Some(grid.into_table(header_row)))
}

/// First row with a cell exactly equal to `keyword` (case-insensitive),
/// defaulting to 0
fn exact_header_row(preview: &[Vec<Cell>], keyword: &str) -> usize {
    let needle = keyword.trim().to_uppercase();
    preview
        .iter()
        .position(|row| row.iter().any(|c| c.label().to_uppercase() == needle))
        .unwrap_or(0)
}

/// Month columns are the date-typed header cells. Returns melt tags
/// plus the period-to-date lookup for the `fecha_mes` column.
fn date_columns(sheet: &SheetTable) -> (Vec<(usize, String)>, HashMap<String, NaiveDateTime>) {
    let mut cols = Vec::new();
    let mut dates = HashMap::new();
    for (idx, cell) in sheet.header.iter().enumerate() {
        if let Cell::Date(dt) = cell {
            let periodo = format!("{:04}{:02}", dt.year(), dt.month());
            cols.push((idx, periodo.clone()));
            dates.insert(periodo, *dt);
        }
    }
    (cols, dates)
}

/// Restrict a sheet to the rows whose label (after trim, typo fix and
/// uppercasing) is in `vocabulary`, keeping the first occurrence of
/// each label and rewriting the label column to the normalized form
fn filter_rows(sheet: &SheetTable, label_col: usize, vocabulary: &[&str]) -> SheetTable {
    let mut seen = HashSet::new();
    let rows = sheet
        .rows
        .iter()
        .filter_map(|row| {
            let label = row.get(label_col)?.label();
            let normalized = label
                .to_uppercase()
                .replace(BALANCE_CONCEPT_TYPO.0, BALANCE_CONCEPT_TYPO.1);
            if !vocabulary.contains(&normalized.as_str()) || !seen.insert(normalized.clone()) {
                return None;
            }
            let mut row = row.clone();
            row[label_col] = Cell::Text(normalized);
            Some(row)
        })
        .collect();
    SheetTable {
        sheet: sheet.sheet.clone(),
        header: sheet.header.clone(),
        rows,
    }
}

fn perfil_table(sheet: &SheetTable) -> Table {
    let mut out = Table::new(PERFIL_TABLE, PERFIL_COLUMNS);
    let Some(concepto_col) = sheet.position_exact("concepto") else {
        warn!("No concept column in sheet '{}'", sheet.sheet);
        return out;
    };
    let (value_cols, dates) = date_columns(sheet);
    if value_cols.is_empty() {
        warn!("No date-typed month columns in sheet '{}'", sheet.sheet);
        return out;
    }

    let filtered = filter_rows(sheet, concepto_col, BALANCE_CONCEPTS);
    for record in melt(&filtered, concepto_col, &value_cols) {
        let Some(gwh) = record.value else {
            continue;
        };
        let fecha_mes = dates
            .get(&record.period)
            .map(|dt| Cell::Date(*dt))
            .unwrap_or(Cell::Empty);
        out.push_row(vec![
            Cell::Text(record.period),
            fecha_mes,
            Cell::Text(record.id.label()),
            Cell::Number(gwh * MWH_PER_GWH),
            Cell::Number(gwh),
        ]);
    }
    out
}

fn r_table(sheet: &SheetTable) -> Table {
    let mut out = Table::new(R_TABLE, R_COLUMNS);
    let segment_col = sheet
        .position_exact("año")
        .or_else(|| sheet.position_exact("ano"))
        .or_else(|| first_text_column(sheet))
        .unwrap_or(0);
    let (value_cols, dates) = date_columns(sheet);
    if value_cols.is_empty() {
        warn!("No date-typed month columns in sheet '{}'", sheet.sheet);
        return out;
    }

    let filtered = filter_rows(sheet, segment_col, BALANCE_SEGMENTS);
    for record in melt(&filtered, segment_col, &value_cols) {
        let Some(mwh) = record.value else {
            continue;
        };
        let fecha_mes = dates
            .get(&record.period)
            .map(|dt| Cell::Date(*dt))
            .unwrap_or(Cell::Empty);
        out.push_row(vec![
            Cell::Text(record.period),
            fecha_mes,
            Cell::Text(record.id.label()),
            Cell::Number(mwh),
        ]);
    }
    out
}

fn first_text_column(sheet: &SheetTable) -> Option<usize> {
    sheet
        .header
        .iter()
        .position(|c| matches!(c, Cell::Text(s) if !s.trim().is_empty()))
}
