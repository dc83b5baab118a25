//! Billing workbook: sales by client, revenue by concept, average price
//!
//! Three sheets feed four tables. The two sales sheets (volumes in MWh
//! and amounts in soles) share a layout: one row per client, one column
//! per month, where month columns are either date-typed headers or bare
//! Spanish month names. The revenue sheet keys on a concept label
//! instead of a client and mixes summary rows into the data, which are
//! dropped by keyword so totals are not counted twice. Average price is
//! an outer join of the two sales tables.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::reshaper::{derive_anio_mes, melt, periodo_from_header};
use crate::app::services::sheet_parser::{detect_header_row, SheetTable, Workbook};
use crate::config::SourceSpec;
use crate::constants::{
    PREVIEW_ROWS_BILLING, REVENUE_HEADER_KEYWORDS, REVENUE_SUMMARY_BLOCKLIST,
    SALES_HEADER_KEYWORDS,
};
use crate::{Error, Result};

use std::collections::BTreeMap;
use tracing::warn;

pub const SALES_MWH_TABLE: &str = "ventas_mensual_mwh";
pub const SALES_SOLES_TABLE: &str = "ventas_mensual_soles";
pub const REVENUE_TABLE: &str = "ingresos_mensual";
pub const PRICE_TABLE: &str = "precio_medio_mensual";

pub const SALES_KEY: &[&str] = &["cliente", "periodo"];
pub const REVENUE_KEY: &[&str] = &["cliente_o_concepto", "periodo"];
pub const PRICE_KEY: &[&str] = &["cliente", "periodo"];

const SALES_MWH_COLUMNS: &[&str] = &["cliente", "periodo", "anio", "mes", "mwh"];
const SALES_SOLES_COLUMNS: &[&str] = &["cliente", "periodo", "anio", "mes", "soles"];
const REVENUE_COLUMNS: &[&str] = &["cliente_o_concepto", "periodo", "anio", "mes", "soles"];
const PRICE_COLUMNS: &[&str] = &["cliente", "periodo", "precio_medio_soles_mwh"];

/// Correctly-shaped empty outputs, for when the source file is absent
pub fn empty() -> NormalizedSource {
    NormalizedSource::new(
        vec![
            Dataset::new(Table::new(SALES_MWH_TABLE, SALES_MWH_COLUMNS), SALES_KEY),
            Dataset::new(Table::new(SALES_SOLES_TABLE, SALES_SOLES_COLUMNS), SALES_KEY),
            Dataset::new(Table::new(REVENUE_TABLE, REVENUE_COLUMNS), REVENUE_KEY),
            Dataset::new(Table::new(PRICE_TABLE, PRICE_COLUMNS), PRICE_KEY),
        ],
        0,
    )
}

/// Normalize the billing workbook.
///
/// The three sheets belong to one required source, so a missing sheet
/// aborts the run rather than degrading to a partial output.
/// `default_year` fills in the year for bare month-name headers.
pub fn normalize(
    workbook: &mut Workbook,
    spec: &SourceSpec,
    default_year: i32,
) -> Result<NormalizedSource> {
    let mut rows_in = 0;

    let sheet = required_sheet(workbook, spec, "ventas_mwh", "VENTAS (MWh)", SALES_HEADER_KEYWORDS)?;
    rows_in += sheet.row_count();
    let ventas_mwh = sales_table(&sheet, SALES_MWH_TABLE, SALES_MWH_COLUMNS, default_year);

    let sheet = required_sheet(workbook, spec, "ventas_soles", "VENTAS (S)", SALES_HEADER_KEYWORDS)?;
    rows_in += sheet.row_count();
    let ventas_soles = sales_table(&sheet, SALES_SOLES_TABLE, SALES_SOLES_COLUMNS, default_year);

    let sheet = required_sheet(workbook, spec, "ingresos", "Ingresos", REVENUE_HEADER_KEYWORDS)?;
    rows_in += sheet.row_count();
    let ingresos = revenue_table(&sheet, default_year);

    let precio_medio = price_table(&ventas_mwh, &ventas_soles);

    let mut datasets = Vec::new();
    for (table, key) in [
        (ventas_mwh, SALES_KEY),
        (ventas_soles, SALES_KEY),
        (ingresos, REVENUE_KEY),
        (precio_medio, PRICE_KEY),
    ] {
        let mut dataset = Dataset::new(table, key);
        dataset.dedup_on_key();
        dataset.sort_on_key();
        datasets.push(dataset);
    }
    Ok(NormalizedSource::new(datasets, rows_in))
}

fn required_sheet(
    workbook: &mut Workbook,
    spec: &SourceSpec,
    role: &str,
    fallback: &str,
    keywords: &[&str],
) -> Result<SheetTable> {
    let candidates = spec.sheet_candidates(role, &[fallback]);
    let Some(sheet) = workbook.find_sheet_among(&candidates) else {
        let wanted = candidates.first().cloned().unwrap_or_else(|| fallback.to_string());
        return Err(Error::sheet_parsing(
            workbook.file_name(),
            wanted,
            "sheet not found in workbook",
        ));
    };
    let grid = workbook.grid(&sheet)?;
    let header_row = billing_header_row(grid.preview(PREVIEW_ROWS_BILLING), keywords);
    Ok(grid.into_table(header_row))
}

/// Header row for billing sheets.
///
/// The keyword detector misses sheets whose month headers are
/// date-typed cells, so two fallbacks follow: skip fully blank leading
/// rows, then look for the row carrying the id-column label itself.
fn billing_header_row(preview: &[Vec<Cell>], keywords: &[&str]) -> usize {
    let mut row = detect_header_row(preview, keywords, &[]);
    if row == 0 && preview.first().is_some_and(|r| r.iter().all(Cell::is_blank)) {
        row = preview
            .iter()
            .position(|r| r.iter().any(|c| !c.is_blank()))
            .unwrap_or(0);
    }
    if row == 0 {
        row = preview.iter().position(|r| has_id_label(r)).unwrap_or(0);
    }
    row
}

fn has_id_label(row: &[Cell]) -> bool {
    row.iter().any(|c| {
        let label = c.label().to_lowercase();
        label == "codigo" || label == "cliente"
    })
}

/// Month columns tagged with their YYYYMM period. Date-typed headers
/// carry their own year; bare month names assume `default_year`.
fn month_columns(sheet: &SheetTable, id_col: usize, default_year: i32) -> Vec<(usize, String)> {
    sheet
        .header
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != id_col)
        .filter_map(|(idx, cell)| periodo_from_header(cell, default_year).map(|p| (idx, p)))
        .collect()
}

fn sales_table(sheet: &SheetTable, name: &str, columns: &[&str], default_year: i32) -> Table {
    let mut out = Table::new(name, columns);
    let entity_col = sheet.position_exact("cliente").unwrap_or(0);
    let value_cols = month_columns(sheet, entity_col, default_year);
    if value_cols.is_empty() {
        warn!("No month columns detected in sheet '{}' ({})", sheet.sheet, name);
        return out;
    }

    for record in melt(sheet, entity_col, &value_cols) {
        let (anio, mes) = derive_anio_mes(&record.period);
        out.push_row(vec![
            Cell::Text(record.id.label()),
            Cell::Text(record.period),
            anio.map(|y| Cell::Number(y as f64)).unwrap_or(Cell::Empty),
            mes.map(|m| Cell::Number(m as f64)).unwrap_or(Cell::Empty),
            record.value.map(Cell::Number).unwrap_or(Cell::Empty),
        ]);
    }
    out
}

/// Revenue-by-concept rows. The id is always the first column, summary
/// rows are dropped by keyword, and rows without an amount are dropped
/// because the table's schema does not admit null amounts.
fn revenue_table(sheet: &SheetTable, default_year: i32) -> Table {
    let mut out = Table::new(REVENUE_TABLE, REVENUE_COLUMNS);
    let value_cols = month_columns(sheet, 0, default_year);
    if value_cols.is_empty() {
        warn!("No month columns detected in sheet '{}' (ingresos)", sheet.sheet);
        return out;
    }

    for record in melt(sheet, 0, &value_cols) {
        let concepto = record.id.label();
        if is_summary_row(&concepto) {
            continue;
        }
        let Some(soles) = record.value else {
            continue;
        };
        let (anio, mes) = derive_anio_mes(&record.period);
        out.push_row(vec![
            Cell::Text(concepto),
            Cell::Text(record.period),
            anio.map(|y| Cell::Number(y as f64)).unwrap_or(Cell::Empty),
            mes.map(|m| Cell::Number(m as f64)).unwrap_or(Cell::Empty),
            Cell::Number(soles),
        ]);
    }
    out
}

fn is_summary_row(label: &str) -> bool {
    let upper = label.to_uppercase();
    REVENUE_SUMMARY_BLOCKLIST
        .iter()
        .any(|keyword| upper.contains(keyword))
}

/// Average price per (client, period): soles / MWh over the outer join
/// of the two sales tables, null when either side is missing or the
/// volume is zero.
fn price_table(mwh: &Table, soles: &Table) -> Table {
    let mut out = Table::new(PRICE_TABLE, PRICE_COLUMNS);
    if mwh.is_empty() || soles.is_empty() {
        return out;
    }

    let mut joined: BTreeMap<(String, String), (Option<f64>, Option<f64>)> = BTreeMap::new();
    for row in 0..mwh.len() {
        let key = (mwh.cell(row, "cliente").label(), mwh.cell(row, "periodo").label());
        joined.entry(key).or_default().0 = mwh.cell(row, "mwh").as_number();
    }
    for row in 0..soles.len() {
        let key = (
            soles.cell(row, "cliente").label(),
            soles.cell(row, "periodo").label(),
        );
        joined.entry(key).or_default().1 = soles.cell(row, "soles").as_number();
    }

    for ((cliente, periodo), (volume, amount)) in joined {
        let precio = match (volume, amount) {
            (Some(v), Some(a)) if v != 0.0 => Cell::Number(a / v),
            _ => Cell::Empty,
        };
        out.push_row(vec![Cell::Text(cliente), Cell::Text(periodo), precio]);
    }
    out
}
