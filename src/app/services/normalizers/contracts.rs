//! Contract registry workbook (base portfolio and risk sheets)
//!
//! Source headers drift between releases ("TIPO DE CONTRATO", "Tipo
//! Contrato", bare "TIPO"), so columns are matched against an ordered
//! fragment dictionary, longest fragment first, with per-table config
//! renames taking precedence. The whole source is optional; a missing
//! file or sheet degrades to an empty table of the canonical shape.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::sheet_parser::{detect_header_row, SheetTable, Workbook};
use crate::config::{Config, SourceSpec};
use crate::constants::{CONTRACT_HEADER_KEYWORDS, CONTRACT_RENAMES, PREVIEW_ROWS_DEFAULT};
use crate::Result;

use std::collections::HashMap;
use tracing::warn;

pub const BASE_TABLE: &str = "contratos_base";
pub const RISK_TABLE: &str = "contratos_riesgo";
pub const KEY: &[&str] = &["cliente", "fecha_inicio"];

const COLUMNS: &[&str] = &[
    "cliente",
    "tipo_contrato",
    "fecha_inicio",
    "fecha_fin",
    "potencia_mw",
    "precio_hp_usd_mwh",
    "precio_fp_usd_mwh",
];

/// Correctly-shaped empty outputs, for when the source file is absent
pub fn empty() -> NormalizedSource {
    NormalizedSource::new(
        vec![
            Dataset::new(Table::new(BASE_TABLE, COLUMNS), KEY),
            Dataset::new(Table::new(RISK_TABLE, COLUMNS), KEY),
        ],
        0,
    )
}

/// Normalize the contract workbook into `contratos_base` and
/// `contratos_riesgo`
pub fn normalize(
    workbook: &mut Workbook,
    spec: &SourceSpec,
    config: &Config,
) -> Result<NormalizedSource> {
    let mut rows_in = 0;
    let mut datasets = Vec::new();

    for (role, fallback, name) in [
        ("base", "CONTRATOS BASE DATOS", BASE_TABLE),
        ("riesgo", "RIESGO", RISK_TABLE),
    ] {
        let renames = config.table_rules(name).rename;
        let mut table = Table::new(name, COLUMNS);

        let candidates = spec.sheet_candidates(role, &[fallback]);
        match workbook.find_sheet_among(&candidates) {
            Some(sheet) => {
                let grid = workbook.grid(&sheet)?;
                let header_row = detect_header_row(
                    grid.preview(PREVIEW_ROWS_DEFAULT),
                    CONTRACT_HEADER_KEYWORDS,
                    &[],
                );
                let sheet_table = grid.into_table(header_row);
                rows_in += sheet_table.row_count();
                append_contracts(&sheet_table, &renames, &mut table);
            }
            None => {
                warn!(
                    "No sheet matching {:?} in {}, writing empty {}",
                    candidates,
                    workbook.file_name(),
                    name
                );
            }
        }

        let mut dataset = Dataset::new(table, KEY);
        dataset.dedup_on_key();
        dataset.sort_on_key();
        datasets.push(dataset);
    }

    Ok(NormalizedSource::new(datasets, rows_in))
}

/// Resolve a source header to its canonical column name.
///
/// Config renames match the whole label; the built-in dictionary
/// matches by contained fragment, longest first.
fn canonical_column(label: &str, renames: &HashMap<String, String>) -> Option<String> {
    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return None;
    }
    if let Some(target) = renames
        .iter()
        .find(|(source, _)| source.trim().to_lowercase() == label)
        .map(|(_, target)| target.clone())
    {
        return Some(target);
    }
    CONTRACT_RENAMES
        .iter()
        .find(|(fragment, _)| label.contains(fragment))
        .map(|(_, target)| target.to_string())
}

/// Source column index per canonical column, first match wins
fn column_map(sheet: &SheetTable, renames: &HashMap<String, String>) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, cell) in sheet.header.iter().enumerate() {
        if let Some(target) = canonical_column(&cell.label(), renames) {
            map.entry(target).or_insert(idx);
        }
    }
    map
}

fn append_contracts(sheet: &SheetTable, renames: &HashMap<String, String>, table: &mut Table) {
    let columns = column_map(sheet, renames);
    let Some(&cliente_col) = columns.get("cliente") else {
        warn!("No client column in sheet '{}', skipped", sheet.sheet);
        return;
    };

    for row in &sheet.rows {
        let cliente = row.get(cliente_col).map(|c| c.label()).unwrap_or_default();
        if cliente.is_empty() {
            continue;
        }

        let fetch = |name: &str| columns.get(name).and_then(|&idx| row.get(idx));
        let text_cell = |name: &str| match fetch(name) {
            Some(cell) if !cell.is_blank() => Cell::Text(cell.label()),
            _ => Cell::Empty,
        };
        let date_cell = |name: &str| {
            fetch(name)
                .and_then(|c| c.as_date())
                .map(Cell::Date)
                .unwrap_or(Cell::Empty)
        };
        let number_cell = |name: &str| {
            fetch(name)
                .and_then(|c| c.as_number())
                .map(Cell::Number)
                .unwrap_or(Cell::Empty)
        };

        table.push_row(vec![
            Cell::Text(cliente),
            text_cell("tipo_contrato"),
            date_cell("fecha_inicio"),
            date_cell("fecha_fin"),
            number_cell("potencia_mw"),
            number_cell("precio_hp_usd_mwh"),
            number_cell("precio_fp_usd_mwh"),
        ]);
    }
}
