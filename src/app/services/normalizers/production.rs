//! Historic monthly generation (one sheet per year)
//!
//! Sheets whose name starts with a four-digit year in range are read
//! one by one; the first column carries the plant label and the month
//! columns melt into one row per (plant, period). Values arrive in kWh
//! and are published in MWh.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::entity_registry::EntityRegistry;
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::reshaper::melt;
use crate::app::services::sheet_parser::{detect_header_row, SheetTable, Workbook};
use crate::constants::{
    month_token, KWH_PER_MWH, PREVIEW_ROWS_DEFAULT, PRODUCTION_EXPECTED_LABELS,
    PRODUCTION_YEAR_MAX, PRODUCTION_YEAR_MIN,
};
use crate::Result;

use tracing::warn;

pub const TABLE: &str = "generacion_mensual";
pub const KEY: &[&str] = &["central_id", "periodo"];
const COLUMNS: &[&str] = &["central_id", "central", "periodo", "energia_mwh"];

/// Correctly-shaped empty output, for when the source file is absent
pub fn empty() -> NormalizedSource {
    NormalizedSource::new(vec![Dataset::new(Table::new(TABLE, COLUMNS), KEY)], 0)
}

/// Normalize the production history workbook into `generacion_mensual`
pub fn normalize(
    workbook: &mut Workbook,
    registry: &mut EntityRegistry,
) -> Result<NormalizedSource> {
    let mut table = Table::new(TABLE, COLUMNS);
    let mut rows_in = 0;
    let mut annual_sheets = 0;

    for sheet in workbook.sheet_names() {
        let Some(year) = sheet_year(&sheet) else {
            continue;
        };
        annual_sheets += 1;

        let grid = workbook.grid(&sheet)?;
        let header_row = detect_header_row(
            grid.preview(PREVIEW_ROWS_DEFAULT),
            &[],
            PRODUCTION_EXPECTED_LABELS,
        );
        let sheet_table = grid.into_table(header_row);
        rows_in += sheet_table.row_count();
        append_year_sheet(&sheet_table, year, registry, &mut table);
    }

    if annual_sheets == 0 {
        warn!(
            "No annual sheets ({}-{}) in {}",
            PRODUCTION_YEAR_MIN,
            PRODUCTION_YEAR_MAX,
            workbook.file_name()
        );
    }

    let mut dataset = Dataset::new(table, KEY);
    dataset.dedup_on_key();
    dataset.sort_on_key();
    Ok(NormalizedSource::new(vec![dataset], rows_in))
}

/// Year encoded in the sheet name's leading four digits, when in range
fn sheet_year(name: &str) -> Option<i32> {
    let digits: String = name.trim().chars().take(4).collect();
    let year: i32 = digits.parse().ok()?;
    (PRODUCTION_YEAR_MIN..=PRODUCTION_YEAR_MAX)
        .contains(&year)
        .then_some(year)
}

/// Month columns of an annual sheet, tagged with their YYYYMM period.
/// Headers that resolve to no month (totals, notes) are not melted.
fn month_columns(sheet: &SheetTable, year: i32) -> Vec<(usize, String)> {
    sheet
        .header
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, cell)| {
            month_token(&cell.label()).map(|mm| (idx, format!("{}{}", year, mm)))
        })
        .collect()
}

fn append_year_sheet(
    sheet: &SheetTable,
    year: i32,
    registry: &mut EntityRegistry,
    table: &mut Table,
) {
    let value_cols = month_columns(sheet, year);
    if value_cols.is_empty() {
        warn!(
            "Sheet '{}' has no recognizable month columns, skipped",
            sheet.sheet
        );
        return;
    }

    for record in melt(sheet, 0, &value_cols) {
        let central = record.id.label();
        let central_id = match registry.map_label(&central) {
            Some(id) => Cell::Text(id),
            None => Cell::Empty,
        };
        let energia = match record.value {
            Some(kwh) => Cell::Number(kwh / KWH_PER_MWH),
            None => Cell::Empty,
        };
        table.push_row(vec![
            central_id,
            Cell::Text(central),
            Cell::Text(record.period),
            energia,
        ]);
    }
}
