//! Hydrology control workbook: reservoir volumes and river flow
//!
//! The workbook carries one sheet per reservoir/sub-basin (a fixed
//! allow-list of short sheet names) shaped as year rows by month
//! columns, plus a flow-rate sheet for the gauging station with the
//! same layout but a mandatory year column.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::reshaper::melt;
use crate::app::services::sheet_parser::{detect_header_row, SheetTable, Workbook};
use crate::constants::{
    month_number, FLOW_SHEET, FLOW_STATION, HYDROLOGY_HEADER_KEYWORDS, PREVIEW_ROWS_HYDROLOGY,
    VOLUME_SHEETS,
};
use crate::Result;

use tracing::{debug, warn};

pub const VOLUME_TABLE: &str = "hidro_volumen_mensual";
pub const FLOW_TABLE: &str = "hidro_caudal_mensual";
pub const VOLUME_KEY: &[&str] = &["reservorio", "periodo"];
pub const FLOW_KEY: &[&str] = &["estacion", "periodo"];
const VOLUME_COLUMNS: &[&str] = &["reservorio", "anio", "mes", "volumen_000m3", "periodo"];
const FLOW_COLUMNS: &[&str] = &["estacion", "anio", "mes", "caudal_m3s", "periodo"];

/// Correctly-shaped empty outputs, for when the source file is absent
pub fn empty() -> NormalizedSource {
    NormalizedSource::new(
        vec![
            Dataset::new(Table::new(VOLUME_TABLE, VOLUME_COLUMNS), VOLUME_KEY),
            Dataset::new(Table::new(FLOW_TABLE, FLOW_COLUMNS), FLOW_KEY),
        ],
        0,
    )
}

/// Normalize the hydrology control workbook into the volume and flow
/// tables
pub fn normalize(workbook: &mut Workbook) -> Result<NormalizedSource> {
    let mut volumen = Table::new(VOLUME_TABLE, VOLUME_COLUMNS);
    let mut caudal = Table::new(FLOW_TABLE, FLOW_COLUMNS);
    let mut rows_in = 0;

    for sheet in workbook.sheet_names() {
        let reservoir = sheet.trim().to_uppercase();
        if !VOLUME_SHEETS.contains(&reservoir.as_str()) {
            continue;
        }

        let grid = workbook.grid(&sheet)?;
        let header_row = detect_header_row(
            grid.preview(PREVIEW_ROWS_HYDROLOGY),
            HYDROLOGY_HEADER_KEYWORDS,
            &[],
        );
        let table = grid.into_table(header_row);
        if table.is_empty() {
            warn!("Sheet '{}' has no data rows, skipped", sheet);
            continue;
        }
        rows_in += table.row_count();

        // The year column is labeled "AÑO" in most releases; fall back
        // to the first column when the label is missing
        let year_col = table.position_starts_with("año").unwrap_or(0);
        append_monthly(&table, year_col, &reservoir, &mut volumen);
    }

    match flow_sheet(workbook) {
        Some(sheet) => {
            let grid = workbook.grid(&sheet)?;
            let header_row = detect_header_row(
                grid.preview(PREVIEW_ROWS_HYDROLOGY),
                HYDROLOGY_HEADER_KEYWORDS,
                &[],
            );
            let table = grid.into_table(header_row);
            rows_in += table.row_count();
            match table.position_exact("año") {
                Some(year_col) => append_monthly(&table, year_col, FLOW_STATION, &mut caudal),
                None => warn!(
                    "Sheet '{}' lacks the year column, flow series left empty",
                    sheet
                ),
            }
        }
        None => debug!("No '{}' sheet in {}", FLOW_SHEET, workbook.file_name()),
    }

    let mut datasets = Vec::new();
    for (table, key) in [(volumen, VOLUME_KEY), (caudal, FLOW_KEY)] {
        let mut dataset = Dataset::new(table, key);
        dataset.dedup_on_key();
        dataset.sort_on_key();
        datasets.push(dataset);
    }
    Ok(NormalizedSource::new(datasets, rows_in))
}

fn flow_sheet(workbook: &Workbook) -> Option<String> {
    workbook
        .sheet_names()
        .into_iter()
        .find(|s| s.trim().to_uppercase() == FLOW_SHEET)
}

/// Melt a year-by-month sheet into rows of (label, anio, mes, value,
/// periodo). Rows with a non-numeric year are dropped; blank values
/// are kept as nulls.
fn append_monthly(sheet: &SheetTable, year_col: usize, label: &str, table: &mut Table) {
    let value_cols: Vec<(usize, String)> = sheet
        .header
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != year_col)
        .filter_map(|(idx, cell)| month_number(&cell.label()).map(|mm| (idx, mm.to_string())))
        .collect();
    if value_cols.is_empty() {
        warn!("Sheet '{}' has no month columns, skipped", sheet.sheet);
        return;
    }

    for record in melt(sheet, year_col, &value_cols) {
        let Some(year) = record.id.as_number().filter(|y| y.fract() == 0.0) else {
            continue;
        };
        let periodo = format!("{}{}", year as i64, record.period);
        let value = record.value.map(Cell::Number).unwrap_or(Cell::Empty);
        table.push_row(vec![
            Cell::Text(label.to_string()),
            Cell::Number(year),
            Cell::Text(record.period),
            value,
            Cell::Text(periodo),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn volume_sheet() -> SheetTable {
        SheetTable {
            sheet: "AB".to_string(),
            header: vec![text("AÑO"), text("ENERO"), text("FEBRERO"), text("PROM")],
            rows: vec![
                vec![
                    Cell::Number(2023.0),
                    Cell::Number(150.0),
                    Cell::Number(160.5),
                    Cell::Number(155.0),
                ],
                vec![
                    Cell::Number(2024.0),
                    Cell::Number(140.0),
                    Cell::Empty,
                    Cell::Number(140.0),
                ],
                vec![text("PROMEDIO"), Cell::Number(145.0), Cell::Number(160.0), Cell::Empty],
            ],
        }
    }

    #[test]
    fn test_year_month_melt_with_period() {
        let mut table = Table::new(VOLUME_TABLE, VOLUME_COLUMNS);
        append_monthly(&volume_sheet(), 0, "AB", &mut table);

        // 2 numeric-year rows x 2 month columns; the PROM column and the
        // PROMEDIO summary row contribute nothing
        assert_eq!(table.len(), 4);
        assert_eq!(table.cell(0, "reservorio"), &text("AB"));
        assert_eq!(table.cell(0, "anio"), &Cell::Number(2023.0));
        assert_eq!(table.cell(0, "mes"), &text("01"));
        assert_eq!(table.cell(0, "periodo"), &text("202301"));
        assert_eq!(table.cell(0, "volumen_000m3"), &Cell::Number(150.0));
    }

    #[test]
    fn test_blank_values_are_kept_as_nulls() {
        let mut table = Table::new(VOLUME_TABLE, VOLUME_COLUMNS);
        append_monthly(&volume_sheet(), 0, "AB", &mut table);

        let feb_2024: Vec<&Vec<Cell>> = table
            .rows
            .iter()
            .filter(|r| r[4] == text("202402"))
            .collect();
        assert_eq!(feb_2024.len(), 1);
        assert_eq!(feb_2024[0][3], Cell::Empty);
    }

    #[test]
    fn test_year_column_found_by_prefix() {
        let sheet = SheetTable {
            sheet: "EF".to_string(),
            header: vec![text("Vol (hm3)"), text("AÑO HIDROLOGICO"), text("MARZO")],
            rows: vec![vec![Cell::Empty, Cell::Number(2022.0), Cell::Number(99.0)]],
        };
        let year_col = sheet.position_starts_with("año").unwrap_or(0);
        assert_eq!(year_col, 1);

        let mut table = Table::new(VOLUME_TABLE, VOLUME_COLUMNS);
        append_monthly(&sheet, year_col, "EF", &mut table);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "periodo"), &text("202203"));
    }

    #[test]
    fn test_flow_rows_carry_the_station() {
        let sheet = SheetTable {
            sheet: "CAUDAL".to_string(),
            header: vec![text("AÑO"), text("ABRIL")],
            rows: vec![vec![Cell::Number(2024.0), Cell::Number(12.5)]],
        };
        let mut table = Table::new(FLOW_TABLE, FLOW_COLUMNS);
        append_monthly(&sheet, 0, FLOW_STATION, &mut table);

        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "estacion"), &text("Aguada Blanca"));
        assert_eq!(table.cell(0, "caudal_m3s"), &Cell::Number(12.5));
        assert_eq!(table.cell(0, "periodo"), &text("202404"));
    }

    #[test]
    fn test_empty_output_shape() {
        let source = empty();
        assert_eq!(source.datasets.len(), 2);
        assert_eq!(source.datasets[0].name(), VOLUME_TABLE);
        assert_eq!(source.datasets[1].name(), FLOW_TABLE);
        assert!(source.datasets[0]
            .table
            .columns
            .iter()
            .any(|c| c == "periodo"));
    }
}
