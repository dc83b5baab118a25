//! Daily reservoir report (the "INFORMEDIARIO" sheet)
//!
//! The report date lives in free-text cells, not a structured column,
//! and is extracted with an ordered set of patterns; when several
//! candidates appear anywhere in the preview region the latest one
//! wins. Metric columns are mapped by position after the reservoir
//! column because the header text is unreliable release-to-release.

use crate::app::models::{Cell, Dataset, Table};
use crate::app::services::normalizers::NormalizedSource;
use crate::app::services::sheet_parser::{detect_header_row, RawGrid, Workbook};
use crate::constants::{
    month_number, PREVIEW_ROWS_RESERVOIR, RESERVOIR_HEADER_KEYWORDS,
    RESERVOIR_POSITIONAL_METRICS, RESERVOIR_SHEET,
};
use crate::{Error, Result};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::warn;

pub const TABLE: &str = "represas_diario";
pub const KEY: &[&str] = &["fecha", "reservorio"];

fn output_columns() -> Vec<&'static str> {
    let mut columns = vec!["fecha", "reservorio"];
    columns.extend_from_slice(RESERVOIR_POSITIONAL_METRICS);
    columns
}

/// Correctly-shaped empty output, for when the source file is absent
pub fn empty() -> NormalizedSource {
    NormalizedSource::new(
        vec![Dataset::new(Table::new(TABLE, &output_columns()), KEY)],
        0,
    )
}

/// Normalize the daily reservoir workbook into `represas_diario`.
///
/// This source is required and the report is its only sheet, so a
/// missing sheet or an unrecognizable structure aborts the run.
pub fn normalize(workbook: &mut Workbook) -> Result<NormalizedSource> {
    let file = workbook.file_name();
    let Some(sheet) = workbook
        .sheet_names()
        .into_iter()
        .find(|s| s.trim().to_uppercase() == RESERVOIR_SHEET)
    else {
        return Err(Error::sheet_parsing(
            file,
            RESERVOIR_SHEET,
            "sheet not found in workbook",
        ));
    };
    let grid = workbook.grid(&sheet)?;
    normalize_grid(grid, &file)
}

fn normalize_grid(grid: RawGrid, file: &str) -> Result<NormalizedSource> {
    let report_date = report_date(grid.preview(PREVIEW_ROWS_RESERVOIR));
    if report_date.is_none() {
        warn!(
            "No report date found in sheet '{}' of {}, rows will carry a null date",
            grid.sheet, file
        );
    }
    let fecha = report_date.map(Cell::Date).unwrap_or(Cell::Empty);

    let header_row = header_row(grid.preview(PREVIEW_ROWS_RESERVOIR));
    let sheet = grid.sheet.clone();
    let table = grid.into_table(header_row);
    let rows_in = table.row_count();

    let Some(reservoir_col) = table.position_contains("represa") else {
        return Err(Error::sheet_parsing(
            file,
            sheet,
            "no reservoir column in detected header",
        ));
    };

    let mut out = Table::new(TABLE, &output_columns());
    for row in &table.rows {
        let reservorio = row
            .get(reservoir_col)
            .map(|c| c.label())
            .unwrap_or_default();
        if reservorio.is_empty() {
            continue;
        }
        let mut cells = vec![fecha.clone(), Cell::Text(reservorio)];
        for offset in 1..=RESERVOIR_POSITIONAL_METRICS.len() {
            let value = row
                .get(reservoir_col + offset)
                .and_then(|c| c.as_number())
                .map(Cell::Number)
                .unwrap_or(Cell::Empty);
            cells.push(value);
        }
        out.push_row(cells);
    }

    let mut dataset = Dataset::new(out, KEY);
    dataset.dedup_on_key();
    dataset.sort_on_key();
    Ok(NormalizedSource::new(vec![dataset], rows_in))
}

/// Header row: the row holding a literal "REPRESA" cell next to a
/// capacity label, with the generic detector as fallback
fn header_row(preview: &[Vec<Cell>]) -> usize {
    for (idx, row) in preview.iter().enumerate() {
        let labels: Vec<String> = row
            .iter()
            .filter(|c| !c.is_blank())
            .map(|c| c.label().to_uppercase())
            .collect();
        let exact = labels.iter().any(|l| l == "REPRESA");
        let capacity = labels.iter().any(|l| l.contains("CAPACIDAD"));
        if exact && capacity {
            return idx;
        }
    }
    detect_header_row(preview, RESERVOIR_HEADER_KEYWORDS, &[])
}

/// Extract the report date from the free-text cells of the preview.
///
/// Patterns, in order: ISO-like numeric dates, the "AL <day> DE
/// <month> DE <year>" phrasing, then plain day-month-year in Spanish.
/// All candidates are collected and the latest wins.
fn report_date(preview: &[Vec<Cell>]) -> Option<NaiveDateTime> {
    let iso = Regex::new(r"(\d{4})[./-](\d{1,2})[./-](\d{1,2})").unwrap();
    let al = Regex::new(r"(?i)\bAL\s+(\d{1,2})\s+DE\s+([A-ZÁÉÍÓÚÑ]+)\s+DE\s+(\d{4})").unwrap();
    let spelled = Regex::new(r"(?i)\b(\d{1,2})\s+DE\s+([A-ZÁÉÍÓÚÑ]+)\s+DE\s+(\d{4})").unwrap();

    let mut latest: Option<NaiveDate> = None;
    let mut consider = |candidate: Option<NaiveDate>| {
        if let Some(date) = candidate {
            latest = Some(latest.map_or(date, |best| best.max(date)));
        }
    };

    for row in preview {
        for cell in row {
            let Cell::Text(text) = cell else { continue };
            for caps in iso.captures_iter(text) {
                consider(ymd(&caps[1], &caps[2], &caps[3]));
            }
            for caps in al.captures_iter(text) {
                consider(spelled_ymd(&caps[1], &caps[2], &caps[3]));
            }
            for caps in spelled.captures_iter(text) {
                consider(spelled_ymd(&caps[1], &caps[2], &caps[3]));
            }
        }
    }

    latest.and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn spelled_ymd(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let month: u32 = month_number(month)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn report_grid() -> RawGrid {
        RawGrid {
            sheet: "INFORMEDIARIO".to_string(),
            rows: vec![
                vec![text("INFORME DIARIO DE REPRESAS"), Cell::Empty],
                vec![text("AL 11 DE DICIEMBRE DE 2025"), text("rev. 2024.12.10")],
                vec![
                    text("REPRESA"),
                    text("CAPACIDAD (hm3)"),
                    text("VOL"),
                    text("%"),
                ],
                vec![
                    text("AGUADA BLANCA"),
                    Cell::Number(30.4),
                    Cell::Number(25.1),
                    Cell::Number(82.5),
                ],
                vec![
                    text("EL FRAILE"),
                    Cell::Number(127.2),
                    Cell::Empty,
                    Cell::Empty,
                ],
                vec![Cell::Empty, Cell::Number(999.0), Cell::Empty, Cell::Empty],
            ],
        }
    }

    #[test]
    fn test_latest_date_candidate_wins() {
        let grid = report_grid();
        let date = report_date(grid.preview(80)).unwrap();
        assert_eq!(
            date.date(),
            NaiveDate::from_ymd_opt(2025, 12, 11).unwrap()
        );
    }

    #[test]
    fn test_iso_separator_variants() {
        for raw in ["2024-03-05", "2024/03/05", "2024.3.5"] {
            let preview = vec![vec![text(raw)]];
            let date = report_date(&preview).unwrap();
            assert_eq!(date.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        }
    }

    #[test]
    fn test_invalid_numeric_dates_are_ignored() {
        let preview = vec![vec![text("codigo 2024.13.40 interno")]];
        assert!(report_date(&preview).is_none());
    }

    #[test]
    fn test_spelled_date_without_al_prefix() {
        let preview = vec![vec![text("Arequipa, 9 de marzo de 2024")]];
        let date = report_date(&preview).unwrap();
        assert_eq!(date.date(), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn test_positional_metrics_after_reservoir_column() {
        let source = normalize_grid(report_grid(), "BDREPRESAS.xlsx").unwrap();
        let table = &source.datasets[0].table;

        assert_eq!(
            table.columns,
            vec!["fecha", "reservorio", "volumen_actual", "pct_llenado"]
        );
        // Blank-name row dropped, the two reservoirs kept
        assert_eq!(table.len(), 2);

        let aguada: &Vec<Cell> = table
            .rows
            .iter()
            .find(|r| r[1] == text("AGUADA BLANCA"))
            .unwrap();
        // First metric after the name column is the capacity cell
        assert_eq!(aguada[2], Cell::Number(30.4));
        assert_eq!(aguada[3], Cell::Number(25.1));
        assert!(matches!(aguada[0], Cell::Date(_)));
    }

    #[test]
    fn test_missing_reservoir_column_is_fatal() {
        let grid = RawGrid {
            sheet: "INFORMEDIARIO".to_string(),
            rows: vec![
                vec![text("EMBALSE"), text("VOL")],
                vec![text("AGUADA BLANCA"), Cell::Number(25.1)],
            ],
        };
        let err = normalize_grid(grid, "BDREPRESAS.xlsx").unwrap_err();
        match err {
            Error::SheetParsing { sheet, .. } => assert_eq!(sheet, "INFORMEDIARIO"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_date_yields_null_fecha() {
        let grid = RawGrid {
            sheet: "INFORMEDIARIO".to_string(),
            rows: vec![
                vec![text("REPRESA"), text("CAPACIDAD"), text("VOL")],
                vec![text("EL PAÑE"), Cell::Number(99.6), Cell::Number(12.0)],
            ],
        };
        let source = normalize_grid(grid, "BDREPRESAS.xlsx").unwrap();
        let table = &source.datasets[0].table;
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "fecha"), &Cell::Empty);
    }
}
