//! Wide-to-long reshaping of month-column sheets
//!
//! Source sheets carry one row per entity and one column per period.
//! `melt` turns that layout into one record per (entity, period) pair,
//! leaving period resolution to the caller: each value column arrives
//! already tagged with its period label.

use crate::app::models::Cell;
use crate::app::services::sheet_parser::SheetTable;
use crate::constants::month_number;
use chrono::Datelike;

/// One melted record: the id cell, the period label of the source
/// column, and the numeric value (None when blank or unparseable,
/// never silently zero)
#[derive(Debug, Clone, PartialEq)]
pub struct MeltedRow {
    /// Id-column cell of the source row (entity, year, concept...)
    pub id: Cell,

    /// Period label the value column resolved to
    pub period: String,

    /// Measurement value; unparseable source cells become None
    pub value: Option<f64>,
}

/// Melt a sheet table into long format.
///
/// Emits one record per (data row, value column) pair. Rows whose id
/// cell is blank are dropped entirely; every surviving row contributes
/// exactly one record per value column, so the output length is always
/// `rows_with_id * value_columns` before any caller-side filtering.
pub fn melt(table: &SheetTable, id_col: usize, value_cols: &[(usize, String)]) -> Vec<MeltedRow> {
    let mut records = Vec::new();
    for row in &table.rows {
        let id = row.get(id_col).cloned().unwrap_or(Cell::Empty);
        if id.is_blank() {
            continue;
        }
        for (col, period) in value_cols {
            let value = row.get(*col).and_then(|cell| cell.as_number());
            records.push(MeltedRow {
                id: id.clone(),
                period: period.clone(),
                value,
            });
        }
    }
    records
}

/// Canonical form of a period value: integer-rendered, trimmed, a
/// trailing ".0" stripped, five-digit values left-padded to six.
pub fn canonical_periodo(cell: &Cell) -> Option<String> {
    let label = cell.label();
    let label = label.strip_suffix(".0").unwrap_or(&label).trim().to_string();
    if label.is_empty() {
        return None;
    }
    if label.len() == 5 && label.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("0{}", label));
    }
    Some(label)
}

/// Resolve a month-column header to a YYYYMM period.
///
/// Date-typed headers carry their own year; plain Spanish month names
/// borrow `default_year`.
pub fn periodo_from_header(cell: &Cell, default_year: i32) -> Option<String> {
    if let Cell::Date(dt) = cell {
        return Some(format!("{:04}{:02}", dt.year(), dt.month()));
    }
    let label = cell.label();
    month_number(&label).map(|mm| format!("{}{}", default_year, mm))
}

/// Derive (anio, mes) from a canonical YYYYMM period
pub fn derive_anio_mes(periodo: &str) -> (Option<i32>, Option<u32>) {
    if periodo.len() != 6 || !periodo.chars().all(|c| c.is_ascii_digit()) {
        return (None, None);
    }
    (periodo[..4].parse().ok(), periodo[4..].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn sample_table() -> SheetTable {
        SheetTable {
            sheet: "2010".to_string(),
            header: vec![text("CENTRAL"), text("ENERO"), text("FEBRERO")],
            rows: vec![
                vec![text("CH1"), Cell::Number(1000.0), Cell::Number(2000.0)],
                vec![Cell::Empty, Cell::Number(99.0), Cell::Number(99.0)],
                vec![text("CH2"), text("s/d"), Cell::Empty],
                vec![text("CT1"), Cell::Number(500.0), Cell::Number(600.0)],
            ],
        }
    }

    #[test]
    fn test_melt_emits_rows_times_columns() {
        let table = sample_table();
        let cols = vec![(1, "201001".to_string()), (2, "201002".to_string())];
        let melted = melt(&table, 0, &cols);
        // 3 rows with an id (the blank-id row is dropped) x 2 columns
        assert_eq!(melted.len(), 6);
        assert!(melted.iter().all(|r| !r.id.is_blank()));
    }

    #[test]
    fn test_melt_unparseable_values_become_none() {
        let table = sample_table();
        let cols = vec![(1, "201001".to_string()), (2, "201002".to_string())];
        let melted = melt(&table, 0, &cols);
        let ch2: Vec<&MeltedRow> = melted.iter().filter(|r| r.id.label() == "CH2").collect();
        assert_eq!(ch2.len(), 2);
        assert_eq!(ch2[0].value, None);
        assert_eq!(ch2[1].value, None);
    }

    #[test]
    fn test_melt_keeps_period_labels() {
        let table = sample_table();
        let cols = vec![(2, "201002".to_string())];
        let melted = melt(&table, 0, &cols);
        assert_eq!(melted[0].period, "201002");
        assert_eq!(melted[0].value, Some(2000.0));
    }

    #[test]
    fn test_canonical_periodo() {
        assert_eq!(
            canonical_periodo(&Cell::Number(202501.0)).as_deref(),
            Some("202501")
        );
        assert_eq!(
            canonical_periodo(&text("202502 ")).as_deref(),
            Some("202502")
        );
        assert_eq!(
            canonical_periodo(&text("202503.0")).as_deref(),
            Some("202503")
        );
        // Five digits are zero-padded, nothing else is touched
        assert_eq!(canonical_periodo(&text("25004")).as_deref(), Some("025004"));
        assert_eq!(canonical_periodo(&text("2025")).as_deref(), Some("2025"));
        assert_eq!(canonical_periodo(&Cell::Empty), None);
    }

    #[test]
    fn test_periodo_from_header() {
        let date_header = Cell::Date(
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        assert_eq!(
            periodo_from_header(&date_header, 2025).as_deref(),
            Some("202403")
        );
        assert_eq!(
            periodo_from_header(&text("ENERO"), 2025).as_deref(),
            Some("202501")
        );
        assert_eq!(
            periodo_from_header(&text("Setiembre"), 2025).as_deref(),
            Some("202509")
        );
        assert_eq!(periodo_from_header(&text("TOTAL"), 2025), None);
    }

    #[test]
    fn test_derive_anio_mes() {
        assert_eq!(derive_anio_mes("202501"), (Some(2025), Some(1)));
        assert_eq!(derive_anio_mes("201012"), (Some(2010), Some(12)));
        assert_eq!(derive_anio_mes("2025"), (None, None));
        assert_eq!(derive_anio_mes("2025-1"), (None, None));
    }
}
