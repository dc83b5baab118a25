//! Typed cell grids and header-anchored sheet tables

use crate::app::models::Cell;
use crate::constants::HEADER_SCAN_ROW_CAP;

/// One sheet as a rectangular grid of typed cells, before any header
/// interpretation
#[derive(Debug, Clone)]
pub struct RawGrid {
    /// Sheet the grid was read from
    pub sheet: String,

    /// All rows of the sheet's used range
    pub rows: Vec<Vec<Cell>>,
}

impl RawGrid {
    /// Number of rows in the used range
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when the used range has no rows at all
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first `depth` rows, for header detection and date scanning
    pub fn preview(&self, depth: usize) -> &[Vec<Cell>] {
        let depth = depth.min(HEADER_SCAN_ROW_CAP).min(self.rows.len());
        &self.rows[..depth]
    }

    /// Split the grid at a header row, producing a labeled table.
    ///
    /// The header keeps its native cell types so date-typed month headers
    /// stay recognizable. Rows above the header are discarded.
    pub fn into_table(self, header_row: usize) -> SheetTable {
        let mut iter = self.rows.into_iter().skip(header_row);
        let header = iter.next().unwrap_or_default();
        let width = header.len();
        let rows = iter
            .map(|mut row| {
                row.resize(width.max(row.len()), Cell::Empty);
                row
            })
            .collect();
        SheetTable {
            sheet: self.sheet,
            header,
            rows,
        }
    }
}

/// A sheet with its header row identified and the data rows below it
#[derive(Debug, Clone)]
pub struct SheetTable {
    /// Sheet this table came from
    pub sheet: String,

    /// Header cells, native types preserved
    pub header: Vec<Cell>,

    /// Data rows below the header
    pub rows: Vec<Vec<Cell>>,
}

impl SheetTable {
    /// Number of data rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when no data rows follow the header
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of header columns
    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// Header labels as trimmed strings
    pub fn header_labels(&self) -> Vec<String> {
        self.header.iter().map(|c| c.label()).collect()
    }

    /// Position of the first header cell equal to `label`
    /// (case-insensitive)
    pub fn position_exact(&self, label: &str) -> Option<usize> {
        let needle = label.trim().to_lowercase();
        self.header
            .iter()
            .position(|c| c.label().to_lowercase() == needle)
    }

    /// Position of the first header cell whose label starts with `prefix`
    /// (case-insensitive)
    pub fn position_starts_with(&self, prefix: &str) -> Option<usize> {
        let needle = prefix.trim().to_lowercase();
        self.header
            .iter()
            .position(|c| c.label().to_lowercase().starts_with(&needle))
    }

    /// Position of the first header cell whose label contains `needle`
    /// (case-insensitive)
    pub fn position_contains(&self, needle: &str) -> Option<usize> {
        let needle = needle.trim().to_lowercase();
        self.header
            .iter()
            .position(|c| c.label().to_lowercase().contains(&needle))
    }

    /// Cell at (data row, column), blank when out of bounds
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&Cell::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn sample_grid() -> RawGrid {
        RawGrid {
            sheet: "2010".to_string(),
            rows: vec![
                vec![Cell::Empty, Cell::Empty, Cell::Empty],
                vec![text("CENTRAL"), text("ENERO"), text("FEBRERO")],
                vec![text("CH1"), Cell::Number(1000.0), Cell::Number(2000.0)],
                vec![text("CH2"), Cell::Number(500.0), Cell::Empty],
            ],
        }
    }

    #[test]
    fn test_preview_is_capped() {
        let grid = sample_grid();
        assert_eq!(grid.preview(2).len(), 2);
        assert_eq!(grid.preview(100).len(), 4);
    }

    #[test]
    fn test_into_table_splits_at_header() {
        let table = sample_grid().into_table(1);
        assert_eq!(table.sheet, "2010");
        assert_eq!(table.header_labels(), vec!["CENTRAL", "ENERO", "FEBRERO"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 0).label(), "CH1");
        assert_eq!(table.cell(1, 2), &Cell::Empty);
    }

    #[test]
    fn test_into_table_past_end_is_empty() {
        let table = sample_grid().into_table(10);
        assert!(table.header.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_position_lookups() {
        let table = sample_grid().into_table(1);
        assert_eq!(table.position_exact("central"), Some(0));
        assert_eq!(table.position_exact("CENTRAL"), Some(0));
        assert_eq!(table.position_starts_with("ene"), Some(1));
        assert_eq!(table.position_contains("BRER"), Some(2));
        assert_eq!(table.position_exact("missing"), None);
    }

    #[test]
    fn test_cell_out_of_bounds_is_blank() {
        let table = sample_grid().into_table(1);
        assert_eq!(table.cell(99, 0), &Cell::Empty);
        assert_eq!(table.cell(0, 99), &Cell::Empty);
    }
}
