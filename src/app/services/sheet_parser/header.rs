//! Header-row detection inside loosely structured sheets
//!
//! Source workbooks bury their column headers under title rows, logos and
//! blank padding. `detect_header_row` scans a preview of the sheet and
//! returns the first row that looks like the header, falling back to row 0.

use crate::app::models::Cell;
use crate::constants::HEADER_SCAN_ROW_CAP;

/// Fraction of expected labels that must appear in a row for it to count
/// as the header
const EXPECTED_MATCH_RATIO: f64 = 0.6;

/// Locate the header row inside a sheet preview.
///
/// Two match modes, tried per row in this order:
/// - `keywords`: the row matches when *every* keyword appears
///   case-insensitively as a substring of some non-blank cell or of the
///   whole row text joined with spaces (covers labels split across
///   merged cells).
/// - `expected_labels`: the row matches when at least 60% of the labels
///   appear as exact case-insensitive cell values.
///
/// The first matching row wins. Never fails: with no match the header is
/// assumed at row 0.
pub fn detect_header_row(preview: &[Vec<Cell>], keywords: &[&str], expected_labels: &[&str]) -> usize {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let expected: Vec<String> = expected_labels
        .iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();

    for (idx, row) in preview.iter().take(HEADER_SCAN_ROW_CAP).enumerate() {
        let values: Vec<String> = row
            .iter()
            .filter(|c| !c.is_blank())
            .map(|c| c.label().to_lowercase())
            .collect();
        let row_text = values.join(" ");

        if !keywords.is_empty() {
            let all_present = keywords
                .iter()
                .all(|kw| values.iter().any(|v| v.contains(kw)) || row_text.contains(kw));
            if all_present {
                return idx;
            }
        }

        if !expected.is_empty() {
            let found = expected
                .iter()
                .filter(|e| values.iter().any(|v| v == *e))
                .count();
            if found as f64 / expected.len() as f64 >= EXPECTED_MATCH_RATIO {
                return idx;
            }
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn row(labels: &[&str]) -> Vec<Cell> {
        labels
            .iter()
            .map(|l| {
                if l.is_empty() {
                    Cell::Empty
                } else {
                    text(l)
                }
            })
            .collect()
    }

    #[test]
    fn test_keywords_find_header_below_title_rows() {
        let preview = vec![
            row(&["EGASA", "", ""]),
            row(&["", "", ""]),
            row(&["CLIENTE", "ENERO", "FEBRERO"]),
            row(&["SEAL", "10", "20"]),
        ];
        assert_eq!(detect_header_row(&preview, &["cliente", "ene"], &[]), 2);
    }

    #[test]
    fn test_first_matching_row_wins() {
        let preview = vec![
            row(&["CLIENTE", "ENERO"]),
            row(&["CLIENTE", "ENERO"]),
        ];
        assert_eq!(detect_header_row(&preview, &["cliente", "ene"], &[]), 0);
    }

    #[test]
    fn test_keyword_spanning_merged_cells_matches_row_text() {
        // A label split across two cells is still found in the joined text
        let preview = vec![
            row(&["", "", ""]),
            row(&["AÑO", "HIDROLOGICO", "ENERO"]),
        ];
        assert_eq!(
            detect_header_row(&preview, &["año hidrologico", "ene"], &[]),
            1
        );
    }

    #[test]
    fn test_expected_labels_ratio() {
        let preview = vec![
            row(&["Informe mensual", "", ""]),
            row(&["Central", "Total", "Observaciones"]),
        ];
        // 2 of 2 expected labels present
        assert_eq!(detect_header_row(&preview, &[], &["Central", "Total"]), 1);
        // 1 of 3 expected labels is below the 0.6 threshold
        assert_eq!(
            detect_header_row(&preview, &[], &["Central", "Planta", "Unidad"]),
            0
        );
    }

    #[test]
    fn test_no_match_defaults_to_first_row() {
        let preview = vec![row(&["a", "b"]), row(&["c", "d"])];
        assert_eq!(detect_header_row(&preview, &["zzz"], &[]), 0);
        assert_eq!(detect_header_row(&preview, &[], &[]), 0);
        assert_eq!(detect_header_row(&[], &["cliente"], &[]), 0);
    }

    #[test]
    fn test_numeric_header_cells_participate() {
        // Year headers are often numeric cells, not text
        let preview = vec![vec![
            text("AÑO"),
            Cell::Number(2024.0),
            Cell::Number(2025.0),
        ]];
        assert_eq!(detect_header_row(&preview, &["año", "2024"], &[]), 0);
    }
}
