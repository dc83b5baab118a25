//! Data models for spreadsheet normalization
//!
//! This module contains the core data structures shared by every source
//! normalizer: a typed spreadsheet cell, an in-memory column/row table,
//! and the dataset wrapper that pairs a table with its natural key.

use crate::constants::{MART_DATETIME_FORMAT, MART_DATE_FORMAT};
use calamine::Data;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Cell Value
// =============================================================================

/// A single spreadsheet cell after type coercion.
///
/// Source workbooks mix numeric, text and date-typed cells freely, even
/// within one column. `Cell` keeps the distinction so each normalizer can
/// decide how to interpret a value instead of round-tripping everything
/// through strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Numeric value (integers are widened to f64)
    Number(f64),

    /// Text value, kept verbatim apart from surrounding whitespace checks
    Text(String),

    /// Date or timestamp value
    Date(NaiveDateTime),

    /// Blank cell
    Empty,
}

/// Datetime layouts accepted when parsing text cells
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Date-only layouts accepted when parsing text cells
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

impl Cell {
    /// Convert a raw calamine cell into a typed `Cell`.
    ///
    /// Whitespace-only strings collapse to [`Cell::Empty`]; error cells
    /// (`#N/A`, `#DIV/0!` and friends) are treated as blank.
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Error(_) => Cell::Empty,
            Data::Int(n) => Cell::Number(*n as f64),
            Data::Float(n) => Cell::Number(*n),
            Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            Data::String(s) => {
                if s.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.clone())
                }
            }
            Data::DateTime(dt) => match from_excel_serial(dt.as_f64()) {
                Some(parsed) => Cell::Date(parsed),
                None => Cell::Empty,
            },
            Data::DateTimeIso(s) => match parse_datetime_flexible(s) {
                Some(parsed) => Cell::Date(parsed),
                None => Cell::Text(s.clone()),
            },
            Data::DurationIso(s) => Cell::Text(s.clone()),
        }
    }

    /// Re-type a CSV field read back from a previously written mart file
    pub fn from_csv_field(field: &str) -> Self {
        if field.trim().is_empty() {
            return Cell::Empty;
        }
        if let Some(dt) = parse_datetime_flexible(field) {
            return Cell::Date(dt);
        }
        if let Ok(n) = field.trim().parse::<f64>() {
            return Cell::Number(n);
        }
        Cell::Text(field.to_string())
    }

    /// Numeric view of the cell.
    ///
    /// Text cells are parsed after trimming; anything unparseable is `None`,
    /// never silently zero.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            Cell::Date(_) | Cell::Empty => None,
        }
    }

    /// Datetime view of the cell.
    ///
    /// Numbers are interpreted as Excel serial dates, text cells go through
    /// the flexible format list.
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Date(dt) => Some(*dt),
            Cell::Number(n) => from_excel_serial(*n),
            Cell::Text(s) => parse_datetime_flexible(s),
            Cell::Empty => None,
        }
    }

    /// Label view of the cell, used for identifier columns and header rows.
    ///
    /// Integer-valued numbers render without a decimal point so "2024.0"
    /// headers and "1.0" plant codes come out as "2024" and "1".
    pub fn label(&self) -> String {
        match self {
            Cell::Text(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }

    /// True for blank cells and whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Total ordering across cell variants
    ///
    /// Blanks sort first, then numbers, text, dates; values compare
    /// naturally within a variant.
    pub fn compare(a: &Cell, b: &Cell) -> Ordering {
        fn rank(cell: &Cell) -> u8 {
            match cell {
                Cell::Empty => 0,
                Cell::Number(_) => 1,
                Cell::Text(_) => 2,
                Cell::Date(_) => 3,
            }
        }
        match (a, b) {
            (Cell::Number(x), Cell::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
            (Cell::Date(x), Cell::Date(y)) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Cell::Date(dt) => {
                if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
                    write!(f, "{}", dt.format(MART_DATE_FORMAT))
                } else {
                    write!(f, "{}", dt.format(MART_DATETIME_FORMAT))
                }
            }
        }
    }
}

/// Convert an Excel 1900-system serial number to a datetime.
///
/// Serials below 60 predate the fictitious 1900-02-29 that Excel carries
/// for Lotus compatibility and need a one-day shift.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 3_000_000.0 {
        return None;
    }
    let days = serial.trunc() as u64;
    let days = if days >= 60 { days } else { days + 1 };
    let date = NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(chrono::Days::new(days))?;

    let mut seconds = (serial.fract() * 86_400.0).round() as u32;
    let date = if seconds >= 86_400 {
        seconds = 0;
        date.checked_add_days(chrono::Days::new(1))?
    } else {
        date
    };
    date.and_hms_opt(seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

/// Parse a text timestamp using the accepted mart and source layouts
pub fn parse_datetime_flexible(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

// =============================================================================
// Table
// =============================================================================

/// An in-memory table with named columns and typed rows.
///
/// This is the common currency between the sheet parser, the normalizers,
/// the partition merger and the writer. Rows are padded to the column
/// count on insertion, so positional access is always in bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Dataset name, also the mart file stem (e.g. "ventas_mensual_mwh")
    pub name: String,

    /// Column names in output order
    pub columns: Vec<String>,

    /// Row-major data
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Position of a column, appending it (and padding existing rows)
    /// when absent
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Empty);
        }
        self.columns.len() - 1
    }

    /// Append a row, padding or truncating it to the column count
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    /// Cell at (row, column name), blank when the column is missing
    pub fn cell(&self, row: usize, column: &str) -> &Cell {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .unwrap_or(&Cell::Empty)
    }

    /// Composite key of one row over the given column indices
    pub fn key_of(row: &[Cell], key_indices: &[usize]) -> String {
        let mut key = String::new();
        for idx in key_indices {
            if !key.is_empty() {
                key.push('\u{1f}');
            }
            if let Some(cell) = row.get(*idx) {
                key.push_str(&cell.label());
            }
        }
        key
    }

    /// Resolve key column names to indices, skipping columns the table
    /// does not have
    pub fn key_indices(&self, key_columns: &[String]) -> Vec<usize> {
        key_columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect()
    }

    /// Drop duplicate rows over the key columns, keeping the last
    /// occurrence in its original position. Returns the number of rows
    /// removed.
    pub fn dedup_keep_last(&mut self, key_columns: &[String]) -> usize {
        let key_indices = self.key_indices(key_columns);
        if key_indices.is_empty() || self.rows.len() < 2 {
            return 0;
        }

        let mut last_seen: HashMap<String, usize> = HashMap::new();
        for (idx, row) in self.rows.iter().enumerate() {
            last_seen.insert(Self::key_of(row, &key_indices), idx);
        }
        if last_seen.len() == self.rows.len() {
            return 0;
        }

        let before = self.rows.len();
        let mut idx = 0;
        self.rows.retain(|row| {
            let keep = last_seen[&Self::key_of(row, &key_indices)] == idx;
            idx += 1;
            keep
        });
        before - self.rows.len()
    }

    /// Stable sort by the given columns, in order
    pub fn sort_by_columns(&mut self, sort_columns: &[String]) {
        let indices = self.key_indices(sort_columns);
        if indices.is_empty() {
            return;
        }
        self.rows.sort_by(|a, b| {
            for idx in &indices {
                let ord = Cell::compare(&a[*idx], &b[*idx]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    /// Count cells considered missing (blank cells in any column)
    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|c| c.is_blank()).count())
            .sum()
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// A normalized table together with its natural key and the quality
/// alerts raised while building it.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// The normalized table, ready for validation and writing
    pub table: Table,

    /// Natural key columns; also the output sort order
    pub key_columns: Vec<String>,

    /// Quality alerts accumulated during normalization
    /// (e.g. "columnas_no_detectadas", "duplicados:3")
    pub alerts: Vec<String>,
}

impl Dataset {
    /// Wrap a table with its natural key
    pub fn new(table: Table, key_columns: &[&str]) -> Self {
        Self {
            table,
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            alerts: Vec::new(),
        }
    }

    /// Record a quality alert
    pub fn push_alert(&mut self, alert: impl Into<String>) {
        self.alerts.push(alert.into());
    }

    /// Dataset name (the table name)
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// True when the underlying table has no rows
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Deduplicate on the natural key (last occurrence wins) and record
    /// a "duplicados:N" alert when rows were dropped
    pub fn dedup_on_key(&mut self) {
        let key_columns = self.key_columns.clone();
        let dropped = self.table.dedup_keep_last(&key_columns);
        if dropped > 0 {
            self.alerts.push(format!("duplicados:{}", dropped));
        }
    }

    /// Sort by the natural key columns
    pub fn sort_on_key(&mut self) {
        let key_columns = self.key_columns.clone();
        self.table.sort_by_columns(&key_columns);
    }
}
