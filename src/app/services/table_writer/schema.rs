//! Declared schemas and validation checks for the mart tables
//!
//! Each canonical table declares per-column checks: presence,
//! nullability, type coercion, lower bounds, ranges and exact string
//! lengths. Validation never stops at the first problem; every failing
//! check is collected so one report describes the whole table.

use crate::app::models::Table;
use serde::Serialize;

/// How many offending row indices a violation records
const SAMPLE_ROWS: usize = 5;

/// Value domain a column must coerce into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free text
    Text,

    /// Any numeric value
    Numeric,

    /// Numeric value without a fractional part
    Integer,

    /// Date or timestamp
    Date,
}

/// Declared checks for one column
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    /// Column name in the output table
    pub name: &'static str,

    /// Expected value domain
    pub kind: ColumnKind,

    /// Whether blank cells are acceptable
    pub nullable: bool,

    /// Inclusive lower bound for numeric values
    pub min: Option<f64>,

    /// Inclusive upper bound for numeric values
    pub max: Option<f64>,

    /// Exact rendered length for non-blank values
    pub str_length: Option<usize>,
}

impl ColumnSchema {
    fn new(name: &'static str, kind: ColumnKind, nullable: bool) -> Self {
        Self {
            name,
            kind,
            nullable,
            min: None,
            max: None,
            str_length: None,
        }
    }

    fn ge(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    fn in_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn length(mut self, chars: usize) -> Self {
        self.str_length = Some(chars);
        self
    }
}

fn text(name: &'static str, nullable: bool) -> ColumnSchema {
    ColumnSchema::new(name, ColumnKind::Text, nullable)
}

fn numeric(name: &'static str, nullable: bool) -> ColumnSchema {
    ColumnSchema::new(name, ColumnKind::Numeric, nullable)
}

fn integer(name: &'static str, nullable: bool) -> ColumnSchema {
    ColumnSchema::new(name, ColumnKind::Integer, nullable)
}

fn date(name: &'static str, nullable: bool) -> ColumnSchema {
    ColumnSchema::new(name, ColumnKind::Date, nullable)
}

/// The declared schema of one mart table
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table the schema belongs to
    pub table: String,

    /// Column checks, in declaration order
    pub columns: Vec<ColumnSchema>,
}

fn contract_columns() -> Vec<ColumnSchema> {
    vec![
        text("cliente", false),
        text("tipo_contrato", true),
        date("fecha_inicio", true),
        date("fecha_fin", true),
        numeric("potencia_mw", true).ge(0.0),
        numeric("precio_hp_usd_mwh", true).ge(0.0),
        numeric("precio_fp_usd_mwh", true).ge(0.0),
    ]
}

/// Declared schema for a table, `None` for tables written unvalidated
/// (the generation outputs and the derived price table)
pub fn table_schema(table: &str) -> Option<TableSchema> {
    let columns = match table {
        "ventas_mensual_mwh" => vec![
            text("cliente", false),
            text("periodo", false).length(6),
            integer("anio", true),
            integer("mes", true),
            numeric("mwh", true).ge(0.0),
        ],
        "ventas_mensual_soles" => vec![
            text("cliente", false),
            text("periodo", false).length(6),
            integer("anio", true),
            integer("mes", true),
            numeric("soles", true).ge(0.0),
        ],
        "ingresos_mensual" => vec![
            integer("anio", false),
            integer("mes", false).in_range(1.0, 12.0),
            text("cliente_o_concepto", false),
            numeric("soles", false),
        ],
        "represas_diario" => vec![
            date("fecha", true),
            text("reservorio", false),
            numeric("volumen_actual", true),
            numeric("pct_llenado", true).in_range(0.0, 150.0),
        ],
        "hidro_volumen_mensual" => vec![
            text("reservorio", false),
            integer("anio", false),
            text("mes", false).length(2),
            text("periodo", false).length(6),
            numeric("volumen_000m3", true).ge(0.0),
        ],
        "hidro_caudal_mensual" => vec![
            text("estacion", false),
            integer("anio", false),
            text("mes", false).length(2),
            text("periodo", false).length(6),
            numeric("caudal_m3s", true).ge(0.0),
        ],
        "balance_perfil_mensual" => vec![
            text("periodo", false).length(6),
            date("fecha_mes", true),
            text("concepto", false),
            numeric("energia_mwh", true),
            numeric("energia_gwh", true),
        ],
        "balance_r_mensual" => vec![
            text("periodo", false).length(6),
            date("fecha_mes", true),
            text("segmento", false),
            numeric("energia_mwh", true),
        ],
        "contratos_base" | "contratos_riesgo" => contract_columns(),
        _ => return None,
    };
    Some(TableSchema {
        table: table.to_string(),
        columns,
    })
}

/// One failed check over one column
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// Column the check ran against
    pub column: String,

    /// Check identifier: presence, not_null, dtype, ge, in_range,
    /// str_length
    pub check: String,

    /// Number of offending rows (table length for presence failures)
    pub count: usize,

    /// Zero-based indices of the first offending rows
    pub rows: Vec<usize>,

    /// Description of the failure
    pub detail: String,
}

fn violation(column: &str, check: &str, offending: &[usize], detail: String) -> Violation {
    Violation {
        column: column.to_string(),
        check: check.to_string(),
        count: offending.len(),
        rows: offending.iter().take(SAMPLE_ROWS).copied().collect(),
        detail,
    }
}

/// Run every declared check against a table.
///
/// `extra_required` columns (per-table configuration) are checked for
/// presence and non-nullness even when the declared schema does not
/// mention them. All failures are returned together.
pub fn validate(
    table: &Table,
    schema: Option<&TableSchema>,
    extra_required: &[String],
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some(schema) = schema {
        for column in &schema.columns {
            match table.column_index(column.name) {
                Some(idx) => violations.extend(check_column(table, idx, column)),
                None => violations.push(Violation {
                    column: column.name.to_string(),
                    check: "presence".to_string(),
                    count: table.len(),
                    rows: Vec::new(),
                    detail: format!("column '{}' missing from table", column.name),
                }),
            }
        }
    }

    let declared: Vec<&str> = schema
        .map(|s| s.columns.iter().map(|c| c.name).collect())
        .unwrap_or_default();
    for name in extra_required {
        if declared.iter().any(|d| d == name) {
            continue;
        }
        match table.column_index(name) {
            Some(idx) => {
                let blanks: Vec<usize> = table
                    .rows
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| row[idx].is_blank())
                    .map(|(i, _)| i)
                    .collect();
                if !blanks.is_empty() {
                    violations.push(violation(
                        name,
                        "not_null",
                        &blanks,
                        format!("{} blank value(s) in required column '{}'", blanks.len(), name),
                    ));
                }
            }
            None => violations.push(Violation {
                column: name.clone(),
                check: "presence".to_string(),
                count: table.len(),
                rows: Vec::new(),
                detail: format!("required column '{}' missing from table", name),
            }),
        }
    }

    violations
}

fn check_column(table: &Table, idx: usize, column: &ColumnSchema) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut nulls = Vec::new();
    let mut bad_type = Vec::new();
    let mut below_min = Vec::new();
    let mut out_of_range = Vec::new();
    let mut bad_length = Vec::new();

    for (row_idx, row) in table.rows.iter().enumerate() {
        let cell = &row[idx];
        if cell.is_blank() {
            if !column.nullable {
                nulls.push(row_idx);
            }
            continue;
        }

        let number = match column.kind {
            ColumnKind::Numeric => {
                let n = cell.as_number();
                if n.is_none() {
                    bad_type.push(row_idx);
                }
                n
            }
            ColumnKind::Integer => match cell.as_number() {
                Some(n) if n.fract() == 0.0 => Some(n),
                _ => {
                    bad_type.push(row_idx);
                    None
                }
            },
            ColumnKind::Date => {
                if cell.as_date().is_none() {
                    bad_type.push(row_idx);
                }
                None
            }
            ColumnKind::Text => cell.as_number(),
        };

        if let Some(n) = number {
            match (column.min, column.max) {
                (Some(min), Some(max)) => {
                    if n < min || n > max {
                        out_of_range.push(row_idx);
                    }
                }
                (Some(min), None) => {
                    if n < min {
                        below_min.push(row_idx);
                    }
                }
                _ => {}
            }
        }

        if let Some(expected) = column.str_length {
            if cell.label().chars().count() != expected {
                bad_length.push(row_idx);
            }
        }
    }

    if !nulls.is_empty() {
        violations.push(violation(
            column.name,
            "not_null",
            &nulls,
            format!("{} blank value(s) in non-nullable column", nulls.len()),
        ));
    }
    if !bad_type.is_empty() {
        let kind = match column.kind {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Integer => "integer",
            ColumnKind::Date => "date",
            ColumnKind::Text => "text",
        };
        violations.push(violation(
            column.name,
            "dtype",
            &bad_type,
            format!("{} value(s) not coercible to {}", bad_type.len(), kind),
        ));
    }
    if !below_min.is_empty() {
        violations.push(violation(
            column.name,
            "ge",
            &below_min,
            format!(
                "{} value(s) below minimum {}",
                below_min.len(),
                column.min.unwrap_or_default()
            ),
        ));
    }
    if !out_of_range.is_empty() {
        violations.push(violation(
            column.name,
            "in_range",
            &out_of_range,
            format!(
                "{} value(s) outside [{}, {}]",
                out_of_range.len(),
                column.min.unwrap_or_default(),
                column.max.unwrap_or_default()
            ),
        ));
    }
    if !bad_length.is_empty() {
        violations.push(violation(
            column.name,
            "str_length",
            &bad_length,
            format!(
                "{} value(s) not exactly {} character(s)",
                bad_length.len(),
                column.str_length.unwrap_or_default()
            ),
        ));
    }

    violations
}
