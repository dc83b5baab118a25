//! Application constants for the EGASA data-mart normalizer
//!
//! This module contains the Spanish month tables, the default plant
//! reference, header-detection vocabularies, fixed label allow-lists
//! and output file naming used throughout the application.

// =============================================================================
// Spanish Month Names
// =============================================================================

/// Month-name table, uppercase and diacritic-free.
///
/// Both the "SETIEMBRE" and "SEPTIEMBRE" spellings occur in source
/// workbooks; both map to month 09.
pub const SPANISH_MONTHS: &[(&str, &str)] = &[
    ("ENERO", "01"),
    ("FEBRERO", "02"),
    ("MARZO", "03"),
    ("ABRIL", "04"),
    ("MAYO", "05"),
    ("JUNIO", "06"),
    ("JULIO", "07"),
    ("AGOSTO", "08"),
    ("SETIEMBRE", "09"),
    ("SEPTIEMBRE", "09"),
    ("OCTUBRE", "10"),
    ("NOVIEMBRE", "11"),
    ("DICIEMBRE", "12"),
];

/// Look up a month number ("01".."12") by exact month-name match
pub fn month_number(label: &str) -> Option<&'static str> {
    let needle = label.trim().to_uppercase();
    SPANISH_MONTHS
        .iter()
        .find(|(name, _)| *name == needle)
        .map(|(_, num)| *num)
}

/// Look up a month number by substring match (e.g. "Vol. ENERO (hm3)")
pub fn month_number_substring(label: &str) -> Option<&'static str> {
    let haystack = label.trim().to_uppercase();
    SPANISH_MONTHS
        .iter()
        .find(|(name, _)| haystack.contains(name))
        .map(|(_, num)| *num)
}

/// Resolve a month column header to "01".."12".
///
/// Accepts Spanish month names and bare 1..=12 numeric headers.
pub fn month_token(label: &str) -> Option<String> {
    if let Some(num) = month_number(label) {
        return Some(num.to_string());
    }
    let trimmed = label.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if let Ok(n) = trimmed.parse::<u32>() {
        if (1..=12).contains(&n) {
            return Some(format!("{:02}", n));
        }
    }
    None
}

// =============================================================================
// Default Plant Reference
// =============================================================================

/// Columns of the plant reference CSV
pub const REFERENCE_COLUMNS: &[&str] = &[
    "central_id",
    "central_nombre",
    "tipo",
    "anio_puesta",
    "potencia_mw",
    "zona",
];

/// File name of the plant reference table inside the reference directory
pub const REFERENCE_FILENAME: &str = "centrales_egasa.csv";

/// Default plant reference, written out when no reference file exists yet
pub const DEFAULT_PLANTS: &[(&str, &str, &str, i32, f64, &str)] = &[
    ("CH1", "CHARCANI I", "HIDRO", 1905, 1.76, "SUR"),
    ("CH2", "CHARCANI II", "HIDRO", 1912, 0.79, "SUR"),
    ("CH3", "CHARCANI III", "HIDRO", 1938, 4.56, "SUR"),
    ("CH4", "CHARCANI IV", "HIDRO", 1959, 14.40, "SUR"),
    ("CH5", "CHARCANI V", "HIDRO", 1989, 145.35, "SUR"),
    ("CH6", "CHARCANI VI", "HIDRO", 1976, 8.96, "SUR"),
    ("CT1", "C.T. CHILINA", "TERMICA", 1981, 22.00, "SUR"),
    ("CT2", "C.T. PISCO", "TERMICA", 2010, 74.80, "SUR"),
    ("CT3", "C.T. MOLLENDO", "TERMICA", 1997, 31.71, "SUR"),
];

// =============================================================================
// Header Detection
// =============================================================================

/// Hard cap on the number of preview rows scanned for a header
pub const HEADER_SCAN_ROW_CAP: usize = 120;

/// Preview depth for generic sheets
pub const PREVIEW_ROWS_DEFAULT: usize = 20;

/// Preview depth for hydrology control sheets
pub const PREVIEW_ROWS_HYDROLOGY: usize = 40;

/// Preview depth for billing sheets
pub const PREVIEW_ROWS_BILLING: usize = 60;

/// Preview depth for the daily reservoir report
pub const PREVIEW_ROWS_RESERVOIR: usize = 80;

/// Preview depth for the energy balance sheets
pub const PREVIEW_ROWS_BALANCE: usize = 120;

/// Header keywords for hydrology year-by-month sheets
pub const HYDROLOGY_HEADER_KEYWORDS: &[&str] = &["año", "enero"];

/// Header keywords for billing sales sheets
pub const SALES_HEADER_KEYWORDS: &[&str] = &["cliente", "enero"];

/// Header keywords for the billing revenue sheet
pub const REVENUE_HEADER_KEYWORDS: &[&str] = &["enero"];

/// Header keywords for contract sheets
pub const CONTRACT_HEADER_KEYWORDS: &[&str] = &["cliente"];

/// Header keyword for the daily reservoir report fallback detector
pub const RESERVOIR_HEADER_KEYWORDS: &[&str] = &["represa"];

/// Expected column labels for the historic production sheets
pub const PRODUCTION_EXPECTED_LABELS: &[&str] = &["central"];

/// Header keywords for the 15-minute interval sheets (the composite
/// header starts at the row labeling the timestamp column)
pub const INTERVAL_HEADER_KEYWORDS: &[&str] = &["fecha"];

// =============================================================================
// Source Vocabularies
// =============================================================================

/// Sheet allow-list for reservoir/sub-basin volume series
pub const VOLUME_SHEETS: &[&str] = &["AB", "EF", "EP", "PI", "CH", "BA", "TOTAL"];

/// Sheet carrying the flow-rate series
pub const FLOW_SHEET: &str = "CAUDAL";

/// Gauging station the flow-rate series belongs to
pub const FLOW_STATION: &str = "Aguada Blanca";

/// Sheet carrying the daily reservoir report
pub const RESERVOIR_SHEET: &str = "INFORMEDIARIO";

/// Positional metric convention for the daily reservoir report.
///
/// The report's header text changes from one release to the next, so the
/// columns after the reservoir-name column are mapped by position to these
/// metrics. Adjust here if the report layout moves.
pub const RESERVOIR_POSITIONAL_METRICS: &[&str] = &["volumen_actual", "pct_llenado"];

/// Concept allow-list for the balance "Perfil" sheet
pub const BALANCE_CONCEPTS: &[&str] = &[
    "PRODUCCION HIDRAULICA",
    "PRODUCCION TERMICA",
    "COMPRA DE ENERGIA",
    "CONSUMOS AUX.",
    "PERDIDAS",
    "ENERGIA DISPONIBLE",
    "VENTA DE ENERGIA",
    "VENTA EN COES",
    "CONTRATOS",
];

/// Segment allow-list for the balance "R" sheet
pub const BALANCE_SEGMENTS: &[&str] = &["COES", "REGULADOS", "LIBRES", "TOTAL"];

/// Known typo in the Perfil concept column, corrected before filtering
pub const BALANCE_CONCEPT_TYPO: (&str, &str) = ("EERGIA DISPONIBLE", "ENERGIA DISPONIBLE");

/// Labels that mark summary rows in the revenue sheet; dropped so totals
/// are not double counted
pub const REVENUE_SUMMARY_BLOCKLIST: &[&str] = &["TOTAL", "INGRESOS"];

/// Year assumed for billing month columns labeled with a bare month
/// name instead of a date header
pub const BILLING_DEFAULT_YEAR: i32 = 2025;

/// Column rename dictionary for contract sheets: source header fragment
/// (lowercased) to canonical column name. Longest fragments first so
/// "tipo de contrato" wins over "tipo".
pub const CONTRACT_RENAMES: &[(&str, &str)] = &[
    ("tipo de contrato", "tipo_contrato"),
    ("tipo contrato", "tipo_contrato"),
    ("fecha inicio", "fecha_inicio"),
    ("fecha fin", "fecha_fin"),
    ("precio hp", "precio_hp_usd_mwh"),
    ("precio fp", "precio_fp_usd_mwh"),
    ("potencia", "potencia_mw"),
    ("cliente", "cliente"),
    ("inicio", "fecha_inicio"),
    ("fin", "fecha_fin"),
    ("tipo", "tipo_contrato"),
];

/// Meter/unit label used when a 15-minute column carries no unit suffix
pub const DEFAULT_UNIT: &str = "U1";

/// Year range of sheet names considered by the historic production normalizer
pub const PRODUCTION_YEAR_MIN: i32 = 2010;
pub const PRODUCTION_YEAR_MAX: i32 = 2025;

// =============================================================================
// Unit Conversions
// =============================================================================

/// Generation sources report kWh; the mart stores MWh
pub const KWH_PER_MWH: f64 = 1000.0;

/// The balance Perfil sheet reports GWh; the mart stores MWh
pub const MWH_PER_GWH: f64 = 1000.0;

// =============================================================================
// Output Files
// =============================================================================

/// Metadata sidecar written into the mart directory every run
pub const METADATA_FILENAME: &str = "metadata.json";

/// Append-only run log inside the logs directory
pub const RUNS_LOG_FILENAME: &str = "etl_runs.ndjson";

/// File-name prefix of the partitioned 15-minute output
pub const INTERVAL_PARTITION_PREFIX: &str = "generacion_15min";

/// Glob pattern matching existing 15-minute partitions in the mart
pub const INTERVAL_PARTITION_GLOB: &str = "generacion_15min_*.csv";

/// Mart file name for a canonical table
pub fn mart_filename(table: &str) -> String {
    format!("{}.csv", table)
}

/// Table name of one 15-minute monthly partition
pub fn interval_partition_table(yyyymm: &str) -> String {
    format!("{}_{}", INTERVAL_PARTITION_PREFIX, yyyymm)
}

/// File name of a persisted validation report
pub fn validation_report_filename(run_id: &str, table: &str) -> String {
    format!("validation_{}_{}.json", run_id, table)
}

// =============================================================================
// Date Formats
// =============================================================================

/// Timestamp format used in mart CSV files
pub const MART_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date format used in mart CSV files
pub const MART_DATE_FORMAT: &str = "%Y-%m-%d";

/// Run identifier format (UTC)
pub const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_number_exact() {
        assert_eq!(month_number("ENERO"), Some("01"));
        assert_eq!(month_number(" diciembre "), Some("12"));
        assert_eq!(month_number("SETIEMBRE"), Some("09"));
        assert_eq!(month_number("SEPTIEMBRE"), Some("09"));
        assert_eq!(month_number("ENERO 2024"), None);
    }

    #[test]
    fn test_month_number_substring() {
        assert_eq!(month_number_substring("ENERO 2024"), Some("01"));
        assert_eq!(month_number_substring("Vol. FEBRERO (hm3)"), Some("02"));
        assert_eq!(month_number_substring("TOTAL"), None);
    }

    #[test]
    fn test_month_token() {
        assert_eq!(month_token("MARZO").as_deref(), Some("03"));
        assert_eq!(month_token("1").as_deref(), Some("01"));
        assert_eq!(month_token("12").as_deref(), Some("12"));
        // Float-typed headers read back from spreadsheets
        assert_eq!(month_token("3.0").as_deref(), Some("03"));
        assert_eq!(month_token("13"), None);
        assert_eq!(month_token("0"), None);
        assert_eq!(month_token("TOTAL"), None);
    }

    #[test]
    fn test_contract_renames_longest_first() {
        // The dictionary is scanned in order; composite labels must appear
        // before their fragments.
        let tipo_contrato = CONTRACT_RENAMES
            .iter()
            .position(|(k, _)| *k == "tipo de contrato")
            .unwrap();
        let tipo = CONTRACT_RENAMES
            .iter()
            .position(|(k, _)| *k == "tipo")
            .unwrap();
        assert!(tipo_contrato < tipo);
    }

    #[test]
    fn test_output_filenames() {
        assert_eq!(mart_filename("generacion_mensual"), "generacion_mensual.csv");
        assert_eq!(
            interval_partition_table("202501"),
            "generacion_15min_202501"
        );
        assert_eq!(
            validation_report_filename("20250101000000", "ventas_mensual_mwh"),
            "validation_20250101000000_ventas_mensual_mwh.json"
        );
    }

    #[test]
    fn test_default_plants_reference_shape() {
        assert_eq!(DEFAULT_PLANTS.len(), 9);
        assert!(DEFAULT_PLANTS.iter().all(|(id, ..)| !id.is_empty()));
        assert_eq!(REFERENCE_COLUMNS.len(), 6);
    }
}
