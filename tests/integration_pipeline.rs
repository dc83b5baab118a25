//! End-to-end pipeline tests over real .xlsx fixtures
//!
//! Each test builds a landing directory with workbooks shaped like the
//! actual utility exports, runs the full pipeline, and inspects the
//! mart directory it produced.

use egasa_datamart::cli::commands::execute;
use egasa_datamart::config::{Config, RunOptions};
use egasa_datamart::Error;
use rust_xlsxwriter::Workbook;
use std::path::Path;
use tempfile::TempDir;

/// Config rooted at the temp dir with every source optional; tests
/// flip individual sources back to required where that is the point.
fn lenient_config(dir: &Path) -> Config {
    let mut config = Config::default().with_base_dir(dir);
    config.sources.hidrologia_control.required = false;
    config.sources.hidrologia_represas.required = false;
    config.sources.facturacion.required = false;
    config
}

fn read_mart_table(config: &Config, file: &str) -> String {
    std::fs::read_to_string(config.output_dir().join(file))
        .unwrap_or_else(|e| panic!("missing mart table {}: {}", file, e))
}

fn data_rows(csv: &str) -> usize {
    csv.lines().count().saturating_sub(1)
}

fn write_production_workbook(landing: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("2010").unwrap();
    sheet.write_string(0, 0, "CENTRAL").unwrap();
    sheet.write_string(0, 1, "ENERO").unwrap();
    sheet.write_string(0, 2, "FEBRERO").unwrap();
    sheet.write_string(0, 3, "Total").unwrap();
    sheet.write_string(1, 0, "CH1").unwrap();
    sheet.write_number(1, 1, 1000.0).unwrap();
    sheet.write_number(1, 2, 2000.0).unwrap();
    sheet.write_number(1, 3, 3000.0).unwrap();
    sheet.write_string(2, 0, "CHARCANI V").unwrap();
    sheet.write_number(2, 1, 500.0).unwrap();
    workbook
        .save(landing.join("PRODUCCION EGASA DESDE 2010.xlsx"))
        .unwrap();
}

fn write_billing_workbook(landing: &Path, mwh: f64, soles: f64) {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("VENTAS (MWh)").unwrap();
    sheet.write_string(0, 0, "CLIENTE").unwrap();
    sheet.write_string(0, 1, "ENERO").unwrap();
    sheet.write_string(1, 0, "ABC").unwrap();
    sheet.write_number(1, 1, mwh).unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("VENTAS (S)").unwrap();
    sheet.write_string(0, 0, "CLIENTE").unwrap();
    sheet.write_string(0, 1, "ENERO").unwrap();
    sheet.write_string(1, 0, "ABC").unwrap();
    sheet.write_number(1, 1, soles).unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Ingresos").unwrap();
    sheet.write_string(0, 0, "CONCEPTO").unwrap();
    sheet.write_string(0, 1, "ENERO").unwrap();
    sheet.write_string(1, 0, "Venta de energia").unwrap();
    sheet.write_number(1, 1, 500.0).unwrap();
    sheet.write_string(2, 0, "TOTAL INGRESOS").unwrap();
    sheet.write_number(2, 1, 500.0).unwrap();

    workbook.save(landing.join("Facturacion 2025.xlsx")).unwrap();
}

/// Interval fixture: composite two-row header, merged group cell left
/// blank, timestamps as text, readings in kWh.
fn write_interval_workbook(landing: &Path, second_g1_kwh: f64) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Datos").unwrap();

    sheet.write_string(0, 0, "FECHA HORA").unwrap();
    sheet.write_string(0, 1, "CHARCANI V (kWh)").unwrap();
    // column 2 is left blank: a merged-cell export, forward-filled
    sheet.write_string(1, 1, "G1").unwrap();
    sheet.write_string(1, 2, "G2").unwrap();

    sheet.write_string(2, 0, "01/01/2025 00:15").unwrap();
    sheet.write_number(2, 1, 1000.0).unwrap();
    sheet.write_number(2, 2, 2000.0).unwrap();

    sheet.write_string(3, 0, "01/01/2025 00:30").unwrap();
    sheet.write_number(3, 1, second_g1_kwh).unwrap();
    sheet.write_number(3, 2, 4000.0).unwrap();

    // a note row with no parseable timestamp, dropped
    sheet.write_string(4, 0, "fin del reporte").unwrap();

    workbook
        .save(landing.join("PRODUCCIÓN DE ENERGÍA ENERO.xlsx"))
        .unwrap();
}

#[test]
fn test_production_and_billing_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = lenient_config(dir.path());
    config.ensure_directories().unwrap();

    write_production_workbook(&config.input_dir());
    write_billing_workbook(&config.input_dir(), 10.0, 1000.0);

    let stats = execute(&config, &RunOptions::default(), false).unwrap();
    assert!(stats.total_rows() > 0);
    assert_eq!(stats.violations, 0);

    // 1000 kWh in the ENERO column of sheet "2010" -> 1 MWh at 201001
    let generacion = read_mart_table(&config, "generacion_mensual.csv");
    assert!(generacion.starts_with("central_id,central,periodo,energia_mwh"));
    assert!(generacion.contains("CH1,CH1,201001,1\n"));
    assert!(generacion.contains("CH1,CH1,201002,2\n"));
    assert!(generacion.contains("CH5,CHARCANI V,201001,0.5\n"));
    // the Total column is not a month and must not be melted
    assert_eq!(data_rows(&generacion), 4);

    // 1000 soles over 10 MWh -> average price of 100
    let precio = read_mart_table(&config, "precio_medio_mensual.csv");
    assert!(precio.contains("ABC,202501,100\n"));

    // summary rows are blocked from the revenue table
    let ingresos = read_mart_table(&config, "ingresos_mensual.csv");
    assert!(ingresos.contains("Venta de energia"));
    assert!(!ingresos.contains("TOTAL"));

    // absent optional sources still yield header-only tables
    let hidro = read_mart_table(&config, "hidro_volumen_mensual.csv");
    assert_eq!(data_rows(&hidro), 0);
    assert!(config.output_dir().join("contratos_base.csv").exists());

    // run artifacts
    let metadata: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.output_dir().join("metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["datasets"]["generacion_mensual"]["filas"], 4);
    // the two workbooks plus the auto-created plant reference
    let files = metadata["archivos_leidos"].as_array().unwrap();
    assert_eq!(files.len(), 3);
    let names: Vec<&str> = files
        .iter()
        .filter_map(|f| f["nombre"].as_str())
        .collect();
    assert!(names.contains(&"centrales_egasa.csv"));

    let log = std::fs::read_to_string(config.logs_dir().join("etl_runs.ndjson")).unwrap();
    let line: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(line["status"], "success");
    assert_eq!(line["tables"]["ventas_mensual_mwh"], 1);
}

#[test]
fn test_interval_rerun_merges_corrected_partition() {
    let dir = TempDir::new().unwrap();
    let config = lenient_config(dir.path());
    config.ensure_directories().unwrap();

    write_interval_workbook(&config.input_dir(), 3000.0);
    execute(&config, &RunOptions::default(), false).unwrap();

    let partition = read_mart_table(&config, "generacion_15min_202501.csv");
    assert_eq!(data_rows(&partition), 4);
    assert!(partition.contains("2025-01-01 00:30:00,CH5,CHARCANI V,G1,3\n"));

    // Re-run over a corrected export: same keys, one changed value
    write_interval_workbook(&config.input_dir(), 5000.0);
    execute(&config, &RunOptions::default(), false).unwrap();

    let merged = read_mart_table(&config, "generacion_15min_202501.csv");
    assert_eq!(data_rows(&merged), 4);
    assert!(merged.contains("2025-01-01 00:30:00,CH5,CHARCANI V,G1,5\n"));
    assert!(!merged.contains(",G1,3\n"));
}

#[test]
fn test_month_filter_skips_other_partitions() {
    let dir = TempDir::new().unwrap();
    let config = lenient_config(dir.path());
    config.ensure_directories().unwrap();

    write_interval_workbook(&config.input_dir(), 3000.0);
    let options = RunOptions {
        month: Some("202502".to_string()),
        ..Default::default()
    };
    execute(&config, &options, false).unwrap();

    assert!(!config
        .output_dir()
        .join("generacion_15min_202501.csv")
        .exists());
}

#[test]
fn test_strict_mode_aborts_on_schema_violation() {
    let dir = TempDir::new().unwrap();
    let mut config = lenient_config(dir.path());
    config.sources.facturacion.required = true;
    config.ensure_directories().unwrap();

    // a negative sales volume violates the ventas schema
    write_billing_workbook(&config.input_dir(), -5.0, 1000.0);

    let error = execute(&config, &RunOptions::default(), false).unwrap_err();
    match error {
        Error::SchemaValidation { table, .. } => assert_eq!(table, "ventas_mensual_mwh"),
        other => panic!("unexpected error: {other}"),
    }

    // the report is persisted before the abort, metadata is not written
    let reports: Vec<_> = std::fs::read_dir(config.reports_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .contains("ventas_mensual_mwh")
        })
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(!config.output_dir().join("metadata.json").exists());

    let log = std::fs::read_to_string(config.logs_dir().join("etl_runs.ndjson")).unwrap();
    let line: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(line["status"], "failed");
}

#[test]
fn test_non_strict_mode_writes_with_report() {
    let dir = TempDir::new().unwrap();
    let mut config = lenient_config(dir.path());
    config.sources.facturacion.required = true;
    config.ensure_directories().unwrap();

    write_billing_workbook(&config.input_dir(), -5.0, 1000.0);

    let options = RunOptions {
        strict: false,
        ..Default::default()
    };
    let stats = execute(&config, &options, false).unwrap();
    assert!(stats.violations > 0);

    let ventas = read_mart_table(&config, "ventas_mensual_mwh.csv");
    assert!(ventas.contains("ABC,202501"));
    assert!(config.output_dir().join("metadata.json").exists());
}
