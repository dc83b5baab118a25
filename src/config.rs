//! Configuration management and validation.
//!
//! Declarative configuration for the normalizer: directory layout, one
//! entry per source workbook (file pattern, sheet names, required flag),
//! per-table rules, reconciler tuning and billing defaults.
//!
//! Configuration may be declared in `config.yml` (preferred) or
//! `config.toml` in the base directory. Absent or partial files fall back
//! to the built-in defaults section by section.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// =============================================================================
// Paths
// =============================================================================

/// Directory layout, resolved against the base directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Landing directory holding the raw spreadsheet exports
    #[serde(default = "default_input_dir")]
    pub input: String,

    /// Data-mart directory receiving the normalized CSV files
    #[serde(default = "default_output_dir")]
    pub output: String,

    /// Reference directory holding the plant master table
    #[serde(default = "default_reference_dir")]
    pub reference: String,

    /// Directory for the append-only run log
    #[serde(default = "default_logs_dir")]
    pub logs: String,

    /// Directory for validation reports
    #[serde(default = "default_reports_dir")]
    pub reports: String,
}

fn default_input_dir() -> String {
    "data_landing".to_string()
}

fn default_output_dir() -> String {
    "data_mart".to_string()
}

fn default_reference_dir() -> String {
    "data_reference".to_string()
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_reports_dir() -> String {
    "reports".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input_dir(),
            output: default_output_dir(),
            reference: default_reference_dir(),
            logs: default_logs_dir(),
            reports: default_reports_dir(),
        }
    }
}

// =============================================================================
// Sources
// =============================================================================

/// One source workbook: how to find it and which sheets to read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Case-insensitive substring matched against file names in the
    /// landing directory
    pub pattern: String,

    /// Sheet candidates per role (e.g. "ventas_mwh" -> ["VENTAS (MWh)"])
    #[serde(default)]
    pub sheets: HashMap<String, Vec<String>>,

    /// When true, a run aborts if no file matches the pattern
    #[serde(default)]
    pub required: bool,
}

impl SourceSpec {
    fn new(pattern: &str, required: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            sheets: HashMap::new(),
            required,
        }
    }

    fn with_sheets(mut self, role: &str, candidates: &[&str]) -> Self {
        self.sheets.insert(
            role.to_string(),
            candidates.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Sheet candidates for a role, with a fallback when the role is not
    /// configured (covers partial user overrides that only set `pattern`)
    pub fn sheet_candidates(&self, role: &str, fallback: &[&str]) -> Vec<String> {
        match self.sheets.get(role) {
            Some(candidates) if !candidates.is_empty() => candidates.clone(),
            _ => fallback.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The seven source workbooks the normalizer knows about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Historic monthly generation workbook (one sheet per year)
    #[serde(default = "default_produccion_historica")]
    pub produccion_historica: SourceSpec,

    /// 15-minute interval generation workbook
    #[serde(default = "default_produccion_15min")]
    pub produccion_15min: SourceSpec,

    /// Hydrology control workbook (volume and flow sheets)
    #[serde(default = "default_hidrologia_control")]
    pub hidrologia_control: SourceSpec,

    /// Daily reservoir report workbook
    #[serde(default = "default_hidrologia_represas")]
    pub hidrologia_represas: SourceSpec,

    /// Billing workbook (sales in MWh and soles, revenue)
    #[serde(default = "default_facturacion")]
    pub facturacion: SourceSpec,

    /// Contract review workbook
    #[serde(default = "default_contratos")]
    pub contratos: SourceSpec,

    /// Energy balance workbook
    #[serde(default = "default_balance_energia")]
    pub balance_energia: SourceSpec,
}

fn default_produccion_historica() -> SourceSpec {
    SourceSpec::new("PRODUCCION EGASA DESDE 2010", false)
}

fn default_produccion_15min() -> SourceSpec {
    SourceSpec::new("PRODUCCIÓN DE ENERGÍA", false)
}

fn default_hidrologia_control() -> SourceSpec {
    SourceSpec::new("Control Hidrológico.xlsx", true)
        .with_sheets("volumen", &["AB", "EF", "EP", "PI", "CH", "BA", "TOTAL"])
        .with_sheets("caudal", &["CAUDAL"])
}

fn default_hidrologia_represas() -> SourceSpec {
    SourceSpec::new("BDREPRESAS.xlsx", true).with_sheets("reporte", &["INFORMEDIARIO"])
}

fn default_facturacion() -> SourceSpec {
    SourceSpec::new("Facturacion", true)
        .with_sheets("ventas_mwh", &["VENTAS (MWh)"])
        .with_sheets("ventas_soles", &["VENTAS (S)"])
        .with_sheets("ingresos", &["Ingresos"])
}

fn default_contratos() -> SourceSpec {
    SourceSpec::new("Revision de Volumen Optimo", false)
        .with_sheets("base", &["CONTRATOS BASE DATOS"])
        .with_sheets("riesgo", &["RIESGO"])
}

fn default_balance_energia() -> SourceSpec {
    SourceSpec::new("balance 2025", false)
        .with_sheets("perfil", &["Perfil"])
        .with_sheets("r", &["R"])
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            produccion_historica: default_produccion_historica(),
            produccion_15min: default_produccion_15min(),
            hidrologia_control: default_hidrologia_control(),
            hidrologia_represas: default_hidrologia_represas(),
            facturacion: default_facturacion(),
            contratos: default_contratos(),
            balance_energia: default_balance_energia(),
        }
    }
}

// =============================================================================
// Table Rules
// =============================================================================

/// Per-table rules merged over the normalizer defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRules {
    /// Columns that must be present and non-null on top of the schema
    #[serde(default)]
    pub required_columns: Vec<String>,

    /// Source-header to canonical-column renames
    #[serde(default)]
    pub rename: HashMap<String, String>,
}

impl TableRules {
    fn required(columns: &[&str]) -> Self {
        Self {
            required_columns: columns.iter().map(|c| c.to_string()).collect(),
            rename: HashMap::new(),
        }
    }
}

fn default_table_rules() -> HashMap<String, TableRules> {
    let mut tables = HashMap::new();
    tables.insert(
        "ventas_mensual_mwh".to_string(),
        TableRules::required(&["cliente"]),
    );
    tables.insert(
        "ventas_mensual_soles".to_string(),
        TableRules::required(&["cliente"]),
    );
    tables.insert(
        "ingresos_mensual".to_string(),
        TableRules::required(&["anio", "mes", "cliente_o_concepto", "soles"]),
    );
    tables.insert(
        "represas_diario".to_string(),
        TableRules::required(&["reservorio"]),
    );
    tables.insert(
        "contratos_base".to_string(),
        TableRules::required(&["cliente", "fecha_inicio", "fecha_fin"]),
    );
    tables.insert(
        "contratos_riesgo".to_string(),
        TableRules::required(&["cliente", "fecha_inicio", "fecha_fin"]),
    );
    tables
}

// =============================================================================
// Reconciler and Billing
// =============================================================================

/// Entity reconciler tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Minimum Jaro-Winkler similarity accepted by the fuzzy fallback
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: f64,

    /// How many unmapped labels to surface in the run metadata
    #[serde(default = "default_unmapped_top_n")]
    pub unmapped_top_n: usize,
}

fn default_fuzzy_cutoff() -> f64 {
    0.6
}

fn default_unmapped_top_n() -> usize {
    5
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fuzzy_cutoff: default_fuzzy_cutoff(),
            unmapped_top_n: default_unmapped_top_n(),
        }
    }
}

/// Billing normalizer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Year assumed when a month column carries only a Spanish month name
    #[serde(default = "default_billing_year")]
    pub default_year: i32,
}

fn default_billing_year() -> i32 {
    crate::constants::BILLING_DEFAULT_YEAR
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_year: default_billing_year(),
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// Complete normalizer configuration.
///
/// Constructed once at startup and passed explicitly to every stage;
/// nothing reads configuration from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Source workbook catalog
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Per-table rules
    #[serde(default = "default_table_rules")]
    pub tables: HashMap<String, TableRules>,

    /// Entity reconciler tuning
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Billing normalizer tuning
    #[serde(default)]
    pub billing: BillingConfig,

    /// Base directory all relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            sources: SourcesConfig::default(),
            tables: default_table_rules(),
            reconciler: ReconcilerConfig::default(),
            billing: BillingConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration for a base directory.
    ///
    /// Priority: explicit `--config` path (parse errors are fatal), else
    /// `config.yml`, else `config.toml` in the base directory (parse
    /// errors fall back to defaults with a warning), else defaults.
    pub fn load(explicit: Option<&Path>, base_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            info!("Configuration loaded from {}", path.display());
            return Ok(config.with_base_dir(base_dir));
        }

        for candidate in [base_dir.join("config.yml"), base_dir.join("config.toml")] {
            if !candidate.exists() {
                continue;
            }
            match Self::from_file(&candidate) {
                Ok(config) => {
                    info!("Configuration loaded from {}", candidate.display());
                    return Ok(config.with_base_dir(base_dir));
                }
                Err(e) => {
                    warn!(
                        "Ignoring unreadable configuration {}: {}",
                        candidate.display(),
                        e
                    );
                }
            }
        }

        Ok(Self::default().with_base_dir(base_dir))
    }

    /// Parse a configuration file, choosing the format by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::io(format!("reading configuration {}", path.display()), e)
        })?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "toml" | "tml"))
            .unwrap_or(false);
        if is_toml {
            Self::from_toml_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Parse a YAML configuration document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| Error::configuration(format!("invalid YAML configuration: {}", e)))
    }

    /// Parse a TOML configuration document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::configuration(format!("invalid TOML configuration: {}", e)))
    }

    /// Re-anchor all relative paths to a base directory
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Override the landing directory (CLI `--input`)
    pub fn with_input_dir(mut self, input: impl Into<String>) -> Self {
        self.paths.input = input.into();
        self
    }

    /// Override the mart directory (CLI `--output`)
    pub fn with_output_dir(mut self, output: impl Into<String>) -> Self {
        self.paths.output = output.into();
        self
    }

    /// Landing directory holding the source spreadsheets
    pub fn input_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.input)
    }

    /// Data-mart directory
    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.output)
    }

    /// Reference directory
    pub fn reference_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.reference)
    }

    /// Run-log directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.logs)
    }

    /// Validation-report directory
    pub fn reports_dir(&self) -> PathBuf {
        self.base_dir.join(&self.paths.reports)
    }

    /// Rules for a table, defaults when none are configured
    pub fn table_rules(&self, table: &str) -> TableRules {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reconciler.fuzzy_cutoff) {
            return Err(Error::configuration(format!(
                "reconciler.fuzzy_cutoff {} must be between 0.0 and 1.0",
                self.reconciler.fuzzy_cutoff
            )));
        }

        if !(2000..=2100).contains(&self.billing.default_year) {
            return Err(Error::configuration(format!(
                "billing.default_year {} is outside the plausible range 2000-2100",
                self.billing.default_year
            )));
        }

        for (name, spec) in self.source_entries() {
            if spec.required && spec.pattern.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "source '{}' is required but has an empty file pattern",
                    name
                )));
            }
        }

        for (name, dir) in [
            ("input", &self.paths.input),
            ("output", &self.paths.output),
            ("reference", &self.paths.reference),
            ("logs", &self.paths.logs),
            ("reports", &self.paths.reports),
        ] {
            if dir.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "paths.{} must not be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Create all configured directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.input_dir(),
            self.output_dir(),
            self.reference_dir(),
            self.logs_dir(),
            self.reports_dir(),
        ] {
            fs::create_dir_all(&dir)
                .map_err(|e| Error::io(format!("creating directory {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// All sources with their names, in pipeline order
    pub fn source_entries(&self) -> Vec<(&'static str, &SourceSpec)> {
        vec![
            ("produccion_historica", &self.sources.produccion_historica),
            ("produccion_15min", &self.sources.produccion_15min),
            ("hidrologia_control", &self.sources.hidrologia_control),
            ("hidrologia_represas", &self.sources.hidrologia_represas),
            ("facturacion", &self.sources.facturacion),
            ("contratos", &self.sources.contratos),
            ("balance_energia", &self.sources.balance_energia),
        ]
    }
}

// =============================================================================
// Run Options
// =============================================================================

/// Per-invocation options that do not belong in the config file
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Abort the run when schema validation fails
    pub strict: bool,

    /// Restrict 15-minute output to one YYYYMM partition
    pub month: Option<String>,

    /// Rewrite partitions even when an existing file already covers them
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strict: true,
            month: None,
            force: false,
        }
    }
}
