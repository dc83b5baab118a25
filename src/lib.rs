//! EGASA Data-Mart Normalizer Library
//!
//! A Rust library for normalizing EGASA's irregular spreadsheet exports
//! (generation logs, hydrology control sheets, billing workbooks, contract
//! registries) into a clean, long-format CSV data mart.
//!
//! This library provides tools for:
//! - Locating header rows inside loosely structured .xlsx sheets
//! - Reconciling free-text plant names against a canonical reference
//! - Reshaping wide month-column layouts into long per-period records
//! - Merging incrementally arriving monthly partitions with deduplication
//! - Validating produced tables against declared schemas
//! - Crash-safe persistence via temp-file + atomic rename

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod entity_registry;
        pub mod normalizers;
        pub mod partition;
        pub mod reshaper;
        pub mod run_recorder;
        pub mod sheet_parser;
        pub mod table_writer;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{Cell, Dataset, Table};
pub use config::Config;

/// Result type alias for the data-mart normalizer
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for spreadsheet normalization and mart persistence
///
/// `Display` and `std::error::Error` are implemented manually because the
/// `MissingRequiredSource` variant has a field named `source` that is a data
/// source name, not an error source, and `thiserror`'s derive unconditionally
/// treats any field named `source` as the error source.
#[derive(Debug)]
pub enum Error {
    /// I/O operation failed
    Io {
        message: String,
        source: std::io::Error,
    },

    /// Workbook could not be opened or a sheet could not be read
    Spreadsheet {
        file: String,
        message: String,
        source: Option<calamine::Error>,
    },

    /// A sheet opened but its expected structure could not be located
    SheetParsing {
        file: String,
        sheet: String,
        message: String,
    },

    /// A source configured as required has no matching file in the landing directory
    MissingRequiredSource {
        source: String,
        pattern: String,
        directory: String,
    },

    /// CSV reading or writing error
    CsvParsing {
        file: String,
        message: String,
        source: Option<csv::Error>,
    },

    /// Configuration error
    Configuration { message: String },

    /// Entity reference table could not be loaded or created
    EntityReference { message: String },

    /// A produced table violates its declared schema (strict mode)
    SchemaValidation {
        table: String,
        violations: usize,
        report: String,
    },

    /// JSON serialization error
    Serialization {
        message: String,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { message, .. } => write!(f, "I/O error: {message}"),
            Self::Spreadsheet { file, message, .. } => {
                write!(f, "Spreadsheet error in file '{file}': {message}")
            }
            Self::SheetParsing {
                file,
                sheet,
                message,
            } => write!(f, "Unparseable sheet '{sheet}' in file '{file}': {message}"),
            Self::MissingRequiredSource {
                source,
                pattern,
                directory,
            } => write!(
                f,
                "Required source '{source}' not found: no file matching '{pattern}' under '{directory}'"
            ),
            Self::CsvParsing { file, message, .. } => {
                write!(f, "CSV error in file '{file}': {message}")
            }
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            Self::EntityReference { message } => write!(f, "Entity reference error: {message}"),
            Self::SchemaValidation {
                table,
                violations,
                report,
            } => write!(
                f,
                "Schema validation failed for table '{table}': {violations} violation(s), report at {report}"
            ),
            Self::Serialization { message, .. } => write!(f, "Serialization error: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Spreadsheet { source, .. } => source
                .as_ref()
                .map(|e| e as &(dyn std::error::Error + 'static)),
            Self::CsvParsing { source, .. } => source
                .as_ref()
                .map(|e| e as &(dyn std::error::Error + 'static)),
            Self::Serialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a spreadsheet error with file context
    pub fn spreadsheet(
        file: impl Into<String>,
        message: impl Into<String>,
        source: Option<calamine::Error>,
    ) -> Self {
        Self::Spreadsheet {
            file: file.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a sheet parsing error with file and sheet context
    pub fn sheet_parsing(
        file: impl Into<String>,
        sheet: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SheetParsing {
            file: file.into(),
            sheet: sheet.into(),
            message: message.into(),
        }
    }

    /// Create a missing required source error
    pub fn missing_required_source(
        source: impl Into<String>,
        pattern: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        Self::MissingRequiredSource {
            source: source.into(),
            pattern: pattern.into(),
            directory: directory.into(),
        }
    }

    /// Create a CSV error with file context
    pub fn csv_parsing(
        file: impl Into<String>,
        message: impl Into<String>,
        source: Option<csv::Error>,
    ) -> Self {
        Self::CsvParsing {
            file: file.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an entity reference error
    pub fn entity_reference(message: impl Into<String>) -> Self {
        Self::EntityReference {
            message: message.into(),
        }
    }

    /// Create a schema validation error
    pub fn schema_validation(
        table: impl Into<String>,
        violations: usize,
        report: impl Into<String>,
    ) -> Self {
        Self::SchemaValidation {
            table: table.into(),
            violations,
            report: report.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Self::CsvParsing {
            file: "unknown".to_string(),
            message: "CSV operation failed".to_string(),
            source: Some(error),
        }
    }
}

impl From<calamine::Error> for Error {
    fn from(error: calamine::Error) -> Self {
        Self::Spreadsheet {
            file: "unknown".to_string(),
            message: "workbook operation failed".to_string(),
            source: Some(error),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON serialization failed".to_string(),
            source: error,
        }
    }
}
