//! Command implementations for the data-mart normalizer CLI
//!
//! `run` drives the whole pipeline: the seven source normalizers in a
//! fixed sequence, partition merging for the 15-minute output,
//! validated atomic writes, and the run bookkeeping. `plants` prints
//! the canonical reference table; `sources` shows which landing file
//! each configured pattern would pick.

use crate::app::services::entity_registry::EntityRegistry;
use crate::app::models::Dataset;
use crate::app::services::normalizers::{
    balance, billing, candidate_files, contracts, discover_source, hydrology, intervals,
    production, reservoirs,
};
use crate::app::services::partition;
use crate::app::services::run_recorder::{self, RunRecorder, RunStatus};
use crate::app::services::sheet_parser::Workbook;
use crate::app::services::table_writer::TableWriter;
use crate::cli::args::{Args, Commands, OutputFormat, PlantsArgs, RunArgs, SourcesArgs};
use crate::config::{Config, RunOptions, SourceSpec};
use crate::constants::{mart_filename, INTERVAL_PARTITION_PREFIX, RUN_ID_FORMAT};
use crate::{Error, Result};

use chrono::Utc;
use colored::Colorize;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of pipeline stages, for progress reporting
const STAGES: u64 = 7;

/// Outcome of one full run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Tables written to the mart, as (table, rows)
    pub tables: Vec<(String, usize)>,

    /// Failed validation checks across all tables
    pub violations: usize,

    /// Source labels that resolved to no canonical plant
    pub unmapped_entities: u64,

    /// Wall-clock duration of the run
    pub duration: std::time::Duration,
}

impl RunStats {
    /// Total data rows written across all tables
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows).sum()
    }
}

/// Dispatch the parsed CLI arguments
pub fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Commands::Run(run_args)) => {
            setup_logging(run_args.log_level(), run_args.quiet);
            run_pipeline_command(&run_args)
        }
        Some(Commands::Plants(plants_args)) => {
            setup_logging("warn", true);
            run_plants_command(&plants_args)
        }
        Some(Commands::Sources(sources_args)) => {
            setup_logging("warn", true);
            run_sources_command(&sources_args)
        }
        None => {
            // clap prints help for us when asked; this is the bare call
            println!("No command given. Try 'egasa_datamart run' or --help.");
            Ok(())
        }
    }
}

/// Set up structured logging on stderr
fn setup_logging(level: &str, quiet: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("egasa_datamart={}", level)));

    let layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_timer(fmt::time::uptime()))
            .init();
    }
}

fn run_pipeline_command(args: &RunArgs) -> Result<()> {
    args.validate()?;

    let base_dir = args
        .base_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let mut config = Config::load(args.config_file.as_deref(), &base_dir)?
        .with_base_dir(&base_dir);
    if let Some(input) = &args.input_dir {
        config = config.with_input_dir(input.to_string_lossy());
    }
    if let Some(output) = &args.output_dir {
        config = config.with_output_dir(output.to_string_lossy());
    }

    let options = RunOptions {
        strict: !args.no_strict,
        month: args.month.clone(),
        force: args.force,
    };

    let result = execute(&config, &options, args.show_progress());
    match result {
        Ok(stats) => report_stats(&stats, args.output_format),
        Err(error) => {
            if matches!(
                error,
                Error::MissingRequiredSource { .. } | Error::SheetParsing { .. }
            ) {
                eprintln!(
                    "{}",
                    "Hint: check the configured file patterns and sheet names against \
                     the contents of the landing directory."
                        .yellow()
                );
            }
            Err(error)
        }
    }
}

/// Run the full normalization pipeline.
///
/// This is the orchestrator: each source normalizer runs to completion
/// in a fixed sequence, outputs pass through the partition merger where
/// applicable and then the validating writer, and the recorder persists
/// `metadata.json` plus one NDJSON run-log line. A failed run still
/// gets its log line, but never overwrites the metadata of the last
/// good run.
pub fn execute(config: &Config, options: &RunOptions, show_progress: bool) -> Result<RunStats> {
    let started = Instant::now();
    config.validate()?;
    config.ensure_directories()?;

    let run_id = Utc::now().format(RUN_ID_FORMAT).to_string();
    info!("Starting run {}", run_id);
    let mut recorder = RunRecorder::new(&run_id);

    let progress = show_progress.then(|| {
        let pb = ProgressBar::new(STAGES);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        pb
    });

    let result = pipeline(config, options, &run_id, &mut recorder, progress.as_ref());

    match &result {
        Ok(_) => {
            recorder.write_metadata(&config.output_dir())?;
            recorder.append_run_log(&config.logs_dir(), RunStatus::Success, None)?;
            if let Some(pb) = &progress {
                pb.finish_with_message("done");
            }
        }
        Err(error) => {
            if let Some(pb) = &progress {
                pb.abandon_with_message("failed");
            }
            // Bookkeeping must not mask the original failure
            if let Err(log_error) =
                recorder.append_run_log(&config.logs_dir(), RunStatus::Failed, Some(&error.to_string()))
            {
                warn!("Could not append to the run log: {}", log_error);
            }
        }
    }

    result.map(|mut stats| {
        stats.duration = started.elapsed();
        stats
    })
}

fn pipeline(
    config: &Config,
    options: &RunOptions,
    run_id: &str,
    recorder: &mut RunRecorder,
    progress: Option<&ProgressBar>,
) -> Result<RunStats> {
    let (mut registry, reference_path) =
        EntityRegistry::load_or_create(&config.reference_dir(), config.reconciler.fuzzy_cutoff)?;
    info!(
        "Loaded {} plants from {}",
        registry.len(),
        reference_path.display()
    );
    recorder.record_file(&reference_path)?;

    let writer = TableWriter::new(config, run_id);
    let landing = config.input_dir();
    let mut stats = RunStats::default();

    let fallback_month = options
        .month
        .clone()
        .unwrap_or_else(|| Utc::now().format("%Y%m").to_string());

    // 1. Historic monthly generation
    stage(progress, "produccion_historica");
    let normalized = match open_source("produccion_historica", &config.sources.produccion_historica, &landing, recorder)? {
        Some(mut workbook) => production::normalize(&mut workbook, &mut registry)?,
        None => production::empty(),
    };
    publish(normalized.datasets, &writer, recorder, options, &mut stats)?;

    // 2. 15-minute interval readings, merged into monthly partitions
    stage(progress, "produccion_15min");
    let normalized = match open_source("produccion_15min", &config.sources.produccion_15min, &landing, recorder)? {
        Some(mut workbook) => {
            intervals::normalize(&mut workbook, &mut registry, &fallback_month)?
        }
        None => intervals::empty(&fallback_month),
    };
    publish_partitions(normalized.datasets, config, &writer, recorder, options, &mut stats)?;

    // 3. Hydrology control (volumes + flow)
    stage(progress, "hidrologia_control");
    let normalized = match open_source("hidrologia_control", &config.sources.hidrologia_control, &landing, recorder)? {
        Some(mut workbook) => hydrology::normalize(&mut workbook)?,
        None => hydrology::empty(),
    };
    publish(normalized.datasets, &writer, recorder, options, &mut stats)?;

    // 4. Daily reservoir report
    stage(progress, "hidrologia_represas");
    let normalized = match open_source("hidrologia_represas", &config.sources.hidrologia_represas, &landing, recorder)? {
        Some(mut workbook) => reservoirs::normalize(&mut workbook)?,
        None => reservoirs::empty(),
    };
    publish(normalized.datasets, &writer, recorder, options, &mut stats)?;

    // 5. Billing: sales, revenue, average price
    stage(progress, "facturacion");
    let normalized = match open_source("facturacion", &config.sources.facturacion, &landing, recorder)? {
        Some(mut workbook) => billing::normalize(
            &mut workbook,
            &config.sources.facturacion,
            config.billing.default_year,
        )?,
        None => billing::empty(),
    };
    publish(normalized.datasets, &writer, recorder, options, &mut stats)?;

    // 6. Contracts
    stage(progress, "contratos");
    let normalized = match open_source("contratos", &config.sources.contratos, &landing, recorder)? {
        Some(mut workbook) => {
            contracts::normalize(&mut workbook, &config.sources.contratos, config)?
        }
        None => contracts::empty(),
    };
    publish(normalized.datasets, &writer, recorder, options, &mut stats)?;

    // 7. Energy balance
    stage(progress, "balance_energia");
    let normalized = match open_source("balance_energia", &config.sources.balance_energia, &landing, recorder)? {
        Some(mut workbook) => balance::normalize(&mut workbook, &config.sources.balance_energia)?,
        None => balance::empty(),
    };
    publish(normalized.datasets, &writer, recorder, options, &mut stats)?;

    stats.unmapped_entities = registry.unmapped_total();
    if stats.unmapped_entities > 0 {
        let top = registry.unmapped_top(config.reconciler.unmapped_top_n);
        let listing: Vec<String> = top
            .iter()
            .map(|(label, count)| format!("'{}' x{}", label, count))
            .collect();
        warn!(
            "{} source label(s) had no canonical plant; most frequent: {}",
            stats.unmapped_entities,
            listing.join(", ")
        );
    }

    Ok(stats)
}

fn stage(progress: Option<&ProgressBar>, name: &str) {
    if let Some(pb) = progress {
        pb.set_message(name.to_string());
        pb.inc(1);
    }
    info!("Stage: {}", name);
}

/// Discover and open the landing workbook for a source.
///
/// A required source with no matching file is fatal here; an optional
/// one resolves to `None` and the caller degrades to an empty output.
fn open_source(
    name: &str,
    spec: &SourceSpec,
    landing: &Path,
    recorder: &mut RunRecorder,
) -> Result<Option<Workbook>> {
    match discover_source(name, spec, landing)? {
        Some(path) => {
            recorder.record_file(&path)?;
            debug!("Source '{}' -> {}", name, path.display());
            Ok(Some(Workbook::open(&path)?))
        }
        None => Ok(None),
    }
}

/// Review, validate and write each dataset of a stage
fn publish(
    datasets: Vec<Dataset>,
    writer: &TableWriter,
    recorder: &mut RunRecorder,
    options: &RunOptions,
    stats: &mut RunStats,
) -> Result<()> {
    for mut dataset in datasets {
        run_recorder::review(&mut dataset);
        let outcome = writer.write_dataset(&dataset, options.strict)?;
        recorder.record_dataset(&dataset);
        stats.tables.push((dataset.name().to_string(), outcome.rows));
        stats.violations += outcome.violations;
    }
    Ok(())
}

/// Like `publish`, but folds each 15-minute dataset into the partition
/// already on disk first (unless `--force` replaces it)
fn publish_partitions(
    datasets: Vec<Dataset>,
    config: &Config,
    writer: &TableWriter,
    recorder: &mut RunRecorder,
    options: &RunOptions,
    stats: &mut RunStats,
) -> Result<()> {
    for mut dataset in datasets {
        let month = dataset
            .table
            .name
            .strip_prefix(INTERVAL_PARTITION_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .map(str::to_string);
        let Some(month) = month else {
            warn!("Unexpected interval table name '{}', skipped", dataset.name());
            continue;
        };

        if let Some(only) = &options.month {
            if &month != only {
                debug!("Skipping partition {} (only {} requested)", month, only);
                continue;
            }
        }

        let destination = config
            .output_dir()
            .join(mart_filename(&dataset.table.name));
        if destination.exists() && !options.force {
            let existing = partition::read_partition(&destination, &dataset.table.name)?;
            dataset.table = partition::merge(
                &existing,
                &dataset.table,
                &dataset.key_columns,
                "fecha_hora",
            );
        }

        run_recorder::review(&mut dataset);
        let outcome = writer.write_dataset(&dataset, options.strict)?;
        recorder.record_dataset(&dataset);
        stats.tables.push((dataset.name().to_string(), outcome.rows));
        stats.violations += outcome.violations;
    }
    Ok(())
}

fn report_stats(stats: &RunStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            println!();
            println!("{}", "Run complete".green().bold());
            println!(
                "  {} table(s), {} row(s), {}",
                stats.tables.len(),
                stats.total_rows(),
                HumanDuration(stats.duration)
            );
            for (table, rows) in &stats.tables {
                println!("  {:<28} {:>8} rows", table, rows);
            }
            if stats.violations > 0 {
                println!(
                    "  {}",
                    format!("{} validation check(s) failed", stats.violations).yellow()
                );
            }
            if stats.unmapped_entities > 0 {
                println!(
                    "  {}",
                    format!("{} unmapped plant label(s)", stats.unmapped_entities).yellow()
                );
            }
        }
        OutputFormat::Json => {
            let tables: serde_json::Map<String, serde_json::Value> = stats
                .tables
                .iter()
                .map(|(table, rows)| (table.clone(), serde_json::json!(rows)))
                .collect();
            let summary = serde_json::json!({
                "tables": tables,
                "total_rows": stats.total_rows(),
                "violations": stats.violations,
                "unmapped_entities": stats.unmapped_entities,
                "duration_seconds": stats.duration.as_secs_f64(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

fn run_plants_command(args: &PlantsArgs) -> Result<()> {
    let base_dir = args
        .base_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let config =
        Config::load(args.config_file.as_deref(), &base_dir).map(|c| c.with_base_dir(&base_dir))?;

    let (registry, path) =
        EntityRegistry::load_or_create(&config.reference_dir(), config.reconciler.fuzzy_cutoff)?;

    match args.output_format {
        OutputFormat::Human => {
            println!("{} ({} plants)", path.display(), registry.len());
            println!(
                "{:<6} {:<22} {:<8} {:>6} {:>8}  {}",
                "id", "nombre", "tipo", "anio", "mw", "zona"
            );
            for record in registry.records() {
                println!(
                    "{:<6} {:<22} {:<8} {:>6} {:>8}  {}",
                    record.central_id,
                    record.central_nombre,
                    record.tipo,
                    record
                        .anio_puesta
                        .map(|y| y.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    record
                        .potencia_mw
                        .map(|p| format!("{:.1}", p))
                        .unwrap_or_else(|| "-".to_string()),
                    record.zona
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(registry.records())?);
        }
    }
    Ok(())
}

/// Pattern-match diagnostics: list the landing files each configured
/// source would consider, and which one a run would pick
fn run_sources_command(args: &SourcesArgs) -> Result<()> {
    let base_dir = args
        .base_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let mut config =
        Config::load(args.config_file.as_deref(), &base_dir).map(|c| c.with_base_dir(&base_dir))?;
    if let Some(input) = &args.input_dir {
        config = config.with_input_dir(input.to_string_lossy());
    }

    let landing = config.input_dir();
    println!("Landing directory: {}", landing.display());

    for (name, spec) in config.source_entries() {
        let flag = if spec.required { "required" } else { "optional" };
        println!();
        println!("{} ({}, pattern '{}')", name.bold(), flag, spec.pattern);

        let candidates = candidate_files(&landing, &spec.pattern)?;
        match candidates.as_slice() {
            [] if spec.required => {
                println!("  {}", "no matching file (a run would fail)".red());
            }
            [] => {
                println!("  no matching file (empty tables would be written)");
            }
            [chosen, rest @ ..] => {
                println!("  -> {}", chosen.display());
                for ignored in rest {
                    println!("     {} (ignored, first by name wins)", ignored.display());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Cell, Dataset, Table};
    use tempfile::TempDir;

    fn mart_config(dir: &TempDir) -> Config {
        Config::default().with_base_dir(dir.path())
    }

    #[test]
    fn test_execute_on_empty_landing_respects_required_sources() {
        // The default config marks the hydrology control source as
        // required, so a bare landing directory is fatal.
        let dir = TempDir::new().unwrap();
        let config = mart_config(&dir);
        config.ensure_directories().unwrap();

        let error = execute(&config, &RunOptions::default(), false).unwrap_err();
        assert!(matches!(error, Error::MissingRequiredSource { .. }));
    }

    #[test]
    fn test_failed_run_still_appends_log_line() {
        let dir = TempDir::new().unwrap();
        let config = mart_config(&dir);
        config.ensure_directories().unwrap();

        let _ = execute(&config, &RunOptions::default(), false);

        let log = std::fs::read_to_string(
            config.logs_dir().join(crate::constants::RUNS_LOG_FILENAME),
        )
        .unwrap();
        let line: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(line["status"], "failed");
        assert!(line["error"].as_str().unwrap().contains("hidrologia"));
    }

    #[test]
    fn test_failed_run_does_not_write_metadata() {
        let dir = TempDir::new().unwrap();
        let config = mart_config(&dir);
        config.ensure_directories().unwrap();

        let _ = execute(&config, &RunOptions::default(), false);
        assert!(!config
            .output_dir()
            .join(crate::constants::METADATA_FILENAME)
            .exists());
    }

    #[test]
    fn test_publish_accumulates_stats() {
        let dir = TempDir::new().unwrap();
        let config = mart_config(&dir);
        config.ensure_directories().unwrap();

        let mut table = Table::new("generacion_mensual", &["central_id", "central", "periodo", "energia_mwh"]);
        table.push_row(vec![
            Cell::Text("CH1".into()),
            Cell::Text("CHARCANI I".into()),
            Cell::Text("201001".into()),
            Cell::Number(1.0),
        ]);
        let dataset = Dataset::new(table, &["central_id", "periodo"]);

        let writer = TableWriter::new(&config, "20250101000000");
        let mut recorder = RunRecorder::new("20250101000000");
        let mut stats = RunStats::default();
        publish(
            vec![dataset],
            &writer,
            &mut recorder,
            &RunOptions::default(),
            &mut stats,
        )
        .unwrap();

        assert_eq!(stats.tables, vec![("generacion_mensual".to_string(), 1)]);
        assert_eq!(stats.violations, 0);
        assert!(config.output_dir().join("generacion_mensual.csv").exists());
    }
}
