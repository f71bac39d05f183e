//! Command-line interface for the emissions loader binary.

use crate::config::{PipelineConfig, SourceSpec};
use crate::models::LoadReport;
use crate::processor::EmissionsPipeline;
use crate::store::SqliteStore;
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "emissions-loader")]
#[command(about = "Normalize emission-factor files and load them into a star-schema store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// TOML configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory laid out as <source_id>/<file>.{csv,xlsx}
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Explicit source file as ID=PATH (repeatable, disables discovery)
    #[arg(long = "source", value_name = "ID=PATH", value_parser = parse_source)]
    pub sources: Vec<SourceSpec>,

    /// SQLite database file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Create the star-schema tables before loading
    #[arg(long)]
    pub init_schema: bool,

    /// Read and canonicalize without writing to the store
    #[arg(long)]
    pub dry_run: bool,

    /// Case-fold activity names like other categorical fields
    #[arg(long)]
    pub fold_activity_case: bool,

    /// Decimal places kept for numeric measures
    #[arg(long, value_name = "N")]
    pub precision: Option<u32>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Load the configuration file (if any) and apply flag overrides
    pub fn build_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(data_dir) = &self.data_dir {
            config = config.with_data_dir(data_dir);
        }
        for spec in &self.sources {
            config = config.with_source(spec.source_id.clone(), spec.path.clone());
        }
        if let Some(database) = &self.database {
            config = config.with_database_path(database);
        }
        if let Some(precision) = self.precision {
            config = config.with_precision(precision);
        }
        if self.fold_activity_case {
            config = config.with_fold_activity_case();
        }
        if self.dry_run {
            config = config.with_dry_run();
        }
        if self.quiet {
            config = config.without_progress();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Parse `ID=PATH` into a source spec
fn parse_source(value: &str) -> std::result::Result<SourceSpec, String> {
    match value.split_once('=') {
        Some((id, path)) if !id.trim().is_empty() && !path.is_empty() => {
            Ok(SourceSpec::new(id.trim(), path))
        }
        _ => Err(format!("expected ID=PATH, got '{}'", value)),
    }
}

/// Set up structured logging on stderr
pub fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("emissions_loader={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Open the store, optionally create the schema, and run the pipeline
pub async fn run(args: &Args) -> Result<LoadReport> {
    let config = args.build_config()?;

    // A dry run never touches the database file
    let mut store = if config.dry_run {
        SqliteStore::open_in_memory()?
    } else {
        SqliteStore::open(&config.database).with_context(|| {
            format!("Failed to open database {}", config.database.path.display())
        })?
    };

    if args.init_schema {
        store.apply_schema().context("Failed to create star schema")?;
    }

    if !args.quiet {
        println!("{}", "Starting emission-factor load".bright_green().bold());
        println!(
            "  {} {}",
            "Database:".bright_cyan(),
            config.database.path.display()
        );
    }

    let pipeline = EmissionsPipeline::new(config)?;
    Ok(pipeline.run(&mut store).await?)
}

/// Print the colored run summary
pub fn print_summary(report: &LoadReport) {
    println!("\n{}", "Load Summary".bright_green().bold());
    println!(
        "  {} {}",
        "Started:".bright_cyan(),
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        report.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files read:".bright_cyan(),
        report.files_read.to_string().bright_white()
    );
    println!(
        "  {} {} read, {} accepted",
        "Rows:".bright_cyan(),
        report.rows_read.to_string().bright_white(),
        report.rows_loaded.to_string().bright_white()
    );

    if report.rows_rejected() > 0 {
        println!(
            "  {} {}",
            "Rows rejected:".bright_red(),
            report.rows_rejected().to_string().bright_red().bold()
        );
        for rejection in &report.rejections {
            println!("    {}", rejection);
        }
    }

    if !report.dropped_columns.is_empty() {
        println!(
            "  {} {}",
            "Columns dropped:".bright_yellow(),
            report.dropped_columns.len()
        );
        for dropped in &report.dropped_columns {
            println!("    {} ({})", dropped.column, dropped.source_id);
        }
    }

    if report.dry_run {
        println!("  {}", "Dry run: nothing written".bright_yellow());
        return;
    }

    let dimensions = &report.dimensions;
    for (label, count) in [
        ("Activities:", dimensions.activities),
        ("Regions:", dimensions.regions),
        ("Sources:", dimensions.sources),
        ("Units:", dimensions.units),
        ("Statuses:", dimensions.statuses),
    ] {
        println!(
            "  {} {} new, {} total",
            label.bright_cyan(),
            count.inserted.to_string().bright_white(),
            count.total
        );
    }
    println!(
        "  {} {}",
        "Facts inserted:".bright_cyan(),
        report.facts_inserted.to_string().bright_white().bold()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_source() {
        let spec = parse_source("S2=data-raw/S2/File 2-1.csv").unwrap();
        assert_eq!(spec, SourceSpec::new("S2", "data-raw/S2/File 2-1.csv"));

        assert!(parse_source("no-separator").is_err());
        assert!(parse_source("=path.csv").is_err());
        assert!(parse_source("S2=").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "emissions-loader",
            "--source",
            "S2=a.csv",
            "--database",
            "out.db",
            "--precision",
            "3",
            "--dry-run",
            "--fold-activity-case",
            "-q",
        ])
        .unwrap();

        let config = args.build_config().unwrap();
        assert_eq!(config.sources, vec![SourceSpec::new("S2", "a.csv")]);
        assert_eq!(config.database.path, PathBuf::from("out.db"));
        assert_eq!(config.precision, 3);
        assert!(config.dry_run);
        assert!(config.fold_activity_case);
        assert!(!config.show_progress);
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("loader.toml");
        fs::write(&path, "precision = 4\ndata_dir = \"inputs\"\n").unwrap();

        let args = Args::try_parse_from([
            "emissions-loader",
            "--config",
            path.to_str().unwrap(),
            "--precision",
            "6",
        ])
        .unwrap();

        let config = args.build_config().unwrap();
        assert_eq!(config.precision, 6);
        assert_eq!(config.data_dir, Some(PathBuf::from("inputs")));
    }

    #[test]
    fn test_invalid_precision_is_rejected() {
        let args =
            Args::try_parse_from(["emissions-loader", "--precision", "99"]).unwrap();
        assert!(args.build_config().is_err());
    }

    #[test]
    fn test_log_levels() {
        let quiet = Args::try_parse_from(["emissions-loader", "-q"]).unwrap();
        assert_eq!(quiet.get_log_level(), "error");

        let debug = Args::try_parse_from(["emissions-loader", "-vv"]).unwrap();
        assert_eq!(debug.get_log_level(), "debug");

        assert!(Args::try_parse_from(["emissions-loader", "-q", "-v"]).is_err());
    }
}
