mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use asc_export_api::{
    Credentials,
    SinkTarget,
};
use asc_export_core::logging::{
    self,
    DEFAULT_LOG_FILTER,
};
use asc_export_core::{
    ConfigLoader,
    ExportConfig,
    ExportContext,
    ExportJob,
    ExportSummary,
    WarehouseBackend,
};
use clap::Parser;

use crate::prompt::TerminalPrompt;

/// Export App Store Connect analytics into date-partitioned warehouse tables
#[derive(Parser, Debug)]
#[command(name = "asc-export")]
#[command(version)]
#[command(about = "Export App Store Connect analytics into a data warehouse", long_about = None)]
struct Cli {
    /// App Store Connect user to authenticate with
    #[arg(long, env = "ASC_EXPORT_USERNAME")]
    username: String,

    /// Password for the given App Store Connect user
    #[arg(long, env = "ASC_EXPORT_PASSWORD", hide_env_values = true)]
    password: String,

    /// App Store id of the app to export
    #[arg(long)]
    app_id: String,

    /// App name written to the app_name column
    #[arg(long)]
    app_name: String,

    /// First day to export
    #[arg(long, value_name = "YYYY-MM-DD")]
    start_date: String,

    /// Last day to export
    #[arg(long, value_name = "YYYY-MM-DD")]
    end_date: String,

    /// Warehouse project
    #[arg(long)]
    project: String,

    /// Warehouse dataset
    #[arg(long, default_value = "apple_app_store")]
    dataset: String,

    /// Truncate each date partition instead of appending to it
    #[arg(long)]
    overwrite: bool,

    /// Allow exporting the most recent day, whose data may be incomplete
    #[arg(long)]
    allow_incomplete: bool,

    /// Warehouse backend: sqlite, postgres or memory (overrides config file)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<WarehouseBackend>,

    /// Directory holding SQLite datasets (overrides config file)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    asc_export_core::infrastructure::install_crypto_provider();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.verbose {
        logging::init_verbose();
    } else {
        logging::init_with_default(
            config
                .general
                .log_filter
                .as_deref()
                .unwrap_or(DEFAULT_LOG_FILTER),
        );
    }

    match run(cli, config).await {
        Ok(summary) => {
            report(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ExportConfig> {
    load_config_with(cli, |key| std::env::var(key).ok())
}

/// File and environment settings first, then CLI flags, then validation
fn load_config_with(
    cli: &Cli, lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ExportConfig> {
    let mut config = ConfigLoader::load_unvalidated(cli.config.as_deref(), lookup)
        .context("Failed to load configuration")?;

    if let Some(backend) = cli.backend {
        config.warehouse.backend = backend;
    }

    if let Some(data_dir) = &cli.data_dir {
        config.warehouse.data_dir = data_dir.to_string_lossy().to_string();
    }

    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    Ok(config)
}

async fn run(cli: Cli, config: ExportConfig) -> anyhow::Result<ExportSummary> {
    tracing::info!("Starting export");
    tracing::debug!("{}", config.warehouse.summary());

    let context = ExportContext::new(config)?;

    let credentials = Credentials::new(cli.username, cli.password);
    let prompt = TerminalPrompt::stdio();
    let session = context.login(&credentials, Some(&prompt)).await?;

    let job = ExportJob {
        target: SinkTarget {
            project: cli.project,
            dataset: cli.dataset,
        },
        app_id: cli.app_id,
        app_name: cli.app_name,
        start_date: cli.start_date,
        end_date: cli.end_date,
        overwrite: cli.overwrite,
        allow_incomplete: cli.allow_incomplete,
    };

    Ok(context.run(&session, &job).await?)
}

fn report(summary: &ExportSummary) {
    for cell in summary.cells.iter().filter(|c| c.is_abandoned()) {
        tracing::warn!(
            "Skipped {} by {} after {} attempt(s)",
            cell.metric,
            cell.dimension,
            cell.attempts
        );
    }

    if summary.partitions_failed > 0 {
        tracing::warn!(
            "{} partition(s) failed to write; re-run the export for those dates",
            summary.partitions_failed
        );
    }

    tracing::info!(
        "Wrote {} rows to {} partitions after {} fetch attempts",
        summary.rows_written,
        summary.partitions_written,
        summary.fetch_attempts()
    );
}
