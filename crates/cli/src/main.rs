//! SiteWatch - run a monitoring sheet against live pages
//!
//! Exit status: 0 when every row passed, 1 when any row failed or errored,
//! 2 when the run could not start (config, sheet or browser problems).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitewatch_cli::config::SiteWatchConfig;
use sitewatch_cli::input::Sheet;
use sitewatch_cli::output::{self, ProgressSink};
use sitewatch_harness::{validate_batch, Dispatcher, Report, ReqwestProbe, WebDriverSession};

#[derive(Parser)]
#[command(name = "sitewatch")]
#[command(about = "Data-driven web monitoring: run a sheet of page checks")]
#[command(version)]
struct Cli {
    /// Configuration file (.yml or .yaml)
    #[arg(short, long, env = "SITEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Input sheet, overrides `input_csv`
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Annotated output sheet, overrides `output_csv`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON report path, overrides `report_json`
    #[arg(long)]
    report: Option<PathBuf>,

    /// WebDriver endpoint, overrides `webdriver.url`
    #[arg(long, env = "SITEWATCH_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Validate the sheet and exit without opening a browser
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<SiteWatchConfig> {
    let mut config = match (&cli.config, &cli.input) {
        (Some(path), _) => SiteWatchConfig::load(path)?,
        (None, Some(input)) => SiteWatchConfig::for_input(input.clone()),
        (None, None) => anyhow::bail!("Either --config or --input is required"),
    };

    if let Some(input) = &cli.input {
        config.input_csv = input.clone();
    }
    if let Some(output) = &cli.output {
        config.output_csv = output.clone();
    }
    if let Some(report) = &cli.report {
        config.report_json = Some(report.clone());
    }
    if let Some(url) = &cli.webdriver_url {
        config.webdriver.url = url.clone();
    }
    Ok(config)
}

/// Returns whether every row passed; `Err` for anything that stops the run.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = resolve_config(&cli)?;
    info!("SiteWatch v{}", env!("CARGO_PKG_VERSION"));

    let sheet = Sheet::read(&config.input_csv)?;
    let rows = sheet.rows();
    validate_batch(&rows)?;
    info!("{} row(s) validated from {}", rows.len(), config.input_csv.display());

    if cli.dry_run {
        output::print_success(&format!("{} row(s) are valid", rows.len()));
        return Ok(true);
    }

    let driver = WebDriverSession::start(&config.webdriver)
        .await
        .context("Failed to start the browser session")?;
    let probe = ReqwestProbe::new(config.probe_timeout())?;
    let dispatcher = Dispatcher::new(Arc::new(driver), Arc::new(probe), config.dispatch.settings());

    let start = Instant::now();
    let mut sink = ProgressSink::new(rows.len());
    dispatcher.run_rows(&rows, &mut sink).await;
    if let Err(e) = dispatcher.close().await {
        warn!("Browser session did not close cleanly: {}", e);
    }

    let report = Report::new(sink.finish(), start.elapsed());
    output::write_results_csv(&config.output_csv, &sheet, &report.outcomes)?;
    if let Some(path) = &config.report_json {
        report.write_json(path)?;
    }
    output::print_summary(&report);

    Ok(report.all_passed())
}
