//! Pipewatch command line: monitor pipeline health and inspect run history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipewatch::config::PipewatchConfig;
use pipewatch::errors::PipewatchError;
use pipewatch::history::{JsonlRunHistoryReader, RunHistoryStore};
use pipewatch::materialization::{JsonlMaterializationReader, MaterializationVolumeSource};
use pipewatch::monitor::{
    AlertRuleSet, FileAlertLog, FileReportStore, MonitorCycle, MonitorScheduler, MonitoringReport,
};
use pipewatch::observability::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pipewatch")]
#[command(about = "Monitor ETL pipeline runs and raise alerts", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the monitored pipeline
    #[arg(long, global = true)]
    pipeline: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one monitor cycle and print a summary
    Monitor,

    /// Run monitor cycles periodically until interrupted
    Watch {
        /// Override the interval between cycles, in seconds
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Reload the alert rule file before every cycle
        #[arg(long)]
        reload_rules: bool,
    },

    /// Print recent runs as JSON
    Runs {
        /// Maximum number of runs to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Write the default alert rules
    InitAlerts {
        /// Overwrite an existing rule file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let configuration = e
                .downcast_ref::<PipewatchError>()
                .is_some_and(PipewatchError::is_configuration_error);
            if configuration {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = PipewatchConfig::load(cli.config.as_deref())?;
    if let Some(pipeline) = cli.pipeline {
        config.pipeline_name = pipeline;
        config.validate()?;
    }
    init_logging(config.log_format)?;

    match cli.command {
        Commands::Monitor => monitor_command(&config).await,
        Commands::Watch {
            interval_secs,
            reload_rules,
        } => watch_command(&config, interval_secs, reload_rules).await,
        Commands::Runs { limit } => runs_command(&config, limit).await,
        Commands::InitAlerts { force } => init_alerts_command(&config, force).await,
    }
}

async fn build_cycle(config: &PipewatchConfig) -> Result<MonitorCycle> {
    let rules = AlertRuleSet::load_or_init(&config.alert_rules_file)
        .await
        .map_err(PipewatchError::from)?;
    tracing::info!(
        path = %config.alert_rules_file.display(),
        rules = rules.len(),
        "Loaded alert rules"
    );

    let materializations = Arc::new(JsonlMaterializationReader::new(
        config.materialization_path(),
    ));
    Ok(MonitorCycle::new(
        config.pipeline_name.clone(),
        Arc::new(JsonlRunHistoryReader::new(config.history_path())),
        Arc::new(MaterializationVolumeSource::new(materializations)),
        Arc::new(FileAlertLog::new(&config.alert_log_file)),
        Arc::new(FileReportStore::new(&config.report_dir)),
    )
    .with_rules(rules)
    .with_sample_size(config.sample_size))
}

async fn monitor_command(config: &PipewatchConfig) -> Result<()> {
    let cycle = build_cycle(config).await?;
    let report = cycle
        .run_cycle()
        .await
        .context("monitor cycle failed")?;
    print_summary(config, &report);
    Ok(())
}

async fn watch_command(
    config: &PipewatchConfig,
    interval_secs: Option<u64>,
    reload_rules: bool,
) -> Result<()> {
    let period = match interval_secs {
        Some(0) => {
            return Err(PipewatchError::Config("--interval-secs must be > 0".into()).into());
        }
        Some(secs) => Duration::from_secs(secs),
        None => config.monitor_interval(),
    };

    let cycle = Arc::new(build_cycle(config).await?);
    let scheduler = MonitorScheduler::new(cycle, period).with_rule_reload(reload_rules);
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await;
    Ok(())
}

async fn runs_command(config: &PipewatchConfig, limit: usize) -> Result<()> {
    let history = JsonlRunHistoryReader::new(config.history_path());
    let runs = history
        .query_recent_runs(&config.pipeline_name, limit)
        .await
        .with_context(|| format!("reading {}", history.path().display()))?;
    println!("{}", serde_json::to_string_pretty(&runs)?);
    Ok(())
}

async fn init_alerts_command(config: &PipewatchConfig, force: bool) -> Result<()> {
    let path = &config.alert_rules_file;
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(PipewatchError::Config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        ))
        .into());
    }
    let rules = AlertRuleSet::write_defaults(path)
        .await
        .map_err(PipewatchError::from)?;
    println!("Wrote {} default alert rules to {}", rules.len(), path.display());
    Ok(())
}

fn print_summary(config: &PipewatchConfig, report: &MonitoringReport) {
    let stats = &report.pipeline_stats;
    println!("\n=== Pipeline Monitoring Summary ===");
    println!("Timestamp: {}", pipewatch::utils::format_iso8601(&report.timestamp));
    println!("Pipeline: {}", stats.pipeline);
    println!("Health: {}", report.health_status.to_string().to_uppercase());
    println!(
        "Runs sampled: {} ({} succeeded, {} failed, {} running)",
        stats.total_runs, stats.successful_runs, stats.failed_runs, stats.running_runs
    );
    println!("Failure rate: {:.1}%", stats.failure_rate * 100.0);
    if let Some(total) = report.data_stats.total_messages {
        println!("Records loaded: {total}");
    }

    println!("Alerts: {}", report.alert_count);
    for alert in &report.alerts {
        println!("  [{}] {}", alert.severity.as_str().to_uppercase(), alert.message);
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    println!(
        "Full report: {}",
        config.report_dir.join(pipewatch::monitor::LATEST_REPORT_FILE).display()
    );
}
