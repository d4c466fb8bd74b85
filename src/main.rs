mod alerts;
mod collectors;
mod config;
mod logging;
mod metrics;
mod notify;
mod report;
mod retention;
mod snapshot;

use crate::alerts::Alert;
use crate::collectors::services::ServiceChecker;
use crate::collectors::system::{Sampler, SAMPLE_WINDOW};
use crate::config::Config;
use crate::logging::LogSession;
use crate::notify::{compose_notification, MailNotifier, Notifier};
use crate::report::{OdtReportRenderer, ReportError, ReportRenderer};
use crate::snapshot::HealthSnapshot;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "hostwatch")]
#[command(version, about = "Daily host health report with email alerts")]
struct Cli {
    /// JSON or YAML config; built-in defaults when absent.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run once and print where the report was written.
    #[arg(long)]
    test: bool,
    /// Print a crontab line for a daily 08:00 run and exit.
    #[arg(long, conflicts_with = "test")]
    setup_cron: bool,
    #[arg(long)]
    print_default_config: bool,
    /// Print the snapshot and alerts as JSON after the run.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    snapshot: &'a HealthSnapshot,
    alerts: &'a [Alert],
    report: &'a Path,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_json());
        return ExitCode::SUCCESS;
    }
    if cli.setup_cron {
        print_cron_line(cli.config.as_deref());
        return ExitCode::SUCCESS;
    }

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _log = LogSession::console();
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let log = LogSession::open(&cfg.logging.dir);
    if let Some(file) = log.file() {
        info!(log_file = %file.display(), "logging to file");
    }
    if cli.test {
        println!("Running test report...");
    }

    match run_daily_report(&cfg).await {
        Ok((snapshot, alerts, report)) => {
            if cli.test {
                println!("Report saved to: {}", report.display());
            }
            if cli.json {
                let out = RunOutput {
                    snapshot: &snapshot,
                    alerts: &alerts,
                    report: &report,
                };
                match serde_json::to_string_pretty(&out) {
                    Ok(text) => println!("{text}"),
                    Err(err) => warn!(error = %err, "failed to serialize run output"),
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "daily report failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_daily_report(
    cfg: &Config,
) -> Result<(HealthSnapshot, Vec<Alert>, PathBuf), ReportError> {
    let started = Instant::now();
    info!("starting daily system report");

    let mut sampler = Sampler::new(SAMPLE_WINDOW);
    let checker = ServiceChecker::systemd(cfg.monitoring.service_timeout());
    let snapshot = collectors::assemble_snapshot(&mut sampler, &checker, &cfg.monitoring).await;

    let alerts = alerts::evaluate(&snapshot, &cfg.thresholds);
    for alert in &alerts {
        warn!(kind = ?alert.kind, "{alert}");
    }

    let renderer = OdtReportRenderer::new(&cfg.reports.output_dir);
    let report = renderer.render(&snapshot, &alerts)?;

    if let Some(path) = &cfg.reports.metrics_file {
        match metrics::write_textfile(path, &snapshot, &alerts) {
            Ok(()) => info!(path = %path.display(), "metrics written"),
            Err(err) => warn!(error = %err, "failed to write metrics"),
        }
    }

    let notification =
        compose_notification(&snapshot.hostname, &alerts, Some(&report), snapshot.timestamp);
    let delivery = MailNotifier::new(cfg.email.clone())
        .deliver(&notification)
        .await;
    info!(?delivery, "notification handled");

    let stats = retention::sweep(&cfg.reports.output_dir, cfg.reports.keep_days);
    info!(
        removed = stats.removed,
        kept = stats.kept,
        failed = stats.failed,
        keep_days = cfg.reports.keep_days,
        "old reports swept"
    );

    info!(
        alerts = alerts.len(),
        elapsed = %humantime::format_duration(round_to_millis(started.elapsed())),
        "daily report completed"
    );
    Ok((snapshot, alerts, report))
}

fn print_cron_line(config: Option<&Path>) {
    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "hostwatch".to_string());
    let config = config
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "default".to_string());
    println!("Add this line to your crontab (crontab -e):");
    println!("{}", cron_line(&exe, &config));
    println!("\nThis will run the system monitor daily at 8:00 AM");
}

fn cron_line(exe: &str, config: &str) -> String {
    format!("0 8 * * * {exe} --config {config}")
}

fn round_to_millis(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(d.as_millis() as u64)
}
