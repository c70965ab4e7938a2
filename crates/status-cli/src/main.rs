mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use console::style;
use reqwest::Client;
use tracing_subscriber::{fmt, EnvFilter};

use status_core::{DispatchOutcome, Monitor, NetworkProber, RunSummary};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Check every configured service once and notify on status changes.
#[derive(Parser)]
#[command(name = "status-monitor", version = version_string(), about)]
struct Cli {
    /// Path to the YAML config file.
    config: Option<PathBuf>,

    /// Print the run summary as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(path) = cli.config else {
        eprintln!("Usage: status-monitor <config.yaml>");
        return ExitCode::FAILURE;
    };

    let app_config = match AppConfig::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&app_config.log_format, app_config.silent_mode);
    tracing::info!(path = %path.display(), "Loaded config file");

    for warning in app_config.dangling_references() {
        tracing::warn!("{}", warning);
    }

    let client = match Client::builder()
        .user_agent(concat!("status-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let monitor_config = app_config.to_monitor_config();
    let prober = Arc::new(NetworkProber::from_config(&monitor_config, client.clone()));
    let router = app_config.build_router(&client);
    let monitor = Monitor::new(app_config.to_targets(), monitor_config, prober, router);

    let summary = monitor.run_once().await;

    if !app_config.silent_mode {
        if cli.json {
            match serde_json::to_string_pretty(&summary) {
                Ok(s) => println!("{s}"),
                Err(e) => tracing::error!(error = %e, "Failed to serialize run summary"),
            }
        } else {
            print_summary(&summary);
        }
    }

    ExitCode::SUCCESS
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!(
        "{} {}",
        style("status-monitor").bold(),
        style(format!("{} targets in {}ms", summary.reports.len(), elapsed.num_milliseconds())).dim()
    );

    for report in &summary.reports {
        let code = format!("{:>6}", report.result.code);
        let code = if report.result.is_ok() {
            style(code).green()
        } else {
            style(code).red()
        };
        let badge = if report.state_error.is_some() {
            format!("  {}", style("STATE ERROR").red().bold())
        } else if report.changed() {
            format!("  {}", style("CHANGED").yellow().bold())
        } else {
            String::new()
        };
        println!(
            "  {} {:<32} {}{}",
            code,
            report.target_id,
            style(&report.result.message).dim(),
            badge
        );

        for d in &report.dispatches {
            let outcome = match &d.outcome {
                DispatchOutcome::Sent => style(d.outcome.to_string()).green(),
                DispatchOutcome::Skipped(_) => style(d.outcome.to_string()).dim(),
                DispatchOutcome::Failed(_) => style(d.outcome.to_string()).red(),
            };
            println!("      {} {} {}", style("->").dim(), d.channel, outcome);
        }
    }

    println!(
        "{} failing, {} changed, {} sent, {} delivery failures",
        summary.failing_count(),
        summary.changed_count(),
        summary.notifications_sent(),
        summary.delivery_failures()
    );
}

/// Logs go to stderr so stdout stays clean for the summary.
fn init_tracing(log_format: &str, silent: bool) {
    let default_level = if silent { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
