//! rwq - read/write aware request queue
//!
//! CLI entry point for replaying request scripts through the queue.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use rwqueue::cli::{Cli, Command};
use rwqueue::config::Config;
use rwqueue::domain::ItemState;
use rwqueue::queue::{ConnectivitySignal, QueueController, QueueError, QueueHandle};
use rwqueue::script::RequestScript;
use rwqueue::transport::HttpTransport;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rwqueue")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("rwqueue.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            script,
            retries,
            retry_delay_ms,
        } => {
            debug!(script = %script.display(), retries, retry_delay_ms, "main: matched Run command");
            cmd_run(&config, &script, retries, Duration::from_millis(retry_delay_ms)).await
        }
        Command::CheckConfig => {
            debug!("main: matched CheckConfig command");
            cmd_check_config(&config)
        }
    }
}

/// Replay a script and print each response in submission order
async fn cmd_run(config: &Config, script_path: &Path, retries: u32, retry_delay: Duration) -> Result<()> {
    debug!(script = %script_path.display(), "cmd_run: called");
    let script = RequestScript::load(script_path)?;
    let transport = HttpTransport::from_config(&config.http).context("Failed to create HTTP transport")?;

    let (controller, handle) = QueueController::new(config.queue.clone(), Arc::new(transport));
    let controller = controller.on_connectivity(|signal| match signal {
        ConnectivitySignal::Lost => eprintln!("{}", "Connection lost, waiting to retry".yellow()),
        ConnectivitySignal::Restored => eprintln!("{}", "Connection restored".green()),
    });
    let signals = handle.subscribe_connectivity();
    let retrier = tokio::spawn(retry_on_connection_loss(handle.clone(), signals, retries, retry_delay));
    let controller_task = controller.spawn();

    let mut pending = Vec::with_capacity(script.requests.len());
    for request in script.requests {
        let summary = format!("{} {}", request.method_or_default(), request.url);
        pending.push((summary, handle.submit_awaitable(request)?));
    }
    info!(count = pending.len(), "cmd_run: submitted script");

    let total = pending.len();
    let mut incomplete = 0;
    for (summary, response) in pending {
        match response.wait().await {
            Ok(response) => {
                let status = if response.is_application_error() {
                    response.status.to_string().red()
                } else {
                    response.status.to_string().green()
                };
                println!("{} {}", status, summary);
                let body = response.text();
                if !body.is_empty() {
                    println!("    {}", body.trim_end());
                }
            }
            Err(QueueError::Cancelled) => {
                incomplete += 1;
                println!("{} {}", "---".dimmed(), summary);
            }
            Err(e) => return Err(e.into()),
        }
    }

    retrier.abort();
    // The retrier may already have stopped the controller
    let _ = handle.shutdown();
    controller_task.await.context("Queue controller panicked")??;

    if incomplete > 0 {
        return Err(eyre::eyre!("{} of {} requests did not complete", incomplete, total));
    }
    Ok(())
}

/// Retry after every lost connection, then give up and stop the queue
///
/// Lost is signalled once per outage, so while disconnected the queue is
/// polled for failed items every `delay`.
async fn retry_on_connection_loss(
    handle: QueueHandle,
    mut signals: broadcast::Receiver<ConnectivitySignal>,
    retries: u32,
    delay: Duration,
) {
    loop {
        match signals.recv().await {
            Ok(ConnectivitySignal::Lost) => {
                if !recover(&handle, retries, delay).await {
                    let _ = handle.shutdown();
                    return;
                }
            }
            Ok(ConnectivitySignal::Restored) => debug!("retry_on_connection_loss: restored"),
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "retry_on_connection_loss: lagged"),
            Err(RecvError::Closed) => return,
        }
    }
}

/// `true` once no failed or unconfirmed resumed requests remain
async fn recover(handle: &QueueHandle, retries: u32, delay: Duration) -> bool {
    let mut attempts = 0;
    loop {
        tokio::time::sleep(delay).await;
        let Ok(snapshot) = handle.snapshot().await else {
            return false;
        };

        if snapshot.iter().any(|item| item.state == ItemState::Failed) {
            if attempts >= retries {
                warn!(attempts, "recover: giving up");
                eprintln!("{}", format!("Giving up after {} retries", attempts).red());
                return false;
            }
            attempts += 1;
            info!(attempt = attempts, "Retrying failed requests");
            if handle.retry().is_err() {
                return false;
            }
        } else if !snapshot.iter().any(|item| item.resumed) {
            debug!(attempts, "recover: recovered");
            return true;
        }
    }
}

/// Print the effective configuration as YAML
fn cmd_check_config(config: &Config) -> Result<()> {
    debug!("cmd_check_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
