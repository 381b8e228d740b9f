mod bootstrap;
mod reservation;
mod scheduler;
mod watcher;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use slotwatch_core::config::{AppConfig, LoadOptions};

const SHUTDOWN_NOTICE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "slotwatch",
    about = "Watch wedding-hall reservation slots and relay changes to Telegram",
    after_help = "Examples:\n  slotwatch --config slotwatch.toml\n  slotwatch --check"
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "Config file (defaults to slotwatch.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Load and validate config, print a redacted summary, then exit")]
    check: bool,
}

fn init_logging(config: &AppConfig) {
    use slotwatch_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };
    let config = AppConfig::load(options)?;

    if cli.check {
        println!("{}", config.redacted_summary());
        return Ok(());
    }

    init_logging(&config);
    let app = bootstrap::bootstrap(config)?;

    tracing::info!(
        event_name = "system.server.started",
        group_id = app.config.telegram.group_id,
        "slotwatch started"
    );
    app.scheduler.run_until(wait_for_shutdown()).await;

    tracing::info!(event_name = "system.server.stopping", "slotwatch stopping");
    app.scheduler.announce_shutdown(SHUTDOWN_NOTICE_TIMEOUT).await;

    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "system.signal.unavailable",
                    error = %error,
                    "SIGTERM handler unavailable; waiting for ctrl-c only"
                );
            }
        }
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            event_name = "system.signal.unavailable",
            error = %error,
            "ctrl-c handler unavailable"
        );
        std::future::pending::<()>().await;
    }
}
