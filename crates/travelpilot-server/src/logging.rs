use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use etcetera::{choose_app_strategy, AppStrategy};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};
use travelpilot::config::APP_STRATEGY;

const DEFAULT_DIRECTIVES: &str =
    "travelpilot=debug,travelpilot_server=debug,mcp_client=info,tower_http=info";

/// Returns the directory for today's server logs, creating it if needed
fn get_log_directory() -> Result<PathBuf> {
    let strategy = choose_app_strategy(APP_STRATEGY.clone())
        .context("HOME environment variable not set")?;

    let base_log_dir = strategy
        .in_state_dir("logs/server")
        .unwrap_or_else(|| strategy.in_data_dir("logs/server"));

    let date_dir = base_log_dir.join(chrono::Local::now().format("%Y-%m-%d").to_string());
    fs::create_dir_all(&date_dir).context("Failed to create log directory")?;

    Ok(date_dir)
}

/// Install a JSON file layer filtered by `RUST_LOG` and a console layer at
/// INFO. The console writes to stderr so command output stays clean.
pub fn setup_logging(name: Option<&str>) -> Result<()> {
    let log_dir = get_log_directory()?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let log_filename = match name {
        Some(n) => format!("{}-{}.log", timestamp, n),
        None => format!("{}.log", timestamp),
    };

    let file_appender = RollingFileAppender::new(Rotation::NEVER, log_dir, log_filename);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let file_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_writer(file_appender)
        .with_ansi(false)
        .json()
        .with_filter(env_filter);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .pretty()
        .with_filter(LevelFilter::INFO);

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to set global subscriber")?;

    Ok(())
}
