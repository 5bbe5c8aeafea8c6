//! Per-run log output: plain text to stderr and the configured log file.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::config::Config;
use crate::error::{MigrationError, Result};

pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Opens the log file and routes this thread's events to it until the
/// returned guard drops.
pub fn init_run_logging(config: &Config) -> Result<DefaultGuard> {
    let file = open_append(&config.log_file)?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(parse_level(&config.log_level))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Arc::new(file)))
        .finish();

    Ok(tracing::subscriber::set_default(subscriber))
}

/// Writes the full error chain of a fatal error, replacing any earlier one.
pub fn write_traceback(path: &Path, error: &MigrationError) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(file, "{}", error.format_detailed())?;
    Ok(())
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(file)
}
