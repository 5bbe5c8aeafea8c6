use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::logging;
use crate::migrate;

const DEFAULT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Run { config: PathBuf },
    Watch { config: PathBuf, interval: u64 },
    Help,
}

/// Parse the arguments after the program name.
///
/// Supported forms:
///   trackit-jira run srq.json
///   trackit-jira srq.json
///   trackit-jira watch srq.json --interval 120
///   trackit-jira help
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some(first) = args.first() else {
        return Ok(Command::Help);
    };

    match first.as_str() {
        "help" | "-h" | "--help" => Ok(Command::Help),
        "run" => {
            let config = single_config_path(&args[1..])?;
            Ok(Command::Run { config })
        }
        "watch" => parse_watch_args(&args[1..]),
        other if other.starts_with('-') => bail!("Unknown option: {other}"),
        _ => {
            let config = single_config_path(args)?;
            Ok(Command::Run { config })
        }
    }
}

fn single_config_path(args: &[String]) -> Result<PathBuf> {
    match args {
        [] => bail!("Missing config file\n\nUsage: trackit-jira run <config.json>"),
        [path] => Ok(PathBuf::from(path)),
        [_, extra, ..] => bail!("Unexpected argument: {extra}"),
    }
}

fn parse_watch_args(args: &[String]) -> Result<Command> {
    let mut config: Option<PathBuf> = None;
    let mut interval = DEFAULT_INTERVAL_SECS;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-i" | "--interval" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("Missing value for --interval flag");
                };
                interval = value
                    .parse()
                    .with_context(|| format!("Invalid interval: {value}"))?;
                if interval == 0 {
                    bail!("Interval must be at least 1 second");
                }
            }
            other if config.is_none() && !other.starts_with('-') => {
                config = Some(PathBuf::from(other));
            }
            other => bail!("Unexpected argument: {other}"),
        }
        i += 1;
    }

    let Some(config) = config else {
        bail!("Missing config file\n\nUsage: trackit-jira watch <config.json> [--interval <secs>]");
    };
    Ok(Command::Watch { config, interval })
}

/// One migration run. Fails only on errors that abort the run.
pub async fn handle_run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    match migrate::run_with_config(&config).await {
        Ok(summary) => {
            println!("Migration finished for {}:", config.project_key());
            println!("{summary}");
            Ok(())
        }
        Err(e) => {
            report_traceback(&config, &e);
            Err(e.into())
        }
    }
}

/// Runs a migration every `interval` seconds until Ctrl-C. Failed runs are
/// reported and the loop keeps going.
pub async fn handle_watch(config_path: &Path, interval: u64) -> Result<()> {
    println!(
        "Watching {} every {interval}s (Ctrl-C to stop)",
        config_path.display()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    watch_loop(config_path, Duration::from_secs(interval), shutdown).await;
    println!("Stopping watch");
    Ok(())
}

/// Runs cycles until `shutdown` completes. A shutdown during a run stops
/// the loop once that run has finished.
async fn watch_loop<F>(config_path: &Path, interval: Duration, mut shutdown: Pin<&mut F>) -> usize
where
    F: Future,
{
    let mut cycles = 0;
    loop {
        let cycle = async {
            match Config::load(config_path) {
                Ok(config) => match migrate::run_with_config(&config).await {
                    Ok(summary) => println!("{summary}"),
                    Err(e) => {
                        eprintln!("Migration run failed: {e}");
                        report_traceback(&config, &e);
                    }
                },
                Err(e) => eprintln!("Skipping run: {e}"),
            }
        };

        tokio::pin!(cycle);

        let mut stop = false;
        loop {
            tokio::select! {
                _ = &mut shutdown, if !stop => {
                    eprintln!("Ctrl-C received, stopping after this run");
                    stop = true;
                }
                _ = &mut cycle => break,
            }
        }
        cycles += 1;
        if stop {
            return cycles;
        }

        tokio::select! {
            _ = &mut shutdown => return cycles,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

fn report_traceback(config: &Config, error: &crate::error::MigrationError) {
    if let Some(path) = &config.traceback_file {
        if let Err(e) = logging::write_traceback(path, error) {
            eprintln!("Failed to write traceback to {}: {e}", path.display());
        }
    }
}

pub fn print_help() {
    println!("trackit-jira: move open TrackIT work orders into Jira\n");
    println!("USAGE:");
    println!("  trackit-jira run <config.json>     Migrate once and exit");
    println!("  trackit-jira <config.json>         Same as run");
    println!("  trackit-jira watch <config.json>   Migrate repeatedly until Ctrl-C");
    println!("  trackit-jira help                  Show this message");
    println!();
    println!("WATCH OPTIONS:");
    println!("  -i, --interval <secs>  Seconds between runs (default {DEFAULT_INTERVAL_SECS})");
    println!();
    println!("EXAMPLES:");
    println!("  trackit-jira run srq.json");
    println!("  trackit-jira watch crq.json --interval 300");
}
