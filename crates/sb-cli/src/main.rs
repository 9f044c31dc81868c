//! CLI entry point for the scanbuddy acquisition watcher.
//!
//! Watches a folder the scanner exports into, sorts each incoming instance
//! into `<folder>/<study>/<series>/`, and reports arrivals and run resets
//! until interrupted. The folder is removed on exit.
//!
//! # Usage
//!
//! ```bash
//! # Watch the default folder (/tmp/scanbuddy)
//! scanbuddy
//!
//! # Watch a specific folder, printing events as JSON lines
//! scanbuddy --folder /data/incoming --json
//!
//! # Load settings from a file, overriding the poll interval
//! scanbuddy --config scanbuddy.json --poll-interval-ms 250
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use sb_core::Config;
use sb_watcher::{DicomWatcher, DispatchStats, WatchEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watch a folder for incoming DICOM files and sort them by study and series.
///
/// Only the most recent series is kept: when a new series starts arriving,
/// the previous one is deleted.
#[derive(Debug, Parser)]
#[command(name = "scanbuddy", version, about, long_about = None)]
struct Cli {
    /// Folder to watch. Created on start and removed on exit.
    ///
    /// Defaults to `/tmp/scanbuddy` (or the value in `--config`).
    #[arg(short, long, env = "SCANBUDDY_FOLDER")]
    folder: Option<Utf8PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, env = "SCANBUDDY_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Glob matched against incoming file names.
    #[arg(long)]
    pattern: Option<String>,

    /// Interval between folder polls, in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Print events to stdout as JSON lines.
    #[arg(long)]
    json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr so `--json` output on stdout stays machine readable.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the optional config file and CLI overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or the resulting
/// configuration is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(folder) = &cli.folder {
        config.watch.root.clone_from(folder);
    }
    if let Some(pattern) = &cli.pattern {
        config.watch.file_pattern.clone_from(pattern);
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.watch.poll_interval_ms = interval;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATION
// =============================================================================

/// Runs the watcher until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the watcher fails to start or stop.
async fn run(config: &Config, json: bool) -> color_eyre::Result<()> {
    run_until(config, json, shutdown_signal()).await
}

/// Runs the watcher until `shutdown` resolves or reporting fails.
///
/// The watcher is always stopped, and its root removed, before any error is
/// returned.
async fn run_until(
    config: &Config,
    json: bool,
    shutdown: impl Future<Output = color_eyre::Result<()>>,
) -> color_eyre::Result<()> {
    let mut watcher = DicomWatcher::new(&config.watch)?;
    let mut events = watcher.subscribe();
    watcher.start().await?;

    info!(folder = %watcher.root(), pattern = %config.watch.file_pattern, "Watching for files");

    tokio::pin!(shutdown);

    let failure = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Err(err) = report_event(&event, json) {
                        break Some(err);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event consumer fell behind");
                }
                Err(RecvError::Closed) => break None,
            },
            result = &mut shutdown => {
                info!("Shutting down");
                break result.err();
            }
        }
    };

    watcher.stop().await?;
    if let Some(err) = failure {
        return Err(err);
    }
    report_stats(&watcher.stats(), json)?;

    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix.
async fn shutdown_signal() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Reports a single event, either as a log line or a JSON line on stdout.
fn report_event(event: &WatchEvent, json: bool) -> color_eyre::Result<()> {
    if json {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer(&mut handle, event)?;
        writeln!(handle)?;
        return Ok(());
    }

    match event {
        WatchEvent::Arrival(arrival) => info!(
            path = %arrival.path,
            study = %arrival.header.study_uid,
            series = %arrival.header.series_uid,
            instance = ?arrival.header.instance_number,
            "Arrival"
        ),
        WatchEvent::Reset => info!("New series started; previous run removed"),
    }
    Ok(())
}

/// Reports the final dispatch counters.
fn report_stats(stats: &DispatchStats, json: bool) -> color_eyre::Result<()> {
    if json {
        #[derive(serde::Serialize)]
        struct Summary<'a> {
            kind: &'static str,
            #[serde(flatten)]
            stats: &'a DispatchStats,
        }

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer(
            &mut handle,
            &Summary {
                kind: "summary",
                stats,
            },
        )?;
        writeln!(handle)?;
    } else {
        info!(
            arrivals = stats.arrivals,
            resets = stats.resets,
            skipped = stats.skipped(),
            "Session summary"
        );
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Resolve configuration and run
    let config = build_config(&cli)?;
    run(&config, cli.json).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scanbuddy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let cli = parse(&[
            "--folder",
            "/data/incoming",
            "--pattern",
            "*.ima",
            "--poll-interval-ms",
            "250",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.watch.root.as_str(), "/data/incoming");
        assert_eq!(config.watch.file_pattern, "*.ima");
        assert_eq!(config.watch.poll_interval_ms, 250);
    }

    #[test]
    fn test_config_file_is_loaded_then_overridden() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scanbuddy.json");
        std::fs::write(
            &path,
            r#"{"watch": {"root": "/from/file", "poll_interval_ms": 500}}"#,
        )
        .unwrap();

        let cli = parse(&["-c", path.to_str().unwrap(), "--poll-interval-ms", "100"]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.watch.root.as_str(), "/from/file");
        assert_eq!(config.watch.poll_interval_ms, 100);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let cli = parse(&["--poll-interval-ms", "0"]);
        assert!(build_config(&cli).is_err());
    }

    fn config_in(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.watch.root = Utf8PathBuf::from_path_buf(dir.path().join("incoming")).unwrap();
        config.watch.poll_interval_ms = 50;
        config
    }

    #[tokio::test]
    async fn test_shutdown_error_still_removes_folder() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_in(&dir);

        let result = run_until(&config, false, async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Err(color_eyre::eyre::eyre!("signal handler unavailable"))
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("signal handler unavailable"));
        assert!(!config.watch.root.exists());
    }

    #[tokio::test]
    async fn test_clean_shutdown_removes_folder() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_in(&dir);

        run_until(&config, false, async { Ok(()) }).await.unwrap();
        assert!(!config.watch.root.exists());
    }
}
