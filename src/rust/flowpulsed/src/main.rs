mod report;

use anyhow::Result;
use crossbeam_channel::{select, Receiver};
use flowpulse_config::{Config, ConfigError, SourceConfig};
use flowpulse_tracker::{
  run_source, EventSender, HistoryExport, JsonLinesSource, Pipeline, PipelineSettings, SourceError,
  SourceSummary,
};
use signal_hook::{
  consts::{SIGHUP, SIGINT, SIGTERM},
  iterator::Signals,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

// Use JemAllocator only on supported platforms
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use jemallocator::Jemalloc;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// How often the current verdict is logged.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Configure console logging, with the level taken from `RUST_LOG`.
pub fn set_console_logging() -> anyhow::Result<()> {
  let level = if let Ok(level) = std::env::var("RUST_LOG") {
    match level.to_lowercase().as_str() {
      "trace" => LevelFilter::TRACE,
      "debug" => LevelFilter::DEBUG,
      "info" => LevelFilter::INFO,
      "warn" => LevelFilter::WARN,
      "error" => LevelFilter::ERROR,
      _ => LevelFilter::WARN,
    }
  } else {
    LevelFilter::WARN
  };

  let subscriber = tracing_subscriber::fmt()
      .with_max_level(level)
      .compact()
      .with_file(true)
      .with_line_number(true)
      .with_thread_names(true)
      .with_target(false)
      .finish();

  tracing::subscriber::set_global_default(subscriber)?;
  Ok(())
}

fn load_config() -> Result<Arc<Config>> {
  match flowpulse_config::load_config() {
    Ok(config) => Ok(config),
    Err(ConfigError::ConfigDoesNotExist(path)) => {
      warn!("No configuration at {path}, running with defaults");
      Ok(Arc::new(Config::default()))
    }
    Err(e) => {
      error!("Unable to load configuration: {e}");
      Err(e.into())
    }
  }
}

/// Read events on a thread of their own, reporting back when the source
/// runs dry or fails.
fn spawn_source(
  config: SourceConfig,
  sender: EventSender,
) -> Result<Receiver<Result<SourceSummary, SourceError>>> {
  let (done_tx, done_rx) = crossbeam_channel::bounded(1);
  std::thread::Builder::new()
    .name("Event Source".to_string())
    .spawn(move || {
      let result = match &config.path {
        Some(path) => JsonLinesSource::open(Path::new(path), config.stamp_missing_timestamps)
          .and_then(|mut source| run_source(&mut source, &sender)),
        None => {
          info!("Reading packet events from stdin");
          let mut source =
            JsonLinesSource::new(std::io::stdin().lock(), config.stamp_missing_timestamps);
          run_source(&mut source, &sender)
        }
      };
      let _ = done_tx.send(result);
    })?;
  Ok(done_rx)
}

fn spawn_signal_handler() -> Result<Receiver<i32>> {
  let (tx, rx) = crossbeam_channel::bounded(4);
  let mut signals = Signals::new([SIGINT, SIGHUP, SIGTERM])?;
  std::thread::Builder::new().name("Signal Handler".to_string()).spawn(move || {
    for sig in signals.forever() {
      match sig {
        SIGINT | SIGTERM => {
          match sig {
            SIGINT => warn!("Terminating on SIGINT"),
            _ => warn!("Terminating on SIGTERM"),
          }
          if tx.send(sig).is_err() {
            break;
          }
        }
        SIGHUP => warn!("SIGHUP received; configuration changes take effect on restart"),
        _ => warn!("No handler for signal: {sig}"),
      }
    }
  })?;
  Ok(rx)
}

fn export_history(export: &HistoryExport, path: &str) -> Result<()> {
  let json = serde_json::to_string_pretty(export)?;
  std::fs::write(path, json)?;
  info!("History written to {path}");
  Ok(())
}

fn main() -> Result<()> {
  set_console_logging()?;

  let config = load_config()?;
  let pipeline = Pipeline::start(PipelineSettings::from(config.as_ref()))?;
  let history = pipeline.history();

  let signals = spawn_signal_handler()?;
  let source_done = spawn_source(config.source.clone(), pipeline.sender())?;
  let report_ticker = crossbeam_channel::tick(REPORT_INTERVAL);

  let source_result = loop {
    select! {
      recv(report_ticker) -> _ => {
        if let Some(tick) = pipeline.latest() {
          report::log_tick(&tick);
        }
      }
      recv(signals) -> _ => break None,
      recv(source_done) -> msg => match msg {
        Ok(result) => break Some(result),
        Err(_) => {
          error!("Event source thread exited without reporting");
          break None;
        }
      },
    }
  };

  let summary = pipeline.stop()?;
  report::log_summary(&summary);

  if let Some(path) = &config.pipeline.history_export_path {
    if let Err(e) = export_history(&history.export(), path) {
      error!("Unable to export history to {path}: {e:?}");
    }
  }

  match source_result {
    Some(Err(e)) => {
      error!("Event source failed: {e}");
      Err(e.into())
    }
    _ => Ok(()),
  }
}
