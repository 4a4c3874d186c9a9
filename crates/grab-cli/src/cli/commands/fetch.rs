//! `grab fetch` – resolve, run and watch one task.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use grab_core::config::EngineConfig;
use grab_core::{DownloadManager, Error, PluginRegistry, TaskState};

pub const EXIT_SUCCESS: u8 = 0;
/// The task's `run` failed.
pub const EXIT_FAILED: u8 = 1;
/// No plugin claims the identifier.
pub const EXIT_UNSUPPORTED: u8 = 2;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub output_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    pub interval: Duration,
}

/// Converts `--interval` seconds, with a floor of 100ms.
pub fn poll_interval(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs.max(0.1))
        .map_err(|e| anyhow!("invalid --interval {}: {}", secs, e))
}

/// Command-line flags win over the config file.
pub fn apply_overrides(mut cfg: EngineConfig, opts: &FetchOptions) -> EngineConfig {
    if let Some(dir) = &opts.output_dir {
        cfg.output_dir = Some(dir.clone());
    }
    if let Some(workers) = opts.workers {
        cfg.workers = workers;
    }
    if let Some(retries) = opts.retries {
        let mut retry = cfg.retry.take().unwrap_or_default();
        retry.max_attempts = retries.saturating_add(1);
        cfg.retry = Some(retry);
    }
    cfg
}

pub fn run_fetch(
    registry: &PluginRegistry,
    cfg: EngineConfig,
    identifier: &str,
    opts: &FetchOptions,
) -> Result<u8> {
    let handle = match registry.resolve(identifier) {
        Ok(handle) => handle,
        Err(Error::UnsupportedIdentifier(id)) => {
            tracing::warn!(identifier = %id, "no plugin claims identifier");
            eprintln!(
                "grab: unsupported identifier {:?} (plugins: {})",
                id,
                registry.names().join(", ")
            );
            return Ok(EXIT_UNSUPPORTED);
        }
        Err(e) => return Err(e.into()),
    };

    let manager = DownloadManager::new(apply_overrides(cfg, opts))?;
    tracing::info!(
        task = %handle.name(),
        plugin = handle.plugin(),
        output_dir = %manager.output_dir().display(),
        "starting task"
    );
    handle.start(&manager)?;

    while !handle.join(Some(opts.interval)) {
        report(&handle.progress());
    }
    report(&handle.progress());
    manager.shutdown();

    match handle.state() {
        TaskState::Finished => Ok(EXIT_SUCCESS),
        TaskState::Failed(message) => {
            eprintln!("grab: task failed: {}", message);
            Ok(EXIT_FAILED)
        }
        other => {
            tracing::error!(state = ?other, "task stopped in unexpected state");
            Ok(EXIT_FAILED)
        }
    }
}

fn report(progress: &grab_core::Progress) {
    tracing::info!("{}", progress);
    println!("{}", progress);
}
