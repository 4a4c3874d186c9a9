//! CLI for the grab download engine.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grab_core::plugins;

use commands::{load_config, poll_interval, run_config, run_fetch, run_plugins, FetchOptions};

/// Top-level CLI for grab.
#[derive(Debug, Parser)]
#[command(name = "grab")]
#[command(about = "grab: resolve an identifier to a plugin and download what it names", long_about = None)]
pub struct Cli {
    /// Read configuration from FILE instead of ~/.config/grab/config.toml.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Resolve an identifier (URL, har:FILE, ...) and run the task to completion.
    Fetch {
        /// What to download; the first plugin that claims it handles it.
        identifier: String,

        /// Base output directory (overrides config).
        #[arg(long, short = 'o', value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Worker threads draining the job queue (overrides config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Retries per request after the first attempt (overrides config).
        #[arg(long, value_name = "N")]
        retries: Option<u32>,

        /// Seconds between progress reports.
        #[arg(long, default_value = "2", value_name = "SECS")]
        interval: f64,
    },

    /// List registered plugins in resolution order.
    Plugins,

    /// Show the effective configuration.
    Config,
}

impl Cli {
    pub fn run_from_args() -> Result<ExitCode> {
        let cli = Cli::parse();
        let registry = plugins::builtin();

        match cli.command {
            CliCommand::Fetch {
                identifier,
                output_dir,
                workers,
                retries,
                interval,
            } => {
                let cfg = load_config(cli.config.as_deref())?;
                tracing::debug!("loaded config: {:?}", cfg);
                let opts = FetchOptions {
                    output_dir,
                    workers,
                    retries,
                    interval: poll_interval(interval)?,
                };
                let code = run_fetch(&registry, cfg, &identifier, &opts)?;
                Ok(ExitCode::from(code))
            }
            CliCommand::Plugins => {
                run_plugins(&registry);
                Ok(ExitCode::SUCCESS)
            }
            CliCommand::Config => {
                run_config(cli.config.as_deref())?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

#[cfg(test)]
mod tests;
