//! CLI command handlers, one per file.

mod config;
mod fetch;
mod plugins;

pub use config::{load_config, run_config};
pub use fetch::{poll_interval, run_fetch, FetchOptions};
pub use plugins::run_plugins;
