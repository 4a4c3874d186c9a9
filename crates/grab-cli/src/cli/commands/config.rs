//! `grab config` – show where configuration comes from and its values.

use std::path::Path;

use anyhow::Result;
use grab_core::config::{self, EngineConfig};

/// Explicit file if given, else the XDG config (created with defaults on first use).
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    match explicit {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

pub fn run_config(explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    let cfg = load_config(explicit)?;
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}
