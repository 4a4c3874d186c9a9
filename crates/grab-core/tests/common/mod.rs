#![allow(dead_code)]

pub mod http_server;

use std::path::Path;

use grab_core::config::{EngineConfig, RetryConfig};

/// Config writing under `dir` with millisecond retry backoff.
pub fn test_config(dir: &Path, workers: usize, max_attempts: u32) -> EngineConfig {
    EngineConfig {
        workers,
        max_connections: 4,
        connect_timeout_secs: 5,
        timeout_secs: 30,
        stall_timeout_secs: 10,
        retry: Some(RetryConfig {
            max_attempts,
            base_delay_secs: 0.01,
            max_delay_secs: 1,
        }),
        output_dir: Some(dir.to_path_buf()),
        ..EngineConfig::default()
    }
}
