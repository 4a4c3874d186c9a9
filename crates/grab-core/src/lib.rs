pub mod config;
pub mod error;
pub mod logging;

// Engine
pub mod manager;
pub mod plugins;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod task;
pub mod transport;
pub mod url_model;
pub mod worker;

pub use error::{Error, Result};
pub use manager::DownloadManager;
pub use queue::{Job, Priority};
pub use registry::{FromIdentifier, Plugin, PluginRegistry, RegistryBuilder};
pub use task::{Progress, Task, TaskContext, TaskHandle, TaskState};
