//! Worker Configuration
//!
//! Settings for a [`Worker`](crate::execution::Worker), built once and
//! passed in explicitly. Can be loaded from YAML:
//!
//! ```yaml
//! name: billing-worker
//! max_concurrent_runs: 8
//! event_buffer: 128
//! surface_run_errors: true
//! ```
//!
//! Every field is optional.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{Result, WorkflowError};

/// Default capacity of the event queue.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Worker settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Name used in log output
    #[serde(default = "default_name")]
    pub name: String,

    /// Maximum number of runs executing at once
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Capacity of the event queue; pushes wait when it is full
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Return the first failed run's error from `Worker::start`
    #[serde(default)]
    pub surface_run_errors: bool,
}

fn default_name() -> String {
    "worker".to_string()
}

fn default_max_concurrent_runs() -> usize {
    num_cpus::get().max(1)
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_concurrent_runs: default_max_concurrent_runs(),
            event_buffer: default_event_buffer(),
            surface_run_errors: false,
        }
    }
}

impl WorkerConfig {
    /// Sets the worker name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the concurrent run limit.
    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max;
        self
    }

    /// Sets the event queue capacity.
    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    /// Makes `Worker::start` return the first failed run's error.
    pub fn with_surface_run_errors(mut self, surface: bool) -> Self {
        self.surface_run_errors = surface;
        self
    }

    /// Checks that limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Config("name must not be empty".to_string()));
        }
        if self.max_concurrent_runs == 0 {
            return Err(WorkflowError::Config(
                "max_concurrent_runs must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_runs > Semaphore::MAX_PERMITS {
            return Err(WorkflowError::Config(format!(
                "max_concurrent_runs must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.event_buffer == 0 {
            return Err(WorkflowError::Config(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: WorkerConfig = serde_yaml::from_str(yaml).map_err(|e| {
            WorkflowError::Config(format!("failed to parse worker config YAML: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Loads a worker configuration from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use eventrunner::config::load_config;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_config("worker.yaml")?;
///     println!("{} runs at most {} jobs at once", config.name, config.max_concurrent_runs);
///     Ok(())
/// }
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<WorkerConfig> {
    let path = path.as_ref();
    info!("Loading worker config from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        WorkflowError::Config(format!(
            "failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    debug!("Config content loaded ({} bytes)", content.len());
    WorkerConfig::from_yaml_str(&content)
}
