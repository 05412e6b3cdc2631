//! Configuration loading for the subscription pipeline
//!
//! Supports JSON configuration for:
//! - The shared weighted work scheduler (threads, batch size, throttling)
//! - Consumer-side blocking behaviour

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Root configuration for the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// Weighted work scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads shared by every worker-mode subscription
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Maximum elements a producer enqueues before yielding its worker
    #[serde(default = "default_work_batch_size")]
    pub work_batch_size: usize,

    /// Backlog at or above which a producer is not run
    #[serde(default = "default_max_work_weight")]
    pub max_work_weight: usize,

    /// How long a throttled producer waits before its backlog is checked again
    #[serde(default = "default_throttle_wait_ms")]
    pub throttle_wait_ms: u64,

    /// How long a producer with no new data sleeps unless woken
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_work_batch_size() -> usize {
    50
}

fn default_max_work_weight() -> usize {
    400
}

fn default_throttle_wait_ms() -> u64 {
    1
}

fn default_idle_backoff_ms() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            work_batch_size: default_work_batch_size(),
            max_work_weight: default_max_work_weight(),
            throttle_wait_ms: default_throttle_wait_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn throttle_wait(&self) -> Duration {
        Duration::from_millis(self.throttle_wait_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// Consumer-side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Upper bound on a single blocking wait for the next element
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
}

fn default_dequeue_timeout_ms() -> u64 {
    100
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
        }
    }
}

impl ConsumerConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

impl FeedConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.worker_threads must be at least 1".to_string(),
            ));
        }
        if scheduler.work_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.work_batch_size must be at least 1".to_string(),
            ));
        }
        if scheduler.max_work_weight == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_work_weight must be at least 1".to_string(),
            ));
        }
        if self.consumer.dequeue_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "consumer.dequeue_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
