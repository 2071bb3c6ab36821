//! Configuration module for stagepipe
//!
//! This module handles stage and pipeline configuration:
//! - [`StageConfig`] - thread count, buffer size and retry wait strategy of one stage
//! - [`WaitStrategy`] - how a worker pauses between pop/push retries
//! - [`PipelineConfig`] - named stage configs, loadable from TOML
//!
//! # Example
//!
//! ```toml
//! [stages.source]
//! n_threads = 2
//! buffer_size = 64
//!
//! [stages.sink]
//! n_threads = 4
//! buffer_size = 64
//! wait = { kind = "sleep", micros = 20 }
//! ```

use crate::error::{StageError, StageResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of workers per stage
pub const DEFAULT_THREADS: usize = 1;

/// Default queue capacity per port
pub const DEFAULT_BUFFER_SIZE: usize = 16;

/// Spin iterations double each retry up to this many retries
const SPIN_LIMIT: u32 = 6;

/// Retries after which backoff stops yielding and starts sleeping
const YIELD_LIMIT: u32 = 10;

/// Sleep used by backoff once spinning and yielding are exhausted
const BACKOFF_SLEEP: Duration = Duration::from_micros(50);

/// How a worker waits between two pop/push attempts.
///
/// Every strategy returns control to the worker after a bounded pause so the
/// cancellation signal is re-checked at least once per pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Busy-spin with a CPU relax hint.
    Spin,
    /// Yield the thread to the OS scheduler.
    Yield,
    /// Sleep for a fixed interval.
    Sleep { micros: u64 },
    /// Spin, then yield, then sleep briefly as retries accumulate.
    #[default]
    Backoff,
}

impl WaitStrategy {
    /// Pause before retry number `retry` (0-based).
    pub fn pause(&self, retry: u32) {
        match *self {
            WaitStrategy::Spin => std::hint::spin_loop(),
            WaitStrategy::Yield => std::thread::yield_now(),
            WaitStrategy::Sleep { micros } => std::thread::sleep(Duration::from_micros(micros)),
            WaitStrategy::Backoff => {
                if retry < SPIN_LIMIT {
                    for _ in 0..(1u32 << retry) {
                        std::hint::spin_loop();
                    }
                } else if retry < YIELD_LIMIT {
                    std::thread::yield_now();
                } else {
                    std::thread::sleep(BACKOFF_SLEEP);
                }
            }
        }
    }
}

/// Construction parameters of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Number of worker threads (and task replicas)
    pub n_threads: usize,

    /// Queue capacity of every port buffer; at least `n_threads`
    pub buffer_size: usize,

    /// Pause between pop/push retries
    pub wait: WaitStrategy,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            n_threads: DEFAULT_THREADS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            wait: WaitStrategy::default(),
        }
    }
}

impl StageConfig {
    pub fn new(buffer_size: usize, n_threads: usize) -> Self {
        Self {
            n_threads,
            buffer_size,
            ..Default::default()
        }
    }

    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    /// Check `n_threads > 0` and `buffer_size >= n_threads`.
    pub fn validate(&self) -> StageResult<()> {
        if self.n_threads == 0 {
            return Err(StageError::InvalidArgument(format!(
                "'n_threads' has to be strictly positive ('n_threads' = {})",
                self.n_threads
            )));
        }
        if self.buffer_size < self.n_threads {
            return Err(StageError::InvalidArgument(format!(
                "'buffer_size' has to be equal or greater than 'n_threads' ('buffer_size' = {}, 'n_threads' = {})",
                self.buffer_size, self.n_threads
            )));
        }
        Ok(())
    }
}

/// Stage configurations keyed by stage name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stages: IndexMap<String, StageConfig>,
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> StageResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StageError::Config(format!("Failed to parse pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a pipeline config from disk
    pub fn load(path: impl AsRef<Path>) -> StageResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StageError::Config(format!("Failed to read pipeline config {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Save pipeline config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> StageResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StageError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| StageError::Config(format!("Failed to serialize pipeline config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            StageError::Config(format!("Failed to write pipeline config {:?}: {}", path, e))
        })
    }

    /// Validate every stage, naming the offending stage on failure
    pub fn validate(&self) -> StageResult<()> {
        for (name, stage) in &self.stages {
            stage
                .validate()
                .map_err(|e| e.with_context(format!("Stage '{}'", name)))?;
        }
        Ok(())
    }

    /// Config of stage `name`
    pub fn stage(&self, name: &str) -> StageResult<&StageConfig> {
        self.stages
            .get(name)
            .ok_or_else(|| StageError::Config(format!("No configuration for stage '{}'", name)))
    }
}
