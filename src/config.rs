//! Pipeline configuration.
//!
//! [`PipelineConfig`] is the one record a run needs: where the document is,
//! where the output goes, the conversion options, how models are loaded and
//! how many times a failed conversion may be attempted. Nothing is read from
//! process-wide constants; the binary fills this record from its flags.

use crate::device::ComputeDevice;
use crate::models::LoaderSettings;
use crate::options::ConversionOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default input document.
pub const DEFAULT_INPUT: &str = "./book.pdf";

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./out";

/// Everything one pipeline run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub options: ConversionOptions,
    pub loader: LoaderSettings,
    /// Skip accelerator probing and use this device.
    pub device: Option<ComputeDevice>,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            options: ConversionOptions::default(),
            loader: LoaderSettings::default(),
            device: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_loader(mut self, loader: LoaderSettings) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_device(mut self, device: ComputeDevice) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// How many times a failed conversion is attempted.
///
/// Only conversion failures are retried; input, option, load and write
/// errors are returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay before attempt number `attempt` (1-based; attempt 1 has none).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 2).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}
