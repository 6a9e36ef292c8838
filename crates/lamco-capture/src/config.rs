//! Pipeline configuration
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use lamco_capture::{FrameSize, PipelineConfig, SourceSelector};
//!
//! let config = PipelineConfig::builder()
//!     .initial_selector(SourceSelector::Index(1))
//!     .initial_frame_size(FrameSize::new(640, 480))
//!     .reopen_on_failure(true)
//!     .reopen_backoff(Duration::from_secs(1))
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::metrics::DEFAULT_RETENTION;
use crate::source::{FrameSize, SourceSelector};

/// Configuration for a [`crate::CapturePipeline`]
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source opened on start (default: device index 0)
    pub initial_selector: SourceSelector,

    /// Resolution requested on start (default: 1280x720)
    pub initial_frame_size: FrameSize,

    /// Sleep between iterations while no source is open (default: 50 ms)
    pub idle_interval: Duration,

    /// Per-read timeout for backends that support one (default: 2 s)
    ///
    /// A stalled device otherwise blocks the worker, and therefore
    /// shutdown, until the next frame arrives.
    pub read_timeout: Duration,

    /// Retry opening after a failed open (default: false)
    pub reopen_on_failure: bool,

    /// Retries per settings change when `reopen_on_failure` is set (default: 3)
    pub max_reopen_attempts: u32,

    /// Delay before each retry (default: 500 ms)
    pub reopen_backoff: Duration,

    /// Metrics window (default: 1 s)
    pub metrics_retention: Duration,

    /// Worker thread name (default: "lamco-capture")
    pub worker_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_selector: SourceSelector::default(),
            initial_frame_size: FrameSize::HD_720,
            idle_interval: Duration::from_millis(50),
            read_timeout: Duration::from_secs(2),
            reopen_on_failure: false,
            max_reopen_attempts: 3,
            reopen_backoff: Duration::from_millis(500),
            metrics_retention: DEFAULT_RETENTION,
            worker_name: "lamco-capture".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.initial_frame_size.is_empty() {
            issues.push(format!("initial_frame_size {} has a zero dimension", self.initial_frame_size));
        }

        if self.idle_interval.is_zero() {
            issues.push("idle_interval must be non-zero".to_string());
        }

        if self.read_timeout < Duration::from_millis(10) {
            issues.push("read_timeout should be at least 10ms".to_string());
        }

        if self.reopen_on_failure && self.max_reopen_attempts == 0 {
            issues.push("max_reopen_attempts must be at least 1 when reopen_on_failure is set".to_string());
        }

        if self.metrics_retention.is_zero() {
            issues.push("metrics_retention must be non-zero".to_string());
        }

        if self.worker_name.is_empty() {
            issues.push("worker_name cannot be empty".to_string());
        }

        if self.worker_name.contains('\0') {
            issues.push("worker_name cannot contain NUL bytes".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`PipelineConfig`]
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    initial_selector: Option<SourceSelector>,
    initial_frame_size: Option<FrameSize>,
    idle_interval: Option<Duration>,
    read_timeout: Option<Duration>,
    reopen_on_failure: Option<bool>,
    max_reopen_attempts: Option<u32>,
    reopen_backoff: Option<Duration>,
    metrics_retention: Option<Duration>,
    worker_name: Option<String>,
}

impl PipelineConfigBuilder {
    /// Set the source opened on start
    #[must_use]
    pub fn initial_selector(mut self, selector: SourceSelector) -> Self {
        self.initial_selector = Some(selector);
        self
    }

    /// Set the resolution requested on start
    #[must_use]
    pub fn initial_frame_size(mut self, size: FrameSize) -> Self {
        self.initial_frame_size = Some(size);
        self
    }

    /// Set the idle sleep used while no source is open
    #[must_use]
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = Some(interval);
        self
    }

    /// Set the per-read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Retry opening after a failure
    #[must_use]
    pub fn reopen_on_failure(mut self, enable: bool) -> Self {
        self.reopen_on_failure = Some(enable);
        self
    }

    /// Set the retry limit
    #[must_use]
    pub fn max_reopen_attempts(mut self, attempts: u32) -> Self {
        self.max_reopen_attempts = Some(attempts);
        self
    }

    /// Set the delay before each retry
    #[must_use]
    pub fn reopen_backoff(mut self, backoff: Duration) -> Self {
        self.reopen_backoff = Some(backoff);
        self
    }

    /// Set the metrics window
    #[must_use]
    pub fn metrics_retention(mut self, retention: Duration) -> Self {
        self.metrics_retention = Some(retention);
        self
    }

    /// Set the worker thread name
    #[must_use]
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> PipelineConfig {
        let defaults = PipelineConfig::default();

        PipelineConfig {
            initial_selector: self.initial_selector.unwrap_or(defaults.initial_selector),
            initial_frame_size: self.initial_frame_size.unwrap_or(defaults.initial_frame_size),
            idle_interval: self.idle_interval.unwrap_or(defaults.idle_interval),
            read_timeout: self.read_timeout.unwrap_or(defaults.read_timeout),
            reopen_on_failure: self.reopen_on_failure.unwrap_or(defaults.reopen_on_failure),
            max_reopen_attempts: self.max_reopen_attempts.unwrap_or(defaults.max_reopen_attempts),
            reopen_backoff: self.reopen_backoff.unwrap_or(defaults.reopen_backoff),
            metrics_retention: self.metrics_retention.unwrap_or(defaults.metrics_retention),
            worker_name: self.worker_name.unwrap_or(defaults.worker_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.initial_selector, SourceSelector::Index(0));
        assert_eq!(config.initial_frame_size, FrameSize::new(1280, 720));
        assert_eq!(config.idle_interval, Duration::from_millis(50));
        assert!(!config.reopen_on_failure);
        assert_eq!(config.worker_name, "lamco-capture");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = PipelineConfig::builder()
            .initial_frame_size(FrameSize::new(640, 480))
            .reopen_on_failure(true)
            .max_reopen_attempts(5)
            .worker_name("cam-worker")
            .build();

        assert_eq!(config.initial_frame_size, FrameSize::new(640, 480));
        assert!(config.reopen_on_failure);
        assert_eq!(config.max_reopen_attempts, 5);
        assert_eq!(config.worker_name, "cam-worker");
        // Untouched fields keep defaults
        assert_eq!(config.read_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_validation() {
        let config = PipelineConfig {
            initial_frame_size: FrameSize::new(0, 720),
            idle_interval: Duration::ZERO,
            reopen_on_failure: true,
            max_reopen_attempts: 0,
            worker_name: String::new(),
            ..Default::default()
        };

        let issues = config.validate().unwrap_err();
        assert_eq!(issues.len(), 4);
        assert!(issues.iter().any(|i| i.contains("idle_interval")));
    }
}
