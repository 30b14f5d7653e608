//! # Database Configuration
//!
//! Loaded once at startup, either from code or from a TOML document:
//!
//! ```toml
//! [submission]
//! max_iterations = 5
//! slow_submission_warn_us = 2000
//! initial_group_capacity = 256
//!
//! [stream]
//! default_capacity = 64
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Fixed-point iteration bound of a submission.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Submissions slower than this are logged at `warn`.
pub const DEFAULT_SLOW_SUBMISSION_US: u64 = 2_000;

/// Buffer size of consumers created without an explicit capacity.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

/// Configuration of the submission engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmissionConfig {
    /// Iterations after which a still-busy submission is a cycle.
    pub max_iterations: u32,
    /// Slow-submission warning threshold, in microseconds.
    pub slow_submission_warn_us: u64,
    /// Rows reserved by every newly created table.
    pub initial_group_capacity: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            slow_submission_warn_us: DEFAULT_SLOW_SUBMISSION_US,
            initial_group_capacity: 0,
        }
    }
}

impl SubmissionConfig {
    /// One iteration only: any structural change raised by a reactive
    /// engine is reported as a cycle.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_iterations: 1,
            ..Self::default()
        }
    }

    /// Parses a `SubmissionConfig` from a TOML document.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> DbResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| DbError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Slow-submission threshold as a duration.
    #[inline]
    #[must_use]
    pub fn slow_submission_threshold(&self) -> Duration {
        Duration::from_micros(self.slow_submission_warn_us)
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if `max_iterations` is zero.
    pub fn validate(&self) -> DbResult<()> {
        if self.max_iterations == 0 {
            return Err(DbError::InvalidConfig(
                "submission.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the change streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Capacity of consumers created without an explicit one.
    pub default_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

impl StreamConfig {
    /// Checks every value.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if `default_capacity` is zero.
    pub fn validate(&self) -> DbResult<()> {
        if self.default_capacity == 0 {
            return Err(DbError::InvalidConfig(
                "stream.default_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Complete database configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Submission engine settings.
    pub submission: SubmissionConfig,
    /// Change stream settings.
    pub stream: StreamConfig,
}

impl DatabaseConfig {
    /// Settings for tests and tools: strict cycle detection, small buffers.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            submission: SubmissionConfig::strict(),
            stream: StreamConfig {
                default_capacity: 8,
            },
        }
    }

    /// Parses a `DatabaseConfig` from a TOML document.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> DbResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| DbError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] naming the first invalid value.
    pub fn validate(&self) -> DbResult<()> {
        self.submission.validate()?;
        self.stream.validate()
    }
}
