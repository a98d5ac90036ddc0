//! Service configuration.
//!
//! Loaded from environment variables with defaults and validation. The
//! operator latency table drives how long a worker sleeps before replying,
//! which is what makes the simulated computation observable.

use std::time::Duration;

use snafu::Snafu;

use crate::types::Operator;

/// Configuration loading failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// An environment variable was present but unusable.
    #[snafu(display("invalid value '{value}' for {key}: {reason}"))]
    InvalidValue {
        /// Variable name.
        key: String,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn duration_ms_from_env(key: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            let ms: u64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: format!("must be a millisecond count: {e}"),
            })?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

/// Per-operator simulated latencies.
#[derive(Debug, Clone)]
pub struct OperatorTimings {
    /// Sleep before replying to an addition.
    pub time_addition: Duration,
    /// Sleep before replying to a subtraction.
    pub time_subtraction: Duration,
    /// Sleep before replying to a multiplication.
    pub time_multiplication: Duration,
    /// Sleep before replying to a division.
    pub time_division: Duration,
}

impl OperatorTimings {
    /// Load from `TIME_ADDITION_MS`, `TIME_SUBTRACTION_MS`,
    /// `TIME_MULTIPLICATION_MS` and `TIME_DIVISION_MS`.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            time_addition: duration_ms_from_env("TIME_ADDITION_MS", 200)?,
            time_subtraction: duration_ms_from_env("TIME_SUBTRACTION_MS", 200)?,
            time_multiplication: duration_ms_from_env("TIME_MULTIPLICATION_MS", 300)?,
            time_division: duration_ms_from_env("TIME_DIVISION_MS", 400)?,
        })
    }

    /// The configured latency for one operator.
    pub fn duration_for(&self, operator: Operator) -> Duration {
        match operator {
            Operator::Add => self.time_addition,
            Operator::Subtract => self.time_subtraction,
            Operator::Multiply => self.time_multiplication,
            Operator::Divide => self.time_division,
        }
    }

    /// Zero latency everywhere; useful for tests.
    pub fn instant() -> Self {
        Self {
            time_addition: Duration::ZERO,
            time_subtraction: Duration::ZERO,
            time_multiplication: Duration::ZERO,
            time_division: Duration::ZERO,
        }
    }
}

impl Default for OperatorTimings {
    fn default() -> Self {
        Self {
            time_addition: Duration::from_millis(200),
            time_subtraction: Duration::from_millis(200),
            time_multiplication: Duration::from_millis(300),
            time_division: Duration::from_millis(400),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of polling workers to run.
    pub computing_power: usize,
    /// How long an idle worker sleeps between polls.
    pub poll_interval: Duration,
}

impl WorkerSettings {
    /// Load from `COMPUTING_POWER` and `WORKER_POLL_INTERVAL_MS`.
    pub fn load() -> Result<Self, ConfigError> {
        let computing_power = match std::env::var("COMPUTING_POWER") {
            Ok(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "COMPUTING_POWER".to_string(),
                value: raw.clone(),
                reason: format!("must be a worker count: {e}"),
            })?,
            Err(_) => 4,
        };

        Ok(Self {
            computing_power,
            poll_interval: duration_ms_from_env("WORKER_POLL_INTERVAL_MS", 100)?,
        })
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            computing_power: 4,
            poll_interval: Duration::from_millis(100),
        }
    }
}
