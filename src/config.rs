//! # Configuration
//!
//! Explicit per-component configuration for the relay core. Every component
//! receives its section through its constructor; nothing reads process-wide
//! state after startup. Values come from defaults overridden by environment
//! variables with the `DTE_RELAY` prefix (e.g.
//! `DTE_RELAY__BATCH__MAX_BATCH_SIZE=50`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::ambient;
use crate::error::{RelayError, Result};
use crate::resilience::CircuitBreakerConfig;

/// Authority endpoint and environment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Base URL of the Authority's reception API.
    pub base_url: String,
    /// Ambient code sent in every envelope (`00` test, `01` production).
    pub ambient: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Bearer token time-to-live in seconds. The Authority issues
    /// day-scoped tokens.
    pub token_ttl_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dtes.mh.gob.sv".to_string(),
            ambient: ambient::TEST.to_string(),
            request_timeout_secs: 30,
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl AuthorityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

/// Single-document transmitter settings. This path runs inside a caller's
/// request, so the whole retry window is measured in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Immediate re-attempts after the first failed transmission.
    pub max_retries: u32,
    /// Fixed delay between immediate re-attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_secs: 3,
        }
    }
}

impl TransmissionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Batch transmitter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum signed documents per batch envelope; larger pending sets are
    /// chunked into sequential batches.
    pub max_batch_size: usize,
    /// Interval between batch status polls, in seconds.
    pub poll_interval_secs: u64,
    /// Deadline for the whole status poll loop, in seconds. Documents still
    /// unreported when it elapses stay pending for the next run.
    pub poll_deadline_secs: u64,
    /// Attempts for Authority token acquisition before giving up on a
    /// system's replay for this run.
    pub token_max_attempts: u32,
    /// Delay between token acquisition attempts, in seconds.
    pub token_retry_delay_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            poll_interval_secs: 10,
            poll_deadline_secs: 120,
            token_max_attempts: 3,
            token_retry_delay_secs: 5,
        }
    }
}

impl BatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_secs(self.poll_deadline_secs)
    }

    pub fn token_retry_delay(&self) -> Duration {
        Duration::from_secs(self.token_retry_delay_secs)
    }
}

/// Circuit breaker thresholds, serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u64,
    /// Cool-down before the breaker optimistically re-closes, in seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 5 * 60,
        }
    }
}

impl BreakerConfig {
    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

/// Retransmission job scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between job ticks, in seconds. Deployment environments
    /// narrow this (nightly window in production, daytime in test).
    pub interval_secs: u64,
    /// Hard execution budget per run, in seconds; exceeding it cancels
    /// in-flight work.
    pub execution_budget_secs: u64,
    /// Maximum pending documents fetched per run.
    pub max_pending_documents: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            execution_budget_secs: 10 * 60,
            max_pending_documents: 500,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn execution_budget(&self) -> Duration {
        Duration::from_secs(self.execution_budget_secs)
    }
}

/// Top-level configuration for the relay core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub authority: AuthorityConfig,
    pub transmission: TransmissionConfig,
    pub batch: BatchConfig,
    pub circuit_breaker: BreakerConfig,
    pub scheduler: SchedulerConfig,
}

impl RelayConfig {
    /// Load defaults overridden by `DTE_RELAY`-prefixed environment
    /// variables, then validate.
    pub fn from_env() -> Result<Self> {
        let loaded = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("DTE_RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RelayError::Configuration {
                source_name: "environment".to_string(),
                reason: e.to_string(),
            })?;

        let config: RelayConfig =
            loaded
                .try_deserialize()
                .map_err(|e| RelayError::Configuration {
                    source_name: "environment".to_string(),
                    reason: e.to_string(),
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.authority.base_url.is_empty() {
            return Err(self.invalid("authority.base_url", "must not be empty"));
        }
        if self.authority.ambient != ambient::TEST && self.authority.ambient != ambient::PRODUCTION
        {
            return Err(self.invalid("authority.ambient", "must be \"00\" or \"01\""));
        }
        if self.batch.max_batch_size == 0 {
            return Err(self.invalid("batch.max_batch_size", "must be at least 1"));
        }
        if self.batch.poll_interval_secs == 0 {
            return Err(self.invalid("batch.poll_interval_secs", "must be at least 1"));
        }
        if self.batch.poll_deadline_secs < self.batch.poll_interval_secs {
            return Err(self.invalid(
                "batch.poll_deadline_secs",
                "must be at least the poll interval",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(self.invalid("circuit_breaker.failure_threshold", "must be at least 1"));
        }
        if self.scheduler.execution_budget_secs == 0 {
            return Err(self.invalid("scheduler.execution_budget_secs", "must be at least 1"));
        }
        if self.scheduler.max_pending_documents == 0 {
            return Err(self.invalid("scheduler.max_pending_documents", "must be at least 1"));
        }
        Ok(())
    }

    fn invalid(&self, field: &str, reason: &str) -> RelayError {
        RelayError::Configuration {
            source_name: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
