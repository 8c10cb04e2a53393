// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use clap::{ArgAction, Args};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid controller config: retry base delay must be positive")]
    ZeroRetryBaseDelay,
    #[error("invalid controller config: retry max delay {max:?} is below the base delay {base:?}")]
    RetryMaxBelowBase { base: Duration, max: Duration },
}

/// Runtime knobs of the controller, read from flags or the environment.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Only watch ServiceGroups and pods in this namespace (default: all namespaces).
    #[arg(long, env = "HABITAT_NAMESPACE")]
    pub namespace: Option<String>,

    /// Interval at which every cached object is redelivered as an update; 0 disables resync.
    #[arg(long, env = "HABITAT_RESYNC_PERIOD_SECS", default_value_t = 60)]
    pub resync_period_secs: u64,

    /// How many times a transiently failing event is requeued before it is dropped.
    #[arg(long, env = "HABITAT_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long, env = "HABITAT_RETRY_BASE_DELAY_MS", default_value_t = 500)]
    pub retry_base_delay_ms: u64,

    #[arg(long, env = "HABITAT_RETRY_MAX_DELAY_SECS", default_value_t = 30)]
    pub retry_max_delay_secs: u64,

    /// How many times a leader write rejected with Conflict is re-read and re-decided.
    #[arg(long, env = "HABITAT_CONFLICT_RETRIES", default_value_t = 5)]
    pub conflict_retries: u32,

    /// Rewrite the peer file to an empty address once the last running pod of a group is gone.
    #[arg(
        long,
        env = "HABITAT_CLEAR_LEADER_WHEN_EMPTY",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub clear_leader_when_empty: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            namespace: None,
            resync_period_secs: 60,
            max_retries: 5,
            retry_base_delay_ms: 500,
            retry_max_delay_secs: 30,
            conflict_retries: 5,
            clear_leader_when_empty: true,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_base_delay_ms == 0 {
            return Err(ConfigError::ZeroRetryBaseDelay);
        }
        if self.retry_max_delay() < self.retry_base_delay() {
            return Err(ConfigError::RetryMaxBelowBase {
                base: self.retry_base_delay(),
                max: self.retry_max_delay(),
            });
        }
        Ok(())
    }

    pub fn resync_period(&self) -> Option<Duration> {
        match self.resync_period_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs)
    }

    /// Exponential backoff for the given (zero-based) attempt, capped at the max delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_base_delay()
            .checked_mul(factor)
            .map_or(self.retry_max_delay(), |delay| delay.min(self.retry_max_delay()))
    }
}
