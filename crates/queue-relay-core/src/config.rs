//! Relay configuration.

use crate::error::ConfigError;
use chrono::Duration;
use queue_relay_runtime::{QueueName, ReceiveOptions};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Largest batch a single receive, send or delete call may carry
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest long-poll wait a receive call may request
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

/// Upper bound accepted for the visibility timeout (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u32 = 43_200;

/// What to do when a batched call succeeds but rejects some entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialFailurePolicy {
    /// Fail the step; a rejected forward entry prevents acknowledging the batch
    #[default]
    Fail,
    /// Log the rejected entries and carry on with the cycle
    ///
    /// The whole batch is still deleted from the source, so a message whose
    /// forward was rejected is lost.
    Ignore,
}

/// Settings for one relay from a source queue to a destination queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Queue messages are received from and deleted on
    pub source: String,

    /// Queue messages are forwarded to
    pub destination: String,

    /// Messages requested per receive call
    pub max_batch_size: u32,

    /// Long-poll wait per receive call; unset uses the queue default
    pub wait_time_seconds: Option<u32>,

    /// Visibility timeout for received messages; unset uses the queue default
    pub visibility_timeout_seconds: Option<u32>,

    /// Handling of per-entry failures in batched calls
    pub partial_failure_policy: PartialFailurePolicy,

    /// Stop after this many cycles; unset runs until cancelled
    pub max_cycles: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source: "fromQueueName".to_string(),
            destination: "toQueueName".to_string(),
            max_batch_size: MAX_BATCH_SIZE,
            wait_time_seconds: None,
            visibility_timeout_seconds: None,
            partial_failure_policy: PartialFailurePolicy::Fail,
            max_cycles: None,
        }
    }
}

impl RelayConfig {
    /// Create configuration for a relay between two queues
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    /// Set messages requested per receive call
    pub fn with_max_batch_size(mut self, size: u32) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set long-poll wait per receive call
    pub fn with_wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    /// Set visibility timeout for received messages
    pub fn with_visibility_timeout_seconds(mut self, seconds: u32) -> Self {
        self.visibility_timeout_seconds = Some(seconds);
        self
    }

    /// Set handling of per-entry failures
    pub fn with_partial_failure_policy(mut self, policy: PartialFailurePolicy) -> Self {
        self.partial_failure_policy = policy;
        self
    }

    /// Bound the number of cycles
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Validated source queue name
    pub fn source_queue(&self) -> Result<QueueName, ConfigError> {
        parse_queue_name("source", &self.source)
    }

    /// Validated destination queue name
    pub fn destination_queue(&self) -> Result<QueueName, ConfigError> {
        parse_queue_name("destination", &self.destination)
    }

    /// Check every setting against the limits of a batched queue backend
    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = self.source_queue()?;
        let destination = self.destination_queue()?;
        if source == destination {
            return Err(ConfigError::SameQueue {
                queue_name: source.to_string(),
            });
        }

        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::OutOfRange {
                field: "max_batch_size".to_string(),
                message: format!(
                    "{} is not between 1 and {}",
                    self.max_batch_size, MAX_BATCH_SIZE
                ),
            });
        }

        if let Some(wait) = self.wait_time_seconds {
            if wait > MAX_WAIT_TIME_SECONDS {
                return Err(ConfigError::OutOfRange {
                    field: "wait_time_seconds".to_string(),
                    message: format!("{} exceeds {}", wait, MAX_WAIT_TIME_SECONDS),
                });
            }
        }

        if let Some(visibility) = self.visibility_timeout_seconds {
            if visibility > MAX_VISIBILITY_TIMEOUT_SECONDS {
                return Err(ConfigError::OutOfRange {
                    field: "visibility_timeout_seconds".to_string(),
                    message: format!(
                        "{} exceeds {}",
                        visibility, MAX_VISIBILITY_TIMEOUT_SECONDS
                    ),
                });
            }
        }

        if self.max_cycles == Some(0) {
            return Err(ConfigError::OutOfRange {
                field: "max_cycles".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }

        Ok(())
    }

    /// Options passed to every receive call
    pub fn receive_options(&self) -> ReceiveOptions {
        let mut options = ReceiveOptions::new();
        if let Some(wait) = self.wait_time_seconds {
            options = options.with_wait_time(Duration::seconds(i64::from(wait)));
        }
        if let Some(visibility) = self.visibility_timeout_seconds {
            options = options.with_visibility_timeout(Duration::seconds(i64::from(visibility)));
        }
        options
    }
}

fn parse_queue_name(field: &str, value: &str) -> Result<QueueName, ConfigError> {
    QueueName::new(value.to_string()).map_err(|source| ConfigError::InvalidQueueName {
        field: field.to_string(),
        source,
    })
}
