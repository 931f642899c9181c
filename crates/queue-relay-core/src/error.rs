//! Error types for the relay steps and relay configuration.

use queue_relay_runtime::{BatchEntryFailure, QueueError};
use std::fmt;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// A queue name could not be resolved to an endpoint
#[derive(Debug, thiserror::Error)]
#[error("Failed to resolve queue '{queue_name}': {source}")]
pub struct ResolutionError {
    pub queue_name: String,
    #[source]
    pub source: QueueError,
}

/// Why a single relay step failed
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Backend call failed: {0}")]
    Backend(#[from] QueueError),

    #[error("{} of {total} batch entries were rejected", .failed.len())]
    PartialBatch {
        failed: Vec<BatchEntryFailure>,
        total: usize,
    },
}

/// Stage of the relay cycle an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayStage {
    Receive,
    Forward,
    Acknowledge,
}

impl fmt::Display for RelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => write!(f, "receive"),
            Self::Forward => write!(f, "forward"),
            Self::Acknowledge => write!(f, "acknowledge"),
        }
    }
}

/// Errors returned by the relay steps and the relay driver
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Receive from '{queue_name}' failed: {source}")]
    Receive {
        queue_name: String,
        #[source]
        source: StepError,
    },

    #[error("Forward to '{queue_name}' failed: {source}")]
    Forward {
        queue_name: String,
        #[source]
        source: StepError,
    },

    #[error("Acknowledge on '{queue_name}' failed: {source}")]
    Acknowledge {
        queue_name: String,
        #[source]
        source: StepError,
    },
}

impl RelayError {
    /// Stage that failed
    pub fn stage(&self) -> RelayStage {
        match self {
            Self::Receive { .. } => RelayStage::Receive,
            Self::Forward { .. } => RelayStage::Forward,
            Self::Acknowledge { .. } => RelayStage::Acknowledge,
        }
    }

    /// Queue the failing step was talking to
    pub fn queue_name(&self) -> &str {
        match self {
            Self::Receive { queue_name, .. }
            | Self::Forward { queue_name, .. }
            | Self::Acknowledge { queue_name, .. } => queue_name,
        }
    }

    /// Underlying step failure
    pub fn step_error(&self) -> &StepError {
        match self {
            Self::Receive { source, .. }
            | Self::Forward { source, .. }
            | Self::Acknowledge { source, .. } => source,
        }
    }

    /// Whether the driver stops on this error
    ///
    /// Every step failure terminates the relay; there is no retry loop.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Receive { .. } => true,
            Self::Forward { .. } => true,
            Self::Acknowledge { .. } => true,
        }
    }
}

/// Invalid relay configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid queue name for '{field}': {source}")]
    InvalidQueueName {
        field: String,
        #[source]
        source: queue_relay_runtime::ValidationError,
    },

    #[error("Source and destination must differ, both are '{queue_name}'")]
    SameQueue { queue_name: String },

    #[error("Value for '{field}' out of range: {message}")]
    OutOfRange { field: String, message: String },
}
