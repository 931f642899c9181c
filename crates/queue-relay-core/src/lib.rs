//! # Queue Relay Core
//!
//! Relays messages from a source queue to a destination queue with
//! at-least-once delivery.
//!
//! This library provides:
//! - Queue endpoint resolution with a write-once cache
//! - The receive, forward and acknowledge steps of a relay cycle
//! - A driver running cycles until cancelled or a step fails
//! - Relay configuration and the relay error taxonomy
//!
//! ## Module Organization
//!
//! - [config] - Relay settings and their validation
//! - [error] - Resolution, step and relay errors
//! - [resolver] - Queue name to endpoint resolution
//! - [relay] - Relay steps and the relay driver
//!
//! Backends come from `queue-relay-runtime`; anything implementing
//! [`QueueBackend`] can be relayed between.

pub mod config;
pub mod error;
pub mod relay;
pub mod resolver;

#[cfg(test)]
mod test_support;

pub use config::{PartialFailurePolicy, RelayConfig, MAX_BATCH_SIZE, MAX_WAIT_TIME_SECONDS};
pub use error::{ConfigError, RelayError, RelayStage, ResolutionError, StepError};
pub use relay::{
    acknowledge_batch, forward_batch, receive_batch, Batch, CycleReport, RelayDriver,
    RelaySummary, StopReason,
};
pub use resolver::{EndpointCache, QueueEndpointResolver};

pub use queue_relay_runtime::QueueBackend;
