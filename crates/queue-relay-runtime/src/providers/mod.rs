//! Queue backend implementations.
//!
//! This module contains concrete implementations of the `QueueBackend`
//! trait for AWS SQS and for an in-process queue used in tests and local runs.

pub mod aws;
pub mod memory;

pub use aws::{AwsError, AwsSqsBackend};
pub use memory::InMemoryBackend;
