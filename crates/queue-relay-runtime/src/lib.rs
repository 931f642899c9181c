//! # Queue Relay Runtime
//!
//! Backend layer for the queue relay: the operations a relay needs from a
//! message queue system, with AWS SQS and in-memory implementations.
//!
//! This library provides:
//! - Queue name resolution to backend endpoints
//! - Batched receive, send and delete calls with per-entry outcomes
//! - Backend selection from serializable configuration
//!
//! ## Module Organization
//!
//! - [error] - Error types for all backend operations
//! - [message] - Message, batch entry and identifier types
//! - [provider] - Provider types and configuration
//! - [client] - The `QueueBackend` trait and its factory
//! - [providers] - AWS SQS and in-memory backends

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueBackend, QueueBackendFactory};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    BatchEntryFailure, BatchOutcome, DeleteEntry, MessageId, QueueEndpoint, QueueName,
    ReceiptHandle, ReceiveOptions, ReceivedMessage, SendEntry, Timestamp,
};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderConfig, ProviderType};
pub use providers::{AwsSqsBackend, InMemoryBackend};
