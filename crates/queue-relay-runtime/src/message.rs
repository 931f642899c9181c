//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use crate::provider::ProviderType;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Maximum queue name length accepted by SQS
const MAX_QUEUE_NAME_LENGTH: usize = 80;

const FIFO_SUFFIX: &str = ".fifo";

/// Validated logical queue name
///
/// Names are 1-80 characters of ASCII alphanumerics, hyphens and underscores.
/// A trailing `.fifo` marks a FIFO queue and counts towards the length limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > MAX_QUEUE_NAME_LENGTH {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!("must be 1-{} characters", MAX_QUEUE_NAME_LENGTH),
            });
        }

        let base = name.strip_suffix(FIFO_SUFFIX).unwrap_or(&name);
        if base.is_empty() {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "name cannot consist of the .fifo suffix alone".to_string(),
            });
        }

        if !base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, underscores and a .fifo suffix allowed"
                    .to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Check whether this names a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(FIFO_SUFFIX)
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Durable address a backend uses to target a queue (for SQS, the queue URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEndpoint(String);

impl QueueEndpoint {
    /// Create new endpoint, rejecting blank values
    pub fn new(endpoint: String) -> Result<Self, ValidationError> {
        if endpoint.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "queue_endpoint".to_string(),
            });
        }

        Ok(Self(endpoint))
    }

    /// Wrap an endpoint the crate built itself
    pub(crate) fn from_trusted(endpoint: String) -> Self {
        Self(endpoint)
    }

    /// Get endpoint as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned to a message by the source queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message received from the source queue
///
/// Lives for one relay cycle. The receipt handle is only valid for the
/// delivery that produced it.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
    pub received_at: Timestamp,
}

/// Opaque token for acknowledging a received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    provider_type: ProviderType,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: String, provider_type: ProviderType) -> Self {
        Self {
            handle,
            provider_type,
        }
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Get provider type that issued the handle
    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }
}

// ============================================================================
// Batch Entries
// ============================================================================

/// One entry of a batched send, keyed by the source message id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendEntry {
    pub id: MessageId,
    pub body: Bytes,
}

impl SendEntry {
    /// Build a send entry that carries the message body unchanged
    pub fn from_message(message: &ReceivedMessage) -> Self {
        Self {
            id: message.message_id.clone(),
            body: message.body.clone(),
        }
    }
}

/// One entry of a batched delete, keyed by the source message id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEntry {
    pub id: MessageId,
    pub receipt_handle: ReceiptHandle,
}

impl DeleteEntry {
    /// Build a delete entry from the receipt captured at receive time
    pub fn from_message(message: &ReceivedMessage) -> Self {
        Self {
            id: message.message_id.clone(),
            receipt_handle: message.receipt_handle.clone(),
        }
    }
}

/// A batch entry the backend rejected inside an otherwise successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntryFailure {
    pub id: MessageId,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
}

impl std::fmt::Display for BatchEntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.id, self.code, self.message)
    }
}

/// Per-entry result of a batched send or delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub successful: Vec<MessageId>,
    pub failed: Vec<BatchEntryFailure>,
}

impl BatchOutcome {
    /// Outcome where every listed entry succeeded
    pub fn all_succeeded(ids: impl IntoIterator<Item = MessageId>) -> Self {
        Self {
            successful: ids.into_iter().collect(),
            failed: Vec::new(),
        }
    }

    /// Check whether any entry was rejected
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Total number of entries reported
    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    /// Check whether the outcome reports no entries at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Receive Options
// ============================================================================

/// Options for a single receive call
///
/// Unset values fall back to the queue's own configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Long-poll wait time
    pub wait_time: Option<Duration>,
    /// Visibility timeout applied to the received messages
    pub visibility_timeout: Option<Duration>,
}

impl ReceiveOptions {
    /// Create new receive options with backend defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set long-poll wait time
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = Some(wait_time);
        self
    }

    /// Set visibility timeout
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
