//! In-memory queue backend for testing and local development.
//!
//! This module provides a functional in-memory backend that:
//! - Resolves queue names to `memory://<name>` endpoints
//! - Hides received messages for a visibility timeout and redelivers them
//!   when they are not deleted in time
//! - Reports per-entry failures in batched calls the way SQS does
//!
//! It is the backend used by the relay's unit and integration tests and by
//! the CLI's `in-memory` provider.

use crate::client::QueueBackend;
use crate::error::{ConfigurationError, QueueError, ValidationError};
use crate::message::{
    BatchEntryFailure, BatchOutcome, DeleteEntry, MessageId, QueueEndpoint, QueueName,
    ReceiptHandle, ReceiveOptions, ReceivedMessage, SendEntry, Timestamp,
};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const ENDPOINT_SCHEME: &str = "memory://";

/// Largest body a send accepts per entry
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Longest visibility timeout a backend accepts, 12 hours
const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;

/// How often a long-polling receive checks an empty queue again
const LONG_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Storage for all queues, keyed by name
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

impl QueueStorage {
    fn queue_for_endpoint(
        &mut self,
        endpoint: &QueueEndpoint,
    ) -> Result<&mut InMemoryQueue, QueueError> {
        let name = endpoint
            .as_str()
            .strip_prefix(ENDPOINT_SCHEME)
            .and_then(|name| QueueName::new(name.to_string()).ok())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: endpoint.to_string(),
            })?;

        self.queues
            .get_mut(&name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }
}

/// Internal state for a single queue
struct InMemoryQueue {
    endpoint: QueueEndpoint,
    /// Visible messages in arrival order
    messages: VecDeque<StoredMessage>,
    /// Received but not yet deleted, keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    fn new(name: &QueueName) -> Self {
        Self {
            endpoint: QueueEndpoint::from_trusted(format!("{}{}", ENDPOINT_SCHEME, name.as_str())),
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    fn depth(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }

    /// Move messages whose visibility timeout lapsed back to the front
    fn release_expired(&mut self) {
        let now = Timestamp::now();
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut released: Vec<StoredMessage> = expired
            .iter()
            .filter_map(|receipt| self.in_flight.remove(receipt))
            .map(|in_flight| in_flight.message)
            .collect();

        released.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        for message in released.into_iter().rev() {
            self.messages.push_front(message);
        }
    }
}

/// A message stored in the queue
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    enqueued_at: Timestamp,
    delivery_count: u32,
}

/// A message hidden from consumers until `visible_at`
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Timestamp,
}

// ============================================================================
// InMemoryBackend
// ============================================================================

/// In-memory queue backend
///
/// Cloning shares the underlying storage, so a test can keep a handle for
/// seeding and inspection while the relay owns another.
#[derive(Clone)]
pub struct InMemoryBackend {
    storage: Arc<RwLock<QueueStorage>>,
    config: InMemoryConfig,
}

impl InMemoryBackend {
    /// Create new in-memory backend, pre-creating the configured queues
    pub fn new(config: InMemoryConfig) -> Result<Self, QueueError> {
        if config.visibility_timeout_seconds > MAX_VISIBILITY_TIMEOUT_SECONDS {
            return Err(QueueError::ConfigurationError(ConfigurationError::Invalid {
                message: format!(
                    "in-memory visibility timeout of {}s exceeds {}s",
                    config.visibility_timeout_seconds, MAX_VISIBILITY_TIMEOUT_SECONDS
                ),
            }));
        }

        let mut queues = HashMap::new();
        for name in &config.queues {
            let name = QueueName::new(name.clone()).map_err(|e| {
                QueueError::ConfigurationError(ConfigurationError::Invalid {
                    message: format!("invalid in-memory queue name '{}': {}", name, e),
                })
            })?;
            let queue = InMemoryQueue::new(&name);
            queues.insert(name, queue);
        }

        Ok(Self {
            storage: Arc::new(RwLock::new(QueueStorage { queues })),
            config,
        })
    }

    /// Create a queue if it does not exist and return its endpoint
    pub fn create_queue(&self, name: &QueueName) -> Result<QueueEndpoint, QueueError> {
        let mut storage = self.write_storage()?;
        let queue = storage
            .queues
            .entry(name.clone())
            .or_insert_with(|| InMemoryQueue::new(name));
        Ok(queue.endpoint.clone())
    }

    /// Append a message to a queue, returning the id the queue assigned
    pub fn enqueue(&self, name: &QueueName, body: Bytes) -> Result<MessageId, QueueError> {
        let mut storage = self.write_storage()?;
        let max_queue_size = self.config.max_queue_size;
        let queue = storage
            .queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })?;

        if queue.depth() >= max_queue_size {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.to_string(),
                code: "QueueFull".to_string(),
                message: format!("queue '{}' holds {} messages", name, max_queue_size),
            });
        }

        let message_id = MessageId::new();
        queue.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body,
            enqueued_at: Timestamp::now(),
            delivery_count: 0,
        });
        Ok(message_id)
    }

    /// Bodies of all visible messages in queue order
    pub fn visible_bodies(&self, name: &QueueName) -> Result<Vec<Bytes>, QueueError> {
        let storage = self.read_storage()?;
        let queue = storage
            .queues
            .get(name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })?;
        Ok(queue.messages.iter().map(|m| m.body.clone()).collect())
    }

    /// Number of messages in the queue, visible or in flight
    pub fn queue_depth(&self, name: &QueueName) -> Result<usize, QueueError> {
        let storage = self.read_storage()?;
        storage
            .queues
            .get(name)
            .map(InMemoryQueue::depth)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }

    /// Number of received messages that have not been deleted
    pub fn in_flight_count(&self, name: &QueueName) -> Result<usize, QueueError> {
        let storage = self.read_storage()?;
        storage
            .queues
            .get(name)
            .map(|queue| queue.in_flight.len())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: name.to_string(),
            })
    }

    fn read_storage(&self) -> Result<std::sync::RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| Self::poisoned())
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| Self::poisoned())
    }

    fn poisoned() -> QueueError {
        QueueError::ProviderError {
            provider: ProviderType::InMemory.to_string(),
            code: "StoragePoisoned".to_string(),
            message: "queue storage lock was poisoned".to_string(),
        }
    }

    fn validate_batch_size(&self, size: usize) -> Result<(), QueueError> {
        if size == 0 {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.to_string(),
                code: "EmptyBatchRequest".to_string(),
                message: "batch request contains no entries".to_string(),
            });
        }

        let max_size = self.max_batch_size() as usize;
        if size > max_size {
            return Err(QueueError::BatchTooLarge { size, max_size });
        }

        Ok(())
    }

    fn validate_distinct_ids<'a>(
        ids: impl Iterator<Item = &'a MessageId>,
    ) -> Result<(), QueueError> {
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(QueueError::ProviderError {
                    provider: ProviderType::InMemory.to_string(),
                    code: "BatchEntryIdsNotDistinct".to_string(),
                    message: format!("entry id '{}' appears more than once", id),
                });
            }
        }
        Ok(())
    }

    /// Move up to `max_messages` visible messages in flight
    fn take_visible(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: u32,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = Timestamp::now();
        let visible_at = now
            .as_datetime()
            .checked_add_signed(visibility)
            .map(Timestamp::from_datetime)
            .ok_or_else(|| {
                QueueError::ValidationError(ValidationError::OutOfRange {
                    field: "visibility_timeout".to_string(),
                    message: format!("{}s is not a representable timeout", visibility.num_seconds()),
                })
            })?;

        let mut storage = self.write_storage()?;
        let queue = storage.queue_for_endpoint(endpoint)?;
        queue.release_expired();
        let mut received = Vec::new();

        while received.len() < max_messages as usize {
            let Some(mut message) = queue.messages.pop_front() else {
                break;
            };
            message.delivery_count += 1;

            let receipt = uuid::Uuid::new_v4().to_string();
            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                receipt_handle: ReceiptHandle::new(receipt.clone(), ProviderType::InMemory),
                delivery_count: message.delivery_count,
                received_at: now.clone(),
            });
            queue.in_flight.insert(
                receipt,
                InFlightMessage {
                    message,
                    visible_at: visible_at.clone(),
                },
            );
        }

        Ok(received)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage {
                queues: HashMap::new(),
            })),
            config: InMemoryConfig::default(),
        }
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError> {
        let storage = self.read_storage()?;
        storage
            .queues
            .get(queue)
            .map(|q| q.endpoint.clone())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: u32,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        if max_messages == 0 || max_messages > self.max_batch_size() {
            return Err(QueueError::BatchTooLarge {
                size: max_messages as usize,
                max_size: self.max_batch_size() as usize,
            });
        }

        let visibility = options.visibility_timeout.unwrap_or_else(|| {
            Duration::seconds(self.config.visibility_timeout_seconds as i64)
        });
        let deadline = options
            .wait_time
            .and_then(|wait| wait.to_std().ok())
            .map(|wait| tokio::time::Instant::now() + wait);

        loop {
            let received = self.take_visible(endpoint, max_messages, visibility)?;
            if !received.is_empty() {
                return Ok(received);
            }

            let now = tokio::time::Instant::now();
            match deadline {
                Some(deadline) if now < deadline => {
                    tokio::time::sleep((deadline - now).min(LONG_POLL_INTERVAL)).await;
                }
                _ => {
                    // Keep idle relays cancellable on a single-threaded runtime
                    tokio::task::yield_now().await;
                    return Ok(received);
                }
            }
        }
    }

    async fn send_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[SendEntry],
    ) -> Result<BatchOutcome, QueueError> {
        self.validate_batch_size(entries.len())?;
        Self::validate_distinct_ids(entries.iter().map(|entry| &entry.id))?;

        let max_queue_size = self.config.max_queue_size;
        let mut storage = self.write_storage()?;
        let queue = storage.queue_for_endpoint(endpoint)?;

        let mut outcome = BatchOutcome::default();
        for entry in entries {
            if entry.body.len() > MAX_MESSAGE_SIZE {
                outcome.failed.push(BatchEntryFailure {
                    id: entry.id.clone(),
                    code: "MessageTooLong".to_string(),
                    message: format!(
                        "body is {} bytes (max: {})",
                        entry.body.len(),
                        MAX_MESSAGE_SIZE
                    ),
                    sender_fault: true,
                });
                continue;
            }

            if queue.depth() >= max_queue_size {
                outcome.failed.push(BatchEntryFailure {
                    id: entry.id.clone(),
                    code: "QueueFull".to_string(),
                    message: format!("queue holds {} messages", max_queue_size),
                    sender_fault: false,
                });
                continue;
            }

            queue.messages.push_back(StoredMessage {
                message_id: MessageId::new(),
                body: entry.body.clone(),
                enqueued_at: Timestamp::now(),
                delivery_count: 0,
            });
            outcome.successful.push(entry.id.clone());
        }

        Ok(outcome)
    }

    async fn delete_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[DeleteEntry],
    ) -> Result<BatchOutcome, QueueError> {
        self.validate_batch_size(entries.len())?;
        Self::validate_distinct_ids(entries.iter().map(|entry| &entry.id))?;

        let mut storage = self.write_storage()?;
        let queue = storage.queue_for_endpoint(endpoint)?;

        let mut outcome = BatchOutcome::default();
        for entry in entries {
            match queue.in_flight.remove(entry.receipt_handle.handle()) {
                Some(_) => outcome.successful.push(entry.id.clone()),
                None => outcome.failed.push(BatchEntryFailure {
                    id: entry.id.clone(),
                    code: "ReceiptHandleIsInvalid".to_string(),
                    message: format!(
                        "receipt handle '{}' is not in flight",
                        entry.receipt_handle.handle()
                    ),
                    sender_fault: true,
                }),
            }
        }

        Ok(outcome)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }

    fn max_batch_size(&self) -> u32 {
        ProviderType::InMemory.max_batch_size()
    }
}
