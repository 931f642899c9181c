//! Backend trait for queue operations and its factory.

use crate::error::QueueError;
use crate::message::{
    BatchOutcome, DeleteEntry, QueueEndpoint, QueueName, ReceiveOptions, ReceivedMessage,
    SendEntry,
};
use crate::provider::{ProviderConfig, ProviderType};
use crate::providers::{AwsSqsBackend, InMemoryBackend};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Interface implemented by queue backends (AWS SQS, in-memory)
///
/// The four operations map one-to-one onto backend calls. Implementations
/// do not cache endpoint lookups; callers own that decision.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Look up the endpoint of a queue by its logical name
    async fn resolve_queue(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError>;

    /// Receive up to `max_messages` messages in one call
    ///
    /// Returns whatever the backend hands back, which may be fewer than
    /// requested or none at all.
    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: u32,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Send all entries in one batched call
    async fn send_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[SendEntry],
    ) -> Result<BatchOutcome, QueueError>;

    /// Delete all entries in one batched call
    async fn delete_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[DeleteEntry],
    ) -> Result<BatchOutcome, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Get maximum batch size
    fn max_batch_size(&self) -> u32;
}

#[async_trait]
impl<T: QueueBackend + ?Sized> QueueBackend for Arc<T> {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError> {
        (**self).resolve_queue(queue).await
    }

    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: u32,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        (**self)
            .receive_messages(endpoint, max_messages, options)
            .await
    }

    async fn send_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[SendEntry],
    ) -> Result<BatchOutcome, QueueError> {
        (**self).send_batch(endpoint, entries).await
    }

    async fn delete_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[DeleteEntry],
    ) -> Result<BatchOutcome, QueueError> {
        (**self).delete_batch(endpoint, entries).await
    }

    fn provider_type(&self) -> ProviderType {
        (**self).provider_type()
    }

    fn max_batch_size(&self) -> u32 {
        (**self).max_batch_size()
    }
}

/// Factory for creating backends from configuration
pub struct QueueBackendFactory;

impl QueueBackendFactory {
    /// Create a backend for the configured provider
    pub fn create_backend(config: &ProviderConfig) -> Result<Arc<dyn QueueBackend>, QueueError> {
        match config {
            ProviderConfig::AwsSqs(aws_config) => {
                let backend =
                    AwsSqsBackend::new(aws_config.clone()).map_err(|e| e.to_queue_error())?;
                Ok(Arc::new(backend))
            }
            ProviderConfig::InMemory(memory_config) => {
                let backend = InMemoryBackend::new(memory_config.clone())?;
                Ok(Arc::new(backend))
            }
        }
    }

    /// Create an in-memory backend with default configuration
    pub fn create_test_backend() -> Arc<InMemoryBackend> {
        Arc::new(InMemoryBackend::default())
    }
}
