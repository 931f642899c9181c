//! Queue endpoint resolution with a write-once cache.
//!
//! A relay talks to exactly two queues for its whole life, so each name is
//! looked up on the backend once and the endpoint is reused afterwards.
//! Entries are never refreshed or evicted; the cache goes away with the
//! resolver that owns it.

use crate::error::ResolutionError;
use queue_relay_runtime::{QueueBackend, QueueEndpoint, QueueName};
use std::collections::HashMap;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;

/// Memoized queue name to endpoint mapping
///
/// Empty at start. A name is inserted once, on its first successful
/// resolution, and its endpoint never changes afterwards.
#[derive(Debug, Default, Clone)]
pub struct EndpointCache {
    entries: HashMap<QueueName, QueueEndpoint>,
}

impl EndpointCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached endpoint for a name, if it was resolved before
    pub fn get(&self, queue: &QueueName) -> Option<&QueueEndpoint> {
        self.entries.get(queue)
    }

    /// Record a resolved endpoint
    ///
    /// The first endpoint recorded for a name wins; later inserts for the
    /// same name are ignored and the stored endpoint is returned.
    pub fn insert(&mut self, queue: QueueName, endpoint: QueueEndpoint) -> &QueueEndpoint {
        self.entries.entry(queue).or_insert(endpoint)
    }

    /// Number of resolved names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether nothing was resolved yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves queue names through a backend, consulting the cache first
pub struct QueueEndpointResolver<B> {
    backend: B,
    cache: EndpointCache,
}

impl<B: QueueBackend> QueueEndpointResolver<B> {
    /// Create a resolver with an empty cache
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: EndpointCache::new(),
        }
    }

    /// Resolve a queue name to its endpoint
    ///
    /// A cache hit returns without touching the backend. On a miss the
    /// backend is asked once; a failure leaves the cache unchanged so the
    /// next call asks again.
    #[instrument(skip(self, queue), fields(queue = %queue))]
    pub async fn resolve(&mut self, queue: &QueueName) -> Result<QueueEndpoint, ResolutionError> {
        if let Some(endpoint) = self.cache.get(queue) {
            return Ok(endpoint.clone());
        }

        let endpoint =
            self.backend
                .resolve_queue(queue)
                .await
                .map_err(|source| ResolutionError {
                    queue_name: queue.to_string(),
                    source,
                })?;

        debug!(endpoint = %endpoint, "Cached queue endpoint");
        Ok(self.cache.insert(queue.clone(), endpoint).clone())
    }

    /// Backend used for resolution and for the relay calls
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Endpoints resolved so far
    pub fn cache(&self) -> &EndpointCache {
        &self.cache
    }
}
