//! # Relay Loop
//!
//! Moves messages from a source queue to a destination queue in cycles of
//! receive, forward and acknowledge.
//!
//! Each cycle:
//! 1. Receives up to one batch from the source
//! 2. Sends every body to the destination in one batched call, keyed by the
//!    source message id
//! 3. Deletes the same batch from the source using the receipt handles
//!    captured at receive time
//!
//! A message is only deleted after its forward succeeded, so a crash between
//! steps 2 and 3 delivers it again (at-least-once). Any step failure stops
//! the driver.

use crate::config::{PartialFailurePolicy, RelayConfig};
use crate::error::{ConfigError, RelayError, RelayStage, StepError};
use crate::resolver::{EndpointCache, QueueEndpointResolver};
use queue_relay_runtime::{
    BatchOutcome, DeleteEntry, QueueBackend, QueueName, ReceiveOptions, ReceivedMessage,
    SendEntry,
};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;

/// Messages received by one receive call, in the order the backend returned them
pub type Batch = Vec<ReceivedMessage>;

// ============================================================================
// Relay Steps
// ============================================================================

/// Receive the next batch from a queue
///
/// Makes exactly one receive call for up to `max_messages` messages and
/// returns what came back, which may be empty.
pub async fn receive_batch<B: QueueBackend>(
    resolver: &mut QueueEndpointResolver<B>,
    source: &QueueName,
    max_messages: u32,
    options: &ReceiveOptions,
) -> Result<Batch, RelayError> {
    let wrap = |source_error: StepError| RelayError::Receive {
        queue_name: source.to_string(),
        source: source_error,
    };

    let endpoint = resolver
        .resolve(source)
        .await
        .map_err(|e| wrap(e.into()))?;

    resolver
        .backend()
        .receive_messages(&endpoint, max_messages, options)
        .await
        .map_err(|e| wrap(e.into()))
}

/// Send the bodies of a batch to the destination in one call
///
/// Entry ids are the source message ids and bodies are passed through
/// unchanged. An empty batch makes no backend call.
pub async fn forward_batch<B: QueueBackend>(
    resolver: &mut QueueEndpointResolver<B>,
    destination: &QueueName,
    batch: &[ReceivedMessage],
    policy: PartialFailurePolicy,
) -> Result<BatchOutcome, RelayError> {
    let wrap = |source: StepError| RelayError::Forward {
        queue_name: destination.to_string(),
        source,
    };

    if batch.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let endpoint = resolver
        .resolve(destination)
        .await
        .map_err(|e| wrap(e.into()))?;

    let entries: Vec<SendEntry> = batch.iter().map(SendEntry::from_message).collect();
    let outcome = resolver
        .backend()
        .send_batch(&endpoint, &entries)
        .await
        .map_err(|e| wrap(e.into()))?;

    apply_policy(outcome, entries.len(), policy, RelayStage::Forward).map_err(wrap)
}

/// Delete a forwarded batch from the source in one call
///
/// Must only be called after [`forward_batch`] succeeded for the same batch.
/// An empty batch makes no backend call.
pub async fn acknowledge_batch<B: QueueBackend>(
    resolver: &mut QueueEndpointResolver<B>,
    source: &QueueName,
    batch: &[ReceivedMessage],
    policy: PartialFailurePolicy,
) -> Result<BatchOutcome, RelayError> {
    let wrap = |source_error: StepError| RelayError::Acknowledge {
        queue_name: source.to_string(),
        source: source_error,
    };

    if batch.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let endpoint = resolver
        .resolve(source)
        .await
        .map_err(|e| wrap(e.into()))?;

    let entries: Vec<DeleteEntry> = batch.iter().map(DeleteEntry::from_message).collect();
    let outcome = resolver
        .backend()
        .delete_batch(&endpoint, &entries)
        .await
        .map_err(|e| wrap(e.into()))?;

    apply_policy(outcome, entries.len(), policy, RelayStage::Acknowledge).map_err(wrap)
}

fn apply_policy(
    outcome: BatchOutcome,
    total: usize,
    policy: PartialFailurePolicy,
    stage: RelayStage,
) -> Result<BatchOutcome, StepError> {
    if !outcome.has_failures() {
        return Ok(outcome);
    }

    match policy {
        PartialFailurePolicy::Fail => Err(StepError::PartialBatch {
            failed: outcome.failed,
            total,
        }),
        PartialFailurePolicy::Ignore => {
            for failure in &outcome.failed {
                warn!(
                    stage = %stage,
                    id = %failure.id,
                    code = %failure.code,
                    sender_fault = failure.sender_fault,
                    "Batch entry rejected; continuing"
                );
            }
            Ok(outcome)
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Counts for one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub received: usize,
    pub forwarded: usize,
    pub acknowledged: usize,
}

impl CycleReport {
    /// Check whether the cycle found nothing to relay
    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}

/// Why the driver stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    CycleLimitReached,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::CycleLimitReached => write!(f, "cycle limit reached"),
        }
    }
}

/// Totals for a driver run that ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub cycles_completed: u64,
    pub messages_relayed: u64,
    pub stop_reason: StopReason,
}

// ============================================================================
// Relay Driver
// ============================================================================

/// Runs relay cycles between one source and one destination queue
///
/// Owns the backend and the endpoint cache. Cycles run strictly one after
/// another on the calling task.
pub struct RelayDriver<B> {
    resolver: QueueEndpointResolver<B>,
    config: RelayConfig,
    source: QueueName,
    destination: QueueName,
    receive_options: ReceiveOptions,
    cycles_completed: u64,
    messages_relayed: u64,
}

impl<B: QueueBackend> RelayDriver<B> {
    /// Create a driver after validating the configuration
    pub fn new(backend: B, config: RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let source = config.source_queue()?;
        let destination = config.destination_queue()?;

        if config.max_batch_size > backend.max_batch_size() {
            return Err(ConfigError::OutOfRange {
                field: "max_batch_size".to_string(),
                message: format!(
                    "{} exceeds the {} backend limit of {}",
                    config.max_batch_size,
                    backend.provider_type(),
                    backend.max_batch_size()
                ),
            });
        }

        Ok(Self {
            resolver: QueueEndpointResolver::new(backend),
            receive_options: config.receive_options(),
            config,
            source,
            destination,
            cycles_completed: 0,
            messages_relayed: 0,
        })
    }

    /// Configuration the driver runs with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Endpoints resolved so far
    pub fn endpoint_cache(&self) -> &EndpointCache {
        self.resolver.cache()
    }

    /// Number of cycles completed without error
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Number of messages forwarded and acknowledged so far
    pub fn messages_relayed(&self) -> u64 {
        self.messages_relayed
    }

    /// Run exactly one receive, forward and acknowledge cycle
    pub async fn run_cycle(&mut self) -> Result<CycleReport, RelayError> {
        let batch = self.receive().await?;
        self.complete_cycle(batch).await
    }

    /// Run cycles until cancelled, the cycle limit is hit, or a step fails
    ///
    /// The token is checked before every cycle and while waiting on a
    /// receive. A cycle that got past its receive is always finished, so a
    /// batch is never left forwarded but unacknowledged by a shutdown.
    #[instrument(skip_all, fields(source = %self.source, destination = %self.destination))]
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<RelaySummary, RelayError> {
        info!(
            max_batch_size = self.config.max_batch_size,
            max_cycles = ?self.config.max_cycles,
            "Relay started"
        );

        let stop_reason = loop {
            if let Some(max_cycles) = self.config.max_cycles {
                if self.cycles_completed >= max_cycles {
                    break StopReason::CycleLimitReached;
                }
            }
            if shutdown.is_cancelled() {
                break StopReason::Cancelled;
            }

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break StopReason::Cancelled,
                received = self.receive() => received,
            };

            let outcome = match received {
                Ok(batch) => self.complete_cycle(batch).await,
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, stage = %e.stage(), "Relay cycle failed; continuing");
            }
        };

        let summary = RelaySummary {
            cycles_completed: self.cycles_completed,
            messages_relayed: self.messages_relayed,
            stop_reason,
        };
        info!(
            cycles = summary.cycles_completed,
            relayed = summary.messages_relayed,
            reason = %summary.stop_reason,
            "Relay stopped"
        );
        Ok(summary)
    }

    async fn receive(&mut self) -> Result<Batch, RelayError> {
        receive_batch(
            &mut self.resolver,
            &self.source,
            self.config.max_batch_size,
            &self.receive_options,
        )
        .await
    }

    async fn complete_cycle(&mut self, batch: Batch) -> Result<CycleReport, RelayError> {
        let policy = self.config.partial_failure_policy;
        let forwarded = forward_batch(&mut self.resolver, &self.destination, &batch, policy).await?;
        let acknowledged =
            acknowledge_batch(&mut self.resolver, &self.source, &batch, policy).await?;

        self.cycles_completed += 1;
        let report = CycleReport {
            cycle: self.cycles_completed,
            received: batch.len(),
            forwarded: forwarded.successful.len(),
            acknowledged: acknowledged.successful.len(),
        };
        self.messages_relayed += report.acknowledged as u64;

        if report.is_empty() {
            debug!(cycle = report.cycle, "Relay cycle found no messages");
        } else {
            info!(
                cycle = report.cycle,
                received = report.received,
                forwarded = report.forwarded,
                acknowledged = report.acknowledged,
                "Relay cycle completed"
            );
        }
        Ok(report)
    }
}
