//! Scriptable backend shared by the unit tests of this crate.

use async_trait::async_trait;
use bytes::Bytes;
use queue_relay_runtime::{
    BatchEntryFailure, BatchOutcome, DeleteEntry, MessageId, ProviderType, QueueBackend,
    QueueEndpoint, QueueError, QueueName, ReceiptHandle, ReceiveOptions, ReceivedMessage,
    SendEntry, Timestamp,
};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// One call observed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    Receive { endpoint: String, max_messages: u32 },
    Send { endpoint: String, entries: Vec<SendEntry> },
    Delete { endpoint: String, entries: Vec<DeleteEntry> },
}

#[derive(Default)]
struct State {
    endpoints: HashMap<String, String>,
    receives: VecDeque<Result<Vec<ReceivedMessage>, QueueError>>,
    sends: VecDeque<Result<BatchOutcome, QueueError>>,
    deletes: VecDeque<Result<BatchOutcome, QueueError>>,
    block_when_drained: bool,
    calls: Vec<Call>,
}

/// Backend that records every call and replays scripted results
///
/// Queues resolve to `https://queue.example/123/<name>` unless overridden.
/// Receives return the scripted batches in order, then empty batches.
/// Sends and deletes succeed for every entry unless a result was scripted.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<State>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(self, queue: &str, endpoint: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .endpoints
            .insert(queue.to_string(), endpoint.to_string());
        self
    }

    pub fn push_batch(&self, batch: Vec<ReceivedMessage>) {
        self.state.lock().unwrap().receives.push_back(Ok(batch));
    }

    pub fn push_receive_error(&self, error: QueueError) {
        self.state.lock().unwrap().receives.push_back(Err(error));
    }

    pub fn push_send_result(&self, result: Result<BatchOutcome, QueueError>) {
        self.state.lock().unwrap().sends.push_back(result);
    }

    pub fn push_delete_result(&self, result: Result<BatchOutcome, QueueError>) {
        self.state.lock().unwrap().deletes.push_back(result);
    }

    /// Make receives hang once the scripted batches are used up
    pub fn block_when_drained(&self) {
        self.state.lock().unwrap().block_when_drained = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn resolve_count(&self, queue: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Resolve(q) if q == queue))
            .count()
    }

    pub fn receive_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Receive { .. }))
            .count()
    }

    pub fn sent_entries(&self) -> Vec<SendEntry> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { entries, .. } => Some(entries),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn deleted_entries(&self) -> Vec<DeleteEntry> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { entries, .. } => Some(entries),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl QueueBackend for RecordingBackend {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<QueueEndpoint, QueueError> {
        self.record(Call::Resolve(queue.to_string()));
        let endpoint = self
            .state
            .lock()
            .unwrap()
            .endpoints
            .get(queue.as_str())
            .cloned()
            .unwrap_or_else(|| format!("https://queue.example/123/{}", queue));
        Ok(QueueEndpoint::new(endpoint).unwrap())
    }

    async fn receive_messages(
        &self,
        endpoint: &QueueEndpoint,
        max_messages: u32,
        _options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.record(Call::Receive {
            endpoint: endpoint.to_string(),
            max_messages,
        });
        let (next, block) = {
            let mut state = self.state.lock().unwrap();
            (state.receives.pop_front(), state.block_when_drained)
        };
        match next {
            Some(result) => result,
            None if block => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }

    async fn send_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[SendEntry],
    ) -> Result<BatchOutcome, QueueError> {
        self.record(Call::Send {
            endpoint: endpoint.to_string(),
            entries: entries.to_vec(),
        });
        let scripted = self.state.lock().unwrap().sends.pop_front();
        scripted
            .unwrap_or_else(|| Ok(BatchOutcome::all_succeeded(entries.iter().map(|e| e.id.clone()))))
    }

    async fn delete_batch(
        &self,
        endpoint: &QueueEndpoint,
        entries: &[DeleteEntry],
    ) -> Result<BatchOutcome, QueueError> {
        self.record(Call::Delete {
            endpoint: endpoint.to_string(),
            entries: entries.to_vec(),
        });
        let scripted = self.state.lock().unwrap().deletes.pop_front();
        scripted
            .unwrap_or_else(|| Ok(BatchOutcome::all_succeeded(entries.iter().map(|e| e.id.clone()))))
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }

    fn max_batch_size(&self) -> u32 {
        10
    }
}

/// Message as a source queue would deliver it, with receipt `rh-<id>`
pub fn message(id: &str, body: &[u8]) -> ReceivedMessage {
    ReceivedMessage {
        message_id: MessageId::from_str(id).unwrap(),
        body: Bytes::copy_from_slice(body),
        receipt_handle: ReceiptHandle::new(format!("rh-{}", id), ProviderType::InMemory),
        delivery_count: 1,
        received_at: Timestamp::now(),
    }
}

/// Entry-level failure for one id
pub fn entry_failure(id: &str, code: &str) -> BatchEntryFailure {
    BatchEntryFailure {
        id: MessageId::from_str(id).unwrap(),
        code: code.to_string(),
        message: "rejected".to_string(),
        sender_fault: false,
    }
}

pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}
