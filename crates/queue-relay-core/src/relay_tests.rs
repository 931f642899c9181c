//! Tests for the relay steps and the relay driver.

use super::*;
use crate::test_support::{entry_failure, message, queue, Call, RecordingBackend};
use queue_relay_runtime::{MessageId, QueueError};
use std::str::FromStr;
use std::time::Duration as StdDuration;

fn driver(backend: &RecordingBackend, config: RelayConfig) -> RelayDriver<RecordingBackend> {
    RelayDriver::new(backend.clone(), config).unwrap()
}

fn ids(entries: impl IntoIterator<Item = MessageId>) -> Vec<String> {
    entries.into_iter().map(|id| id.to_string()).collect()
}

// ============================================================================
// Relay Steps
// ============================================================================

mod steps {
    use super::*;

    /// Verify receive makes a single call for the configured batch size
    #[tokio::test]
    async fn test_receive_batch_single_call() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one")]);
        let mut resolver = QueueEndpointResolver::new(backend.clone());

        let batch = receive_batch(
            &mut resolver,
            &queue("fromQueueName"),
            10,
            &ReceiveOptions::new(),
        )
        .await
        .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(
            backend.calls(),
            vec![
                Call::Resolve("fromQueueName".to_string()),
                Call::Receive {
                    endpoint: "https://queue.example/123/fromQueueName".to_string(),
                    max_messages: 10,
                },
            ]
        );
    }

    /// Verify receive failures are reported as receive errors
    #[tokio::test]
    async fn test_receive_batch_failure() {
        let backend = RecordingBackend::new();
        backend.push_receive_error(QueueError::ConnectionFailed {
            message: "reset".to_string(),
        });
        let mut resolver = QueueEndpointResolver::new(backend.clone());

        let error = receive_batch(
            &mut resolver,
            &queue("fromQueueName"),
            10,
            &ReceiveOptions::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(error.stage(), RelayStage::Receive);
        assert!(matches!(error.step_error(), StepError::Backend(_)));
    }

    /// Verify forward keys entries by source id and keeps bodies byte-for-byte
    #[tokio::test]
    async fn test_forward_batch_preserves_ids_and_bodies() {
        let backend = RecordingBackend::new();
        let mut resolver = QueueEndpointResolver::new(backend.clone());
        let batch = vec![
            message("m-1", b"{\"n\": 1}"),
            message("m-2", &[0x00, 0xff, 0x10]),
            message("m-3", b""),
        ];

        let outcome = forward_batch(
            &mut resolver,
            &queue("toQueueName"),
            &batch,
            PartialFailurePolicy::Fail,
        )
        .await
        .unwrap();

        let sent = backend.sent_entries();
        assert_eq!(ids(sent.iter().map(|e| e.id.clone())), vec!["m-1", "m-2", "m-3"]);
        for (entry, original) in sent.iter().zip(&batch) {
            assert_eq!(entry.body, original.body);
        }
        assert_eq!(outcome.successful.len(), 3);
    }

    /// Verify forward and acknowledge skip the backend for an empty batch
    #[tokio::test]
    async fn test_empty_batch_makes_no_calls() {
        let backend = RecordingBackend::new();
        let mut resolver = QueueEndpointResolver::new(backend.clone());

        let forwarded = forward_batch(
            &mut resolver,
            &queue("toQueueName"),
            &[],
            PartialFailurePolicy::Fail,
        )
        .await
        .unwrap();
        let acknowledged = acknowledge_batch(
            &mut resolver,
            &queue("fromQueueName"),
            &[],
            PartialFailurePolicy::Fail,
        )
        .await
        .unwrap();

        assert!(forwarded.is_empty());
        assert!(acknowledged.is_empty());
        assert!(backend.calls().is_empty());
    }

    /// Verify acknowledge uses the receipt handles captured at receive time
    #[tokio::test]
    async fn test_acknowledge_uses_receipts() {
        let backend = RecordingBackend::new();
        let mut resolver = QueueEndpointResolver::new(backend.clone());
        let batch = vec![message("m-1", b"a"), message("m-2", b"b")];

        acknowledge_batch(
            &mut resolver,
            &queue("fromQueueName"),
            &batch,
            PartialFailurePolicy::Fail,
        )
        .await
        .unwrap();

        let receipts: Vec<String> = backend
            .deleted_entries()
            .iter()
            .map(|e| e.receipt_handle.handle().to_string())
            .collect();
        assert_eq!(receipts, vec!["rh-m-1", "rh-m-2"]);
    }

    /// Verify destination resolution failures are forward errors
    #[tokio::test]
    async fn test_forward_resolution_failure() {
        let backend = queue_relay_runtime::InMemoryBackend::default();
        let mut resolver = QueueEndpointResolver::new(backend);

        let error = forward_batch(
            &mut resolver,
            &queue("toQueueName"),
            &[message("m-1", b"a")],
            PartialFailurePolicy::Fail,
        )
        .await
        .unwrap_err();

        assert_eq!(error.stage(), RelayStage::Forward);
        assert_eq!(error.queue_name(), "toQueueName");
        assert!(matches!(error.step_error(), StepError::Resolution(_)));
    }

    /// Verify rejected entries fail the step under the Fail policy
    #[tokio::test]
    async fn test_partial_forward_fails_under_fail_policy() {
        let backend = RecordingBackend::new();
        backend.push_send_result(Ok(BatchOutcome {
            successful: vec![MessageId::from_str("m-1").unwrap()],
            failed: vec![entry_failure("m-2", "InternalError")],
        }));
        let mut resolver = QueueEndpointResolver::new(backend.clone());

        let error = forward_batch(
            &mut resolver,
            &queue("toQueueName"),
            &[message("m-1", b"a"), message("m-2", b"b")],
            PartialFailurePolicy::Fail,
        )
        .await
        .unwrap_err();

        match error.step_error() {
            StepError::PartialBatch { failed, total } => {
                assert_eq!(*total, 2);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].id.as_str(), "m-2");
            }
            other => panic!("expected partial batch error, got {:?}", other),
        }
    }

    /// Verify rejected entries are tolerated under the Ignore policy
    #[tokio::test]
    async fn test_partial_acknowledge_tolerated_under_ignore_policy() {
        let backend = RecordingBackend::new();
        backend.push_delete_result(Ok(BatchOutcome {
            successful: vec![MessageId::from_str("m-1").unwrap()],
            failed: vec![entry_failure("m-2", "ReceiptHandleIsInvalid")],
        }));
        let mut resolver = QueueEndpointResolver::new(backend.clone());

        let outcome = acknowledge_batch(
            &mut resolver,
            &queue("fromQueueName"),
            &[message("m-1", b"a"), message("m-2", b"b")],
            PartialFailurePolicy::Ignore,
        )
        .await
        .unwrap();

        assert_eq!(outcome.successful.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
    }
}

// ============================================================================
// Relay Driver
// ============================================================================

mod driver {
    use super::*;

    /// Verify one cycle receives, forwards and acknowledges in that order
    #[tokio::test]
    async fn test_cycle_order_and_correlation() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![
            message("m-1", b"one"),
            message("m-2", b"two"),
            message("m-3", b"three"),
        ]);
        let mut relay = driver(&backend, RelayConfig::default());

        let report = relay.run_cycle().await.unwrap();

        assert_eq!(
            report,
            CycleReport {
                cycle: 1,
                received: 3,
                forwarded: 3,
                acknowledged: 3,
            }
        );

        let kinds: Vec<&str> = backend
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::Receive { .. } => Some("receive"),
                Call::Send { .. } => Some("send"),
                Call::Delete { .. } => Some("delete"),
                Call::Resolve(_) => None,
            })
            .collect();
        assert_eq!(kinds, vec!["receive", "send", "delete"]);

        let sent = ids(backend.sent_entries().into_iter().map(|e| e.id));
        let deleted = ids(backend.deleted_entries().into_iter().map(|e| e.id));
        assert_eq!(sent, vec!["m-1", "m-2", "m-3"]);
        assert_eq!(sent, deleted);
    }

    /// Verify each queue is resolved once across many cycles
    #[tokio::test]
    async fn test_endpoints_resolved_once() {
        let backend = RecordingBackend::new();
        for i in 0..3 {
            backend.push_batch(vec![message(&format!("m-{}", i), b"x")]);
        }
        let mut relay = driver(&backend, RelayConfig::default());

        for _ in 0..3 {
            relay.run_cycle().await.unwrap();
        }

        assert_eq!(backend.resolve_count("fromQueueName"), 1);
        assert_eq!(backend.resolve_count("toQueueName"), 1);
        assert_eq!(relay.endpoint_cache().len(), 2);
        assert_eq!(relay.messages_relayed(), 3);
    }

    /// Verify the sends target the destination and deletes the source
    #[tokio::test]
    async fn test_calls_target_correct_endpoints() {
        let backend = RecordingBackend::new()
            .with_endpoint("fromQueueName", "https://queue.example/123/fromQueueName")
            .with_endpoint("toQueueName", "https://queue.example/456/toQueueName");
        backend.push_batch(vec![message("m-1", b"one")]);
        let mut relay = driver(&backend, RelayConfig::default());

        relay.run_cycle().await.unwrap();

        for call in backend.calls() {
            match call {
                Call::Send { endpoint, .. } => {
                    assert_eq!(endpoint, "https://queue.example/456/toQueueName")
                }
                Call::Delete { endpoint, .. } | Call::Receive { endpoint, .. } => {
                    assert_eq!(endpoint, "https://queue.example/123/fromQueueName")
                }
                Call::Resolve(_) => {}
            }
        }
    }

    /// Verify an empty receive completes the cycle without send or delete
    #[tokio::test]
    async fn test_empty_cycle() {
        let backend = RecordingBackend::new();
        let mut relay = driver(&backend, RelayConfig::default());

        let report = relay.run_cycle().await.unwrap();

        assert!(report.is_empty());
        assert_eq!(report.cycle, 1);
        assert!(backend.sent_entries().is_empty());
        assert!(backend.deleted_entries().is_empty());
        assert_eq!(backend.resolve_count("toQueueName"), 0);
    }

    /// Verify a failed forward never acknowledges the batch
    #[tokio::test]
    async fn test_failed_forward_skips_acknowledge() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one")]);
        backend.push_send_result(Err(QueueError::PermissionDenied {
            operation: "SendMessageBatch".to_string(),
        }));
        let mut relay = driver(&backend, RelayConfig::default());

        let error = relay.run_cycle().await.unwrap_err();

        assert_eq!(error.stage(), RelayStage::Forward);
        assert!(backend.deleted_entries().is_empty());
        assert_eq!(relay.cycles_completed(), 0);
    }

    /// Verify a partial forward under the Fail policy leaves the batch unacknowledged
    #[tokio::test]
    async fn test_partial_forward_skips_acknowledge() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one"), message("m-2", b"two")]);
        backend.push_send_result(Ok(BatchOutcome {
            successful: vec![MessageId::from_str("m-1").unwrap()],
            failed: vec![entry_failure("m-2", "InternalError")],
        }));
        let mut relay = driver(&backend, RelayConfig::default());

        let error = relay.run_cycle().await.unwrap_err();

        assert!(matches!(
            error.step_error(),
            StepError::PartialBatch { total: 2, .. }
        ));
        assert!(backend.deleted_entries().is_empty());
    }

    /// Verify the Ignore policy completes a cycle with rejected entries
    #[tokio::test]
    async fn test_partial_forward_ignored() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one"), message("m-2", b"two")]);
        backend.push_send_result(Ok(BatchOutcome {
            successful: vec![MessageId::from_str("m-1").unwrap()],
            failed: vec![entry_failure("m-2", "InternalError")],
        }));
        let config =
            RelayConfig::default().with_partial_failure_policy(PartialFailurePolicy::Ignore);
        let mut relay = driver(&backend, config);

        let report = relay.run_cycle().await.unwrap();

        assert_eq!(report.received, 2);
        assert_eq!(report.forwarded, 1);
        assert_eq!(report.acknowledged, 2);
        let deleted: Vec<_> = backend
            .deleted_entries()
            .into_iter()
            .map(|entry| entry.id.to_string())
            .collect();
        assert_eq!(deleted, vec!["m-1", "m-2"]);
    }

    /// Verify a receive failure on the third cycle stops the loop there
    #[tokio::test]
    async fn test_receive_failure_is_fatal() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one")]);
        backend.push_batch(vec![message("m-2", b"two")]);
        backend.push_receive_error(QueueError::AuthenticationFailed {
            message: "expired token".to_string(),
        });
        backend.push_batch(vec![message("m-3", b"three")]);
        let mut relay = driver(&backend, RelayConfig::default());

        let error = relay.run(CancellationToken::new()).await.unwrap_err();

        assert_eq!(error.stage(), RelayStage::Receive);
        assert_eq!(relay.cycles_completed(), 2);
        assert_eq!(backend.receive_count(), 3);
        assert_eq!(
            ids(backend.deleted_entries().into_iter().map(|e| e.id)),
            vec!["m-1", "m-2"]
        );
    }

    /// Verify an acknowledge failure stops the loop after the forward
    #[tokio::test]
    async fn test_acknowledge_failure_is_fatal() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one")]);
        backend.push_delete_result(Err(QueueError::MessageNotFound {
            receipt: "rh-m-1".to_string(),
        }));
        let mut relay = driver(&backend, RelayConfig::default());

        let error = relay.run(CancellationToken::new()).await.unwrap_err();

        assert_eq!(error.stage(), RelayStage::Acknowledge);
        assert_eq!(backend.sent_entries().len(), 1);
        assert_eq!(backend.receive_count(), 1);
    }

    /// Verify the cycle limit ends the run successfully
    #[tokio::test]
    async fn test_cycle_limit() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one"), message("m-2", b"two")]);
        let mut relay = driver(&backend, RelayConfig::default().with_max_cycles(3));

        let summary = relay.run(CancellationToken::new()).await.unwrap();

        assert_eq!(
            summary,
            RelaySummary {
                cycles_completed: 3,
                messages_relayed: 2,
                stop_reason: StopReason::CycleLimitReached,
            }
        );
        assert_eq!(backend.receive_count(), 3);
    }

    /// Verify a cancelled token stops the driver before the next cycle
    #[tokio::test]
    async fn test_cancelled_before_start() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one")]);
        let mut relay = driver(&backend, RelayConfig::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = relay.run(shutdown).await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.cycles_completed, 0);
        assert_eq!(backend.receive_count(), 0);
    }

    /// Verify cancellation interrupts a receive that is still waiting
    #[tokio::test]
    async fn test_cancel_while_waiting_on_receive() {
        let backend = RecordingBackend::new();
        backend.push_batch(vec![message("m-1", b"one")]);
        backend.block_when_drained();
        let mut relay = driver(&backend, RelayConfig::default());
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(StdDuration::from_secs(5), relay.run(shutdown))
            .await
            .expect("driver should stop after cancellation")
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.cycles_completed, 1);
        assert_eq!(summary.messages_relayed, 1);
        assert_eq!(backend.receive_count(), 2);
    }

    /// Verify invalid configuration is rejected at construction
    #[test]
    fn test_driver_rejects_invalid_config() {
        let backend = RecordingBackend::new();
        let result = RelayDriver::new(backend, RelayConfig::new("same", "same"));
        assert!(matches!(result, Err(ConfigError::SameQueue { .. })));
    }
}
