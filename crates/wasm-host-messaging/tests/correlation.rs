//! Integration tests for request correlation and timeouts.
//!
//! These tests exercise the tracker, the timeout handler, and the messaging
//! service together:
//! - Unanswered requests time out and leave nothing behind
//! - Early responses cancel their timers
//! - Response and timeout racing on one id resolve it exactly once

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use wasm_host_common::{ComponentId, MessagingConfig, RequestError, TrackerError};
use wasm_host_messaging::{
    ComponentMessage, CorrelationId, CorrelationTracker, MessageRouter, MessagingService,
    PendingRequest, ResponseMessage, TimeoutHandler, TimeoutTarget,
};

fn register_with_timer(
    tracker: &Arc<CorrelationTracker>,
    handler: &TimeoutHandler,
    timeout: Duration,
) -> (
    CorrelationId,
    tokio::sync::oneshot::Receiver<ResponseMessage>,
) {
    let id = CorrelationId::new();
    let (request, rx) = PendingRequest::new(id, "caller".into(), "callee".into(), timeout);
    tracker.register_pending(request).unwrap();

    let target: Arc<dyn TimeoutTarget> = tracker.clone();
    let timer = handler.register_timeout(id, timeout, target);
    tracker.attach_timer(&id, timer).unwrap();

    (id, rx)
}

// ============================================================================
// Test: Unanswered request times out
// ============================================================================

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let tracker = Arc::new(CorrelationTracker::new());
    let handler = TimeoutHandler::new();

    let (_id, rx) = register_with_timer(&tracker, &handler, Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(60)).await;

    let response = tokio_test::assert_ok!(rx.await);
    assert_eq!(response.result, Err(RequestError::Timeout));
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.timeout_count(), 1);
    assert_eq!(handler.active_count(), 0);
}

#[tokio::test]
async fn test_timeout_fires_near_deadline() {
    let tracker = Arc::new(CorrelationTracker::new());
    let handler = TimeoutHandler::new();

    let start = tokio::time::Instant::now();
    let (_id, rx) = register_with_timer(&tracker, &handler, Duration::from_millis(50));

    let response = rx.await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(response.result, Err(RequestError::Timeout));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(250), "fired late: {elapsed:?}");
}

// ============================================================================
// Test: Early response
// ============================================================================

#[tokio::test]
async fn test_early_response_beats_long_timeout() {
    let tracker = Arc::new(CorrelationTracker::new());
    let handler = TimeoutHandler::new();

    let (id, rx) = register_with_timer(&tracker, &handler, Duration::from_secs(5));

    let responder = Arc::clone(&tracker);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        responder
            .resolve(
                &id,
                ResponseMessage::success(id, "callee".into(), "caller".into(), b"P".to_vec()),
            )
            .unwrap();
    });

    let response = rx.await.unwrap();

    assert_eq!(response.result, Ok(b"P".to_vec()));
    assert_eq!(tracker.timeout_count(), 0);
    assert_eq!(tracker.completed_count(), 1);
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(handler.active_count(), 0);
}

// ============================================================================
// Test: Exactly-once resolution under contention
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_response_and_timeout_race_resolve_once() {
    let tracker = Arc::new(CorrelationTracker::new());
    let mut receivers = Vec::new();
    let mut racers = Vec::new();

    for _ in 0..200 {
        let id = CorrelationId::new();
        let (request, rx) =
            PendingRequest::new(id, "caller".into(), "callee".into(), Duration::from_secs(1));
        tracker.register_pending(request).unwrap();
        receivers.push(rx);

        let by_response = Arc::clone(&tracker);
        racers.push(tokio::spawn(async move {
            by_response
                .resolve(
                    &id,
                    ResponseMessage::success(id, "callee".into(), "caller".into(), vec![1]),
                )
                .is_ok()
        }));

        let by_timeout = Arc::clone(&tracker);
        racers.push(tokio::spawn(async move {
            by_timeout.try_resolve_with_timeout(&id).is_ok()
        }));
    }

    let mut winners = 0;
    for racer in racers {
        if racer.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 200);
    assert_eq!(tracker.completed_count() + tracker.timeout_count(), 200);
    assert_eq!(tracker.pending_count(), 0);

    for rx in receivers {
        let response = rx.await.unwrap();
        assert!(matches!(
            response.result,
            Ok(_) | Err(RequestError::Timeout)
        ));
    }
}

#[tokio::test]
async fn test_loser_sees_not_found_and_waiter_unchanged() {
    let tracker = Arc::new(CorrelationTracker::new());
    let id = CorrelationId::new();
    let (request, rx) =
        PendingRequest::new(id, "caller".into(), "callee".into(), Duration::from_secs(1));
    tracker.register_pending(request).unwrap();

    tracker
        .resolve(
            &id,
            ResponseMessage::success(id, "callee".into(), "caller".into(), vec![9]),
        )
        .unwrap();

    assert_eq!(
        tracker.try_resolve_with_timeout(&id),
        Err(TrackerError::NotFound(id.to_string()))
    );
    assert_eq!(rx.await.unwrap().result, Ok(vec![9]));
    assert_eq!(tracker.timeout_count(), 0);
}

// ============================================================================
// Test: Service-level request timeout
// ============================================================================

#[tokio::test]
async fn test_service_request_times_out_when_target_silent() {
    let tracker = Arc::new(CorrelationTracker::new());
    let service = MessagingService::new(
        MessageRouter::new(),
        Arc::clone(&tracker),
        Arc::new(TimeoutHandler::new()),
        MessagingConfig::default(),
    );

    // Target accepts messages but never answers
    let (tx, mut rx) = mpsc::channel::<ComponentMessage>(8);
    service.register_route(ComponentId::new("silent"), tx);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let result = service
        .request(
            "caller".into(),
            "silent".into(),
            vec![],
            Some(Duration::from_millis(50)),
        )
        .await;

    assert_eq!(result, Err(RequestError::Timeout));
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(service.stats().pending_requests, 0);
}
