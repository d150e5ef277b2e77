//! Integration tests for wasm-host-system.
//!
//! These tests exercise the manager end to end:
//! - Spawn, status, stop, and restart round trips
//! - Request cancellation when a participant stops
//! - Best-effort shutdown with failing and slow components
//! - Invocation limits surfaced as host errors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use wasm_host_common::{
    CapabilitySet, ComponentId, ComponentMetadata, ComponentStatus, EngineConfig, HostConfig,
    HostError, RequestError, RuntimeError, SpawnErrorKind,
};
use wasm_host_core::{
    ComponentHandle, ComponentOutput, FuelGauge, Invocation, InvokeError, RuntimeEngine, Value,
    WasmtimeRuntime,
};
use wasm_host_system::{HostSystemManager, WasmSource};

const ONE_MIB: u64 = 1024 * 1024;

const WORKER_WAT: &str = r#"
    (module
        (func (export "init"))
        (func (export "double") (param i32) (result i32)
            (i32.mul (local.get 0) (i32.const 2)))
        (func (export "handle-request") (param i32) (result i32)
            local.get 0)
        (func (export "spin")
            (loop $forever (br $forever)))
        (func (export "cleanup"))
    )
"#;

const FRAGILE_WAT: &str = r#"
    (module
        (func (export "cleanup") unreachable)
    )
"#;

fn metadata() -> ComponentMetadata {
    ComponentMetadata::new(ONE_MIB).with_timeout_ms(1000)
}

fn worker() -> WasmSource {
    WasmSource::Wat(WORKER_WAT.into())
}

async fn spawn(manager: &HostSystemManager, id: &str, source: WasmSource) {
    manager
        .spawn_component(id.into(), source, metadata(), CapabilitySet::new())
        .await
        .unwrap();
}

// ============================================================================
// Test: Shutdown idempotency
// ============================================================================

#[tokio::test]
async fn test_shutdown_twice() {
    let manager = HostSystemManager::new().unwrap();
    spawn(&manager, "c1", worker()).await;

    tokio_test::assert_ok!(manager.shutdown().await);
    tokio_test::assert_ok!(manager.shutdown().await);

    assert!(!manager.started());
    assert!(!manager.is_component_registered(&"c1".into()));
}

// ============================================================================
// Test: Status round trip
// ============================================================================

#[tokio::test]
async fn test_spawn_stop_restart_round_trip() {
    let manager = HostSystemManager::new().unwrap();
    let id = ComponentId::new("c1");

    spawn(&manager, "c1", worker()).await;
    assert_eq!(
        manager.get_component_status(&id).unwrap(),
        ComponentStatus::Running
    );

    manager.stop_component(&id).await.unwrap();
    assert!(manager.get_component_status(&id).unwrap_err().is_not_found());

    manager
        .restart_component(&id, worker(), metadata(), CapabilitySet::new())
        .await
        .unwrap();
    assert_eq!(
        manager.get_component_status(&id).unwrap(),
        ComponentStatus::Running
    );

    // Restarting a running component replaces it.
    manager
        .restart_component(&id, worker(), metadata(), CapabilitySet::new())
        .await
        .unwrap();
    assert_eq!(manager.list_components().unwrap(), vec![id]);
}

#[tokio::test]
async fn test_second_stop_is_not_found() {
    let manager = HostSystemManager::new().unwrap();
    spawn(&manager, "c1", worker()).await;

    manager.stop_component(&"c1".into()).await.unwrap();
    let err = manager.stop_component(&"c1".into()).await.unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_stop_ghost_leaves_others() {
    let manager = HostSystemManager::new().unwrap();
    spawn(&manager, "a", worker()).await;
    spawn(&manager, "b", worker()).await;

    let err = manager.stop_component(&"ghost".into()).await.unwrap_err();

    assert!(matches!(err, HostError::ComponentNotFound { ref component_id } if component_id == "ghost"));
    assert_eq!(
        manager.list_components().unwrap(),
        vec![ComponentId::new("a"), ComponentId::new("b")]
    );

    let (output, _) = manager
        .execute(&"a".into(), "double", vec![Value::I32(21)])
        .await
        .unwrap();
    assert_eq!(output.as_i32(), Some(42));
}

// ============================================================================
// Test: Correlation cleanup on stop
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_cancels_pending_requests() {
    let manager = Arc::new(HostSystemManager::new().unwrap());
    manager
        .spawn_component(
            "busy".into(),
            worker(),
            ComponentMetadata::new(ONE_MIB)
                .with_max_fuel(10_000_000_000)
                .with_timeout_ms(300),
            CapabilitySet::new(),
        )
        .await
        .unwrap();

    // Occupy the actor so the request below stays queued.
    let spin = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.execute(&"busy".into(), "spin", vec![]).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (_, response_rx) = manager
        .messaging()
        .send_request(
            "client".into(),
            "busy".into(),
            b"ping".to_vec(),
            Some(Duration::from_secs(30)),
        )
        .await
        .unwrap();
    assert_eq!(
        manager
            .messaging()
            .tracker()
            .pending_for_component(&"busy".into())
            .len(),
        1
    );

    manager.stop_component(&"busy".into()).await.unwrap();

    let response = response_rx.await.unwrap();
    assert_eq!(response.result, Err(RequestError::Cancelled));
    assert!(matches!(
        spin.await.unwrap(),
        Err(HostError::ExecutionTimeout { .. })
    ));

    let tracker = manager.messaging().tracker();
    assert!(tracker.pending_for_component(&"busy".into()).is_empty());
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.cancelled_count(), 1);
    assert!(!tracker.is_component_known(&"busy".into()));
    assert!(!manager.messaging().has_route(&"busy".into()));
    assert!(
        manager
            .get_component_status(&"busy".into())
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_under_concurrent_requests_leaves_nothing_pending() {
    for _ in 0..20 {
        let manager = Arc::new(HostSystemManager::new().unwrap());
        spawn(&manager, "target", worker()).await;

        let done = Arc::new(AtomicBool::new(false));
        let senders: Vec<_> = (0..8)
            .map(|i| {
                let messaging = Arc::clone(manager.messaging());
                let done = Arc::clone(&done);
                tokio::spawn(async move {
                    while !done.load(Ordering::Relaxed) {
                        let _ = messaging
                            .send_request(
                                format!("client-{i}").into(),
                                "target".into(),
                                vec![],
                                Some(Duration::from_secs(60)),
                            )
                            .await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(5)).await;

        manager.stop_component(&"target".into()).await.unwrap();
        done.store(true, Ordering::Relaxed);
        for sender in senders {
            sender.await.unwrap();
        }

        let tracker = manager.messaging().tracker();
        assert!(tracker.pending_for_component(&"target".into()).is_empty());
        assert_eq!(tracker.pending_count(), 0);
        assert!(!manager.messaging().has_route(&"target".into()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_right_after_spawn_forgets_component() {
    for i in 0..20 {
        let manager = HostSystemManager::new().unwrap();
        let id = ComponentId::new(format!("quick-{i}"));
        manager
            .spawn_component(id.clone(), worker(), metadata(), CapabilitySet::new())
            .await
            .unwrap();

        manager.stop_component(&id).await.unwrap();
        // Let the post-spawn registration run if it has not yet.
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!manager.messaging().tracker().is_component_known(&id));
        assert!(!manager.messaging().has_route(&id));
        assert!(!manager.is_component_registered(&id));
    }
}

// ============================================================================
// Test: Best-effort shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_survives_failing_stop() {
    let manager = HostSystemManager::new().unwrap();
    let mut addresses = Vec::new();
    for id in ["alpha", "fragile", "omega"] {
        let source = if id == "fragile" {
            WasmSource::Wat(FRAGILE_WAT.into())
        } else {
            worker()
        };
        addresses.push(
            manager
                .spawn_component(id.into(), source, metadata(), CapabilitySet::new())
                .await
                .unwrap(),
        );
    }

    tokio_test::assert_ok!(manager.shutdown().await);

    assert!(!manager.started());
    for address in &addresses {
        assert!(address.is_stopped(), "{} still running", address.name());
    }
    assert!(manager.list_components().unwrap_err().is_not_started());
}

#[tokio::test]
async fn test_stop_failure_still_removes_component() {
    let manager = HostSystemManager::new().unwrap();
    spawn(&manager, "fragile", WasmSource::Wat(FRAGILE_WAT.into())).await;

    let err = manager.stop_component(&"fragile".into()).await.unwrap_err();

    assert!(matches!(err, HostError::Internal { .. }));
    assert!(!manager.is_component_registered(&"fragile".into()));
}

// ============================================================================
// Test: Stop bound
// ============================================================================

/// Wasmtime engine whose `cleanup` export hangs.
struct HangingCleanup {
    runtime: WasmtimeRuntime,
}

#[async_trait]
impl RuntimeEngine for HangingCleanup {
    async fn load_component(
        &self,
        component_id: &ComponentId,
        bytes: &[u8],
    ) -> Result<ComponentHandle, RuntimeError> {
        self.runtime.load_component(component_id, bytes).await
    }

    async fn invoke(
        &self,
        invocation: Invocation<'_>,
        gauge: Arc<FuelGauge>,
    ) -> Result<ComponentOutput, InvokeError> {
        if invocation.function == "cleanup" {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.runtime.invoke(invocation, gauge).await
    }
}

#[tokio::test]
async fn test_stop_exceeding_bound_times_out() {
    let mut config = HostConfig::default();
    config.lifecycle.stop_timeout_ms = 100;
    let engine = HangingCleanup {
        runtime: WasmtimeRuntime::new(&EngineConfig::default()).unwrap(),
    };
    let manager = HostSystemManager::with_engine(&config, Arc::new(engine));

    manager
        .spawn_component(
            "stuck".into(),
            worker(),
            ComponentMetadata::new(ONE_MIB).with_timeout_ms(60_000),
            CapabilitySet::new(),
        )
        .await
        .unwrap();

    let start = tokio::time::Instant::now();
    let err = manager.stop_component(&"stuck".into()).await.unwrap_err();

    assert!(matches!(
        err,
        HostError::Timeout {
            operation: "stop",
            timeout_ms: 100,
            ..
        }
    ));
    assert!(err.is_resource_limit());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!manager.is_component_registered(&"stuck".into()));

    // Shutdown is unaffected by the abandoned actor.
    tokio_test::assert_ok!(manager.shutdown().await);
}

// ============================================================================
// Test: Actor startup
// ============================================================================

/// Wasmtime engine that panics when `init` is invoked.
struct PanickingInit {
    runtime: WasmtimeRuntime,
}

#[async_trait]
impl RuntimeEngine for PanickingInit {
    async fn load_component(
        &self,
        component_id: &ComponentId,
        bytes: &[u8],
    ) -> Result<ComponentHandle, RuntimeError> {
        self.runtime.load_component(component_id, bytes).await
    }

    async fn invoke(
        &self,
        invocation: Invocation<'_>,
        gauge: Arc<FuelGauge>,
    ) -> Result<ComponentOutput, InvokeError> {
        if invocation.function == "init" {
            panic!("init blew up");
        }
        self.runtime.invoke(invocation, gauge).await
    }
}

#[tokio::test]
async fn test_panicking_init_is_not_registered() {
    let engine = PanickingInit {
        runtime: WasmtimeRuntime::new(&EngineConfig::default()).unwrap(),
    };
    let manager = HostSystemManager::with_engine(&HostConfig::default(), Arc::new(engine));

    let err = manager
        .spawn_component("doomed".into(), worker(), metadata(), CapabilitySet::new())
        .await
        .unwrap_err();

    match err {
        HostError::ComponentSpawnFailed(spawn) => {
            assert!(matches!(spawn.kind, SpawnErrorKind::ActorFailed(_)));
        }
        other => panic!("expected ComponentSpawnFailed, got {other:?}"),
    }
    assert!(
        manager
            .get_component_status(&"doomed".into())
            .unwrap_err()
            .is_not_found()
    );
    assert!(!manager.messaging().has_route(&"doomed".into()));
}

// ============================================================================
// Test: Execution limits
// ============================================================================

#[tokio::test]
async fn test_execute_out_of_fuel() {
    let manager = HostSystemManager::new().unwrap();
    manager
        .spawn_component(
            "c1".into(),
            worker(),
            metadata().with_max_fuel(50_000),
            CapabilitySet::new(),
        )
        .await
        .unwrap();

    let err = manager
        .execute(&"c1".into(), "spin", vec![])
        .await
        .unwrap_err();

    match err {
        HostError::OutOfFuel {
            component_id,
            max_fuel,
            consumed,
            ..
        } => {
            assert_eq!(component_id, "c1");
            assert_eq!(max_fuel, 50_000);
            assert!(consumed >= max_fuel);
        }
        other => panic!("expected OutOfFuel, got {other:?}"),
    }
}

#[tokio::test]
async fn test_execute_unknown_component() {
    let manager = HostSystemManager::new().unwrap();

    let err = manager
        .execute(&"ghost".into(), "double", vec![Value::I32(1)])
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_request_round_trip_through_manager() {
    let manager = HostSystemManager::new().unwrap();
    spawn(&manager, "echo", worker()).await;

    let reply = manager
        .messaging()
        .request("client".into(), "echo".into(), vec![0; 7], None)
        .await
        .unwrap();

    assert_eq!(reply, 7i32.to_le_bytes().to_vec());
}
