//! End-to-end ASR-engine demotion and recovery (spec §4.4 rules 4-6),
//! run against the real `AsrFallback` composite with fake sub-engines
//! standing in for network/model-backed ones — the same shape
//! `asr::fallback`'s own unit tests use for the contract, but this
//! exercises the demote-then-recover cycle across the composite's
//! public surface the dispatcher actually calls, keeping a handle to
//! each fake so its health can change after construction.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxd::asr::fallback::AsrFallback;
use voxd::asr::{AsrEngine, EngineStatus};

struct FakeEngine {
    name: &'static str,
    result: Mutex<Option<String>>,
    endpoint: AtomicBool,
    status: Mutex<EngineStatus>,
}

impl FakeEngine {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name, result: Mutex::new(None), endpoint: AtomicBool::new(false), status: Mutex::new(EngineStatus::Available) })
    }
}

/// Thin `Box<dyn AsrEngine>` wrapper around a shared `Arc<FakeEngine>` so
/// the test can keep its own handle to flip status/result after the
/// composite has taken ownership of the boxed trait object.
struct Handle(Arc<FakeEngine>);

#[async_trait]
impl AsrEngine for Handle {
    fn name(&self) -> &str {
        self.0.name
    }
    fn feed(&self, _samples: &[f32]) {}
    fn get_result(&self) -> Option<String> {
        self.0.result.lock().unwrap().clone()
    }
    fn is_endpoint(&self) -> bool {
        self.0.endpoint.load(Ordering::SeqCst)
    }
    fn reset(&self) {
        *self.0.result.lock().unwrap() = None;
        self.0.endpoint.store(false, Ordering::SeqCst);
    }
    fn close(&self) {}
    fn status(&self) -> EngineStatus {
        *self.0.status.lock().unwrap()
    }
}

/// A primary engine already unavailable at endpoint time is demoted in
/// favor of the next engine down the chain, whose text is returned.
#[tokio::test]
async fn demotes_unavailable_primary_to_secondary() {
    let primary = FakeEngine::new("primary");
    *primary.status.lock().unwrap() = EngineStatus::Unavailable;

    let secondary = FakeEngine::new("secondary");
    *secondary.result.lock().unwrap() = Some("secondary transcript".to_string());

    let offline = FakeEngine::new("offline");
    offline.endpoint.store(true, Ordering::SeqCst);

    let composite = AsrFallback::new(
        vec![Box::new(Handle(primary)), Box::new(Handle(secondary)), Box::new(Handle(offline))],
        Duration::from_millis(50),
    );

    composite.feed(&[0.0; 10]).await;
    let text = composite.get_result().await;
    assert_eq!(text, "secondary transcript");
    assert_eq!(composite.current_index(), 1, "primary should have been demoted");
}

/// A demoted engine that heals (its own `status()` reports `Available`
/// again, as a real provider would once its quota resets) is restored
/// once the recovery interval has also elapsed.
#[tokio::test]
async fn recovers_once_demoted_engine_heals_and_interval_elapses() {
    let primary = FakeEngine::new("primary");
    *primary.status.lock().unwrap() = EngineStatus::Unavailable;

    let secondary = FakeEngine::new("secondary");
    *secondary.result.lock().unwrap() = Some("secondary transcript".to_string());

    let offline = FakeEngine::new("offline");
    offline.endpoint.store(true, Ordering::SeqCst);

    let composite = AsrFallback::new(
        vec![Box::new(Handle(primary.clone())), Box::new(Handle(secondary)), Box::new(Handle(offline))],
        Duration::from_millis(50),
    );

    composite.feed(&[0.0; 10]).await;
    composite.get_result().await;
    assert_eq!(composite.current_index(), 1);

    *primary.status.lock().unwrap() = EngineStatus::Available;
    tokio::time::sleep(Duration::from_millis(60)).await;
    composite.feed(&[0.0; 10]).await;
    assert_eq!(composite.current_index(), 0, "primary should have recovered");
}
