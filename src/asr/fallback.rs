//! ASR composite (spec §4.4): feeds every sub-engine, delegates endpoint
//! detection to the offline terminal engine, demotes on quota/transport
//! errors, and recovers opportunistically. Trailing-silence trimming
//! before a batch round-trip (rule 7) lives on `OnlineBatchEngine`
//! itself, which owns the buffer being trimmed.
//!
//! Grounded on the teacher's `agent/failover.rs` demotion/recovery
//! chain shape, generalized from "list of LLM models" to "list of ASR
//! sub-engines" and corrected to use typed `CoreError` markers instead
//! of a lowercase substring scan.

use super::{AsrEngine, EngineStatus};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

struct DemotionRecord {
    demoted_at: Instant,
}

struct CompositeState {
    current_index: usize,
    demotions: Vec<Option<DemotionRecord>>,
    last_recovery_check: Option<Instant>,
    endpoint_triggered: bool,
}

/// Ordered composite of ASR sub-engines. The last engine is always the
/// offline terminal fallback and endpoint detector.
pub struct AsrFallback {
    engines: Vec<Box<dyn AsrEngine>>,
    recovery_interval: Duration,
    state: Mutex<CompositeState>,
}

impl AsrFallback {
    pub fn new(engines: Vec<Box<dyn AsrEngine>>, recovery_interval: Duration) -> Self {
        assert!(!engines.is_empty(), "ASR composite requires at least the offline terminal engine");
        let count = engines.len();
        Self {
            engines,
            recovery_interval,
            state: Mutex::new(CompositeState {
                current_index: 0,
                demotions: (0..count).map(|_| None).collect(),
                last_recovery_check: None,
                endpoint_triggered: false,
            }),
        }
    }

    fn offline_index(&self) -> usize {
        self.engines.len() - 1
    }

    /// Fans `samples` out to every sub-engine (spec §4.4 rule 1), checks
    /// the offline engine for endpoint and triggers batch recognition,
    /// and runs opportunistic recovery.
    pub async fn feed(&self, samples: &[f32]) {
        for engine in &self.engines {
            engine.feed(samples);
        }

        let offline_idx = self.offline_index();
        if self.engines[offline_idx].is_endpoint() {
            let mut state = self.state.lock().unwrap();
            if !state.endpoint_triggered {
                state.endpoint_triggered = true;
                drop(state);
                for engine in &self.engines[..offline_idx] {
                    engine.trigger_recognize().await;
                }
            }
        }

        self.maybe_recover();
    }

    pub fn is_endpoint(&self) -> bool {
        self.engines[self.offline_index()].is_endpoint()
    }

    /// Per spec §4.4 rule 3: not at endpoint returns the offline
    /// streaming partial; at endpoint, polls the current primary up to
    /// 10s, demoting on `Unavailable`, falling back to offline text on
    /// total timeout.
    pub async fn get_result(&self) -> String {
        if !self.is_endpoint() {
            return self.engines[self.offline_index()].get_result().unwrap_or_default();
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let idx = self.state.lock().unwrap().current_index;
            if idx == self.offline_index() {
                return self.engines[idx].get_result().unwrap_or_default();
            }

            if let Some(text) = self.engines[idx].get_result() {
                if !text.is_empty() {
                    return text;
                }
            }

            if self.engines[idx].status() == EngineStatus::Unavailable {
                self.demote(idx);
                self.engines[idx].trigger_recognize().await;
                continue;
            }

            if Instant::now() >= deadline {
                warn!("ASR composite poll timed out, falling back to offline text");
                return self
                    .engines[self.offline_index()]
                    .get_result()
                    .unwrap_or_default();
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn cancel(&self) {
        for engine in &self.engines {
            engine.cancel();
        }
    }

    pub fn reset(&self) {
        for engine in &self.engines {
            engine.reset();
        }
        let mut state = self.state.lock().unwrap();
        state.endpoint_triggered = false;
    }

    fn demote(&self, idx: usize) {
        let mut state = self.state.lock().unwrap();
        if idx >= self.offline_index() {
            return;
        }
        state.demotions[idx] = Some(DemotionRecord {
            demoted_at: Instant::now(),
        });
        state.current_index = (idx + 1).min(self.offline_index());
        info!(from = idx, to = state.current_index, "ASR engine demoted");
    }

    fn maybe_recover(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        if let Some(last) = state.last_recovery_check {
            if now.duration_since(last) < self.recovery_interval {
                return;
            }
        }
        state.last_recovery_check = Some(now);

        for idx in 0..state.current_index {
            let eligible = state.demotions[idx]
                .as_ref()
                .map(|d| now.duration_since(d.demoted_at) >= self.recovery_interval)
                .unwrap_or(false);
            if eligible && self.engines[idx].status() == EngineStatus::Available {
                info!(to = idx, "ASR engine recovered");
                state.current_index = idx;
                state.demotions[idx] = None;
                break;
            }
        }
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().unwrap().current_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeEngine {
        name: &'static str,
        result: Mutex<Option<String>>,
        endpoint: AtomicBool,
        status: Mutex<EngineStatus>,
    }

    impl FakeEngine {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                result: Mutex::new(None),
                endpoint: AtomicBool::new(false),
                status: Mutex::new(EngineStatus::Available),
            }
        }
    }

    #[async_trait]
    impl AsrEngine for FakeEngine {
        fn name(&self) -> &str {
            self.name
        }
        fn feed(&self, _samples: &[f32]) {}
        fn get_result(&self) -> Option<String> {
            self.result.lock().unwrap().clone()
        }
        fn is_endpoint(&self) -> bool {
            self.endpoint.load(Ordering::SeqCst)
        }
        fn reset(&self) {
            *self.result.lock().unwrap() = None;
            self.endpoint.store(false, Ordering::SeqCst);
        }
        fn close(&self) {}
        fn status(&self) -> EngineStatus {
            *self.status.lock().unwrap()
        }
        async fn trigger_recognize(&self) {
            *self.result.lock().unwrap() = Some("batch result".to_string());
        }
    }

    #[tokio::test]
    async fn not_at_endpoint_returns_offline_partial() {
        let offline = Box::new(FakeEngine::new("offline"));
        *offline.result.lock().unwrap() = Some("partial...".to_string());
        let composite = AsrFallback::new(vec![offline], Duration::from_secs(300));
        assert_eq!(composite.get_result().await, "partial...");
    }

    #[tokio::test]
    async fn endpoint_triggers_batch_and_returns_its_text() {
        let batch = Box::new(FakeEngine::new("batch"));
        let offline = Box::new(FakeEngine::new("offline"));
        offline.endpoint.store(true, Ordering::SeqCst);
        let composite = AsrFallback::new(vec![batch, offline], Duration::from_secs(300));
        composite.feed(&[0.0; 10]).await;
        assert_eq!(composite.get_result().await, "batch result");
    }
}
