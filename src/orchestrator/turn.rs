//! A `Turn` is one wake-to-idle conversational episode (spec §3 "Turn").
//! It owns the cancellable scope a barge-in tears down: every task the
//! query pipeline spawns registers its `AbortHandle` here, so
//! `interrupt()` cancels the whole in-flight network fan-out (LLM
//! stream, tool calls, TTS requests) in one call rather than needing
//! each to poll a flag on its own.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::task::AbortHandle;

pub struct Turn {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub transcript: String,
    pub speaker_id: Option<String>,
    interrupted: AtomicBool,
    abort_handles: Mutex<Vec<AbortHandle>>,
}

static NEXT_TURN_ID: AtomicU64 = AtomicU64::new(1);

impl Turn {
    pub fn new(transcript: String, speaker_id: Option<String>) -> Self {
        Self {
            id: NEXT_TURN_ID.fetch_add(1, Ordering::SeqCst),
            started_at: Utc::now(),
            transcript,
            speaker_id,
            interrupted: AtomicBool::new(false),
            abort_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Registers a spawned task's abort handle so `interrupt()` can tear
    /// it down. Call this immediately after `tokio::spawn`.
    pub fn register_task(&self, handle: &tokio::task::JoinHandle<impl Send + 'static>) {
        self.abort_handles.lock().unwrap().push(handle.abort_handle());
    }

    /// Barge-in: marks the turn interrupted and aborts every registered
    /// task. Idempotent — safe to call more than once.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        for handle in self.abort_handles.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_turns_get_distinct_increasing_ids() {
        let a = Turn::new("hi".into(), None);
        let b = Turn::new("there".into(), None);
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn interrupt_sets_flag_and_aborts_registered_tasks() {
        let turn = Turn::new("hi".into(), None);
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });
        turn.register_task(&handle);

        assert!(!turn.is_interrupted());
        turn.interrupt();
        assert!(turn.is_interrupted());

        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
