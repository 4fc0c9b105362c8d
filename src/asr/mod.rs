//! ASR fallback engine (spec §4.4): a composite of N sub-engines in
//! priority order, the last always an offline streaming engine acting as
//! the terminal fallback and the endpoint detector for the whole
//! composite.

pub mod fallback;
pub mod offline;
pub mod online;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Available,
    Degraded,
    Unavailable,
}

/// Sub-engine contract (spec §4.4). Implementations use interior
/// mutability so the composite can hold them behind a shared reference
/// while network round-trips for batch engines run on detached tasks.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Fans out every captured sample; engines that don't need warmup
    /// can ignore frames until `trigger_recognize` is called.
    fn feed(&self, samples: &[f32]);

    /// Returns the best available text so far; possibly partial.
    fn get_result(&self) -> Option<String>;

    /// Only the offline engine meaningfully implements this; others
    /// default to `false` per spec §4.4 ("online batch engines cannot
    /// report endpoints").
    fn is_endpoint(&self) -> bool {
        false
    }

    fn reset(&self);
    fn close(&self);

    fn status(&self) -> EngineStatus {
        EngineStatus::Available
    }

    /// Batch engines perform their network round-trip only after this is
    /// called; default no-op for streaming engines that are always live.
    async fn trigger_recognize(&self) {}

    /// Propagates cancellation to abort in-flight network calls on
    /// barge-in. Default no-op.
    fn cancel(&self) {}
}
