//! Wake detector (spec §4.2): keyword-spotter fed every frame in every
//! state except `Listening`. Reports a match at most once per utterance;
//! the caller must `reset()` before the next detection can fire.
//!
//! Grounded on the ONNX-session-holding shape of the teacher's
//! `voice/silero_vad.rs::SileroVad` (model load, persistent hidden
//! state, per-frame `run_inference`), generalized from a speech/silence
//! classifier to a keyword-probability classifier.

use crate::config::WakeConfig;
use crate::types::Frame;
use anyhow::{Context, Result};
use ort::session::Session;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const HIDDEN_STATE_LEN: usize = 2 * 1 * 128;

/// ONNX keyword-spotter. One `Session` handles all configured keywords;
/// the model is expected to output a single match probability per frame.
pub struct WakeDetector {
    session: Option<Session>,
    state: Vec<f32>,
    threshold: f32,
    keywords: Vec<String>,
    detected: bool,
}

impl WakeDetector {
    pub fn new(config: &WakeConfig) -> Result<Self> {
        let session = match &config.model_path {
            Some(path) => Some(load_session(path)?),
            None => {
                warn!("no wake model configured; wake detector runs in pass-through (never-detect) mode");
                None
            }
        };
        Ok(Self {
            session,
            state: vec![0.0; HIDDEN_STATE_LEN],
            threshold: config.threshold,
            keywords: config.keywords.clone(),
            detected: false,
        })
    }

    /// Feeds one frame. No-op once `detected()` is true until `reset()`.
    pub fn feed(&mut self, frame: &Frame) {
        if self.detected {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match run_inference(session, &mut self.state, frame.samples()) {
            Ok(prob) => {
                if prob >= self.threshold {
                    debug!(prob, threshold = self.threshold, "wake keyword matched");
                    self.detected = true;
                }
            }
            Err(e) => warn!("wake detector inference error: {e}"),
        }
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn reset(&mut self) {
        self.detected = false;
        self.state.fill(0.0);
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

fn load_session(path: &PathBuf) -> Result<Session> {
    let session = Session::builder()?
        .with_intra_threads(1)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load wake model from {path:?}"))?;
    info!(path = ?path, "wake model loaded");
    Ok(session)
}

fn run_inference(session: &mut Session, state: &mut [f32], audio: &[f32]) -> Result<f32> {
    use ort::value::Value;

    let input = Value::from_array(([1usize, audio.len()], audio.to_vec()))?;
    let state_tensor = Value::from_array(([2usize, 1usize, 128usize], state.to_vec()))?;
    let sr = Value::from_array(([1usize], vec![crate::types::CAPTURE_SAMPLE_RATE as i64]))?;

    let outputs = session.run(ort::inputs![input, state_tensor, sr])?;
    let (_shape, prob_data) = outputs[0].try_extract_tensor::<f32>()?;
    let prob = prob_data.first().copied().unwrap_or(0.0);

    let (_state_shape, new_state) = outputs[1].try_extract_tensor::<f32>()?;
    if new_state.len() == state.len() {
        state.copy_from_slice(new_state);
    }
    Ok(prob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WakeConfig {
        WakeConfig {
            threshold: 0.5,
            keywords: vec!["test".to_string()],
            model_path: None,
        }
    }

    #[test]
    fn pass_through_mode_never_detects() {
        let mut wd = WakeDetector::new(&config()).unwrap();
        let frame = Frame::new(vec![0.0; 512], 16_000);
        for _ in 0..10 {
            wd.feed(&frame);
        }
        assert!(!wd.detected());
    }

    #[test]
    fn reset_clears_detected_flag() {
        let mut wd = WakeDetector::new(&config()).unwrap();
        wd.detected = true;
        wd.reset();
        assert!(!wd.detected());
    }

    #[test]
    fn detected_latches_until_reset() {
        let mut wd = WakeDetector::new(&config()).unwrap();
        wd.detected = true;
        let frame = Frame::new(vec![0.0; 512], 16_000);
        wd.feed(&frame);
        assert!(wd.detected());
        wd.reset();
        assert!(!wd.detected());
    }
}
