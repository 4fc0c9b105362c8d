//! Offline streaming ASR engine: the terminal fallback and the endpoint
//! detector for the whole composite (spec §4.4). Grounded on the
//! teacher's `voice/whisper.rs::WhisperEngine` model-loading idiom,
//! adapted to the `ort`-based session pattern already used by
//! `wake`/`vad` since the teacher's `whisper-rs` binding isn't part of
//! this crate's dependency stack.

use super::{AsrEngine, EngineStatus};
use crate::vad::Vad;
use crate::config::VadConfig;
use async_trait::async_trait;
use ort::session::Session;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

struct State {
    buffer: Vec<f32>,
    endpoint_vad: Vad,
    endpoint: bool,
    partial: String,
    final_text: Option<String>,
}

/// Buffers captured samples, runs an internal VAD to decide endpoints,
/// and (when a model is configured) decodes the buffered audio through
/// an ONNX session. Without a model it still provides correct endpoint
/// timing with an empty transcript, matching the pass-through mode used
/// elsewhere in this crate when no model file is configured.
pub struct OfflineEngine {
    session: Option<Mutex<Session>>,
    state: Mutex<State>,
    sample_rate: u32,
}

impl OfflineEngine {
    pub fn new(model_path: Option<&PathBuf>, vad_config: &VadConfig, sample_rate: u32, frame_size: usize) -> anyhow::Result<Self> {
        let session = match model_path {
            Some(path) => {
                let s = Session::builder()?
                    .with_intra_threads(1)?
                    .commit_from_file(path)?;
                info!(path = ?path, "offline ASR model loaded");
                Some(Mutex::new(s))
            }
            None => {
                warn!("no offline ASR model configured; running in pass-through (empty transcript) mode");
                None
            }
        };
        Ok(Self {
            session,
            state: Mutex::new(State {
                buffer: Vec::new(),
                endpoint_vad: Vad::new(vad_config, sample_rate, frame_size),
                endpoint: false,
                partial: String::new(),
                final_text: None,
            }),
            sample_rate,
        })
    }

    fn decode(&self, samples: &[f32]) -> String {
        let Some(session) = &self.session else {
            return String::new();
        };
        let mut guard = session.lock().unwrap();
        match run_decode(&mut guard, samples, self.sample_rate.into()) {
            Ok(text) => text,
            Err(e) => {
                warn!("offline ASR decode error: {e}");
                String::new()
            }
        }
    }
}

fn run_decode(session: &mut Session, samples: &[f32], sample_rate: i64) -> anyhow::Result<String> {
    use ort::value::Value;
    let input = Value::from_array(([1usize, samples.len()], samples.to_vec()))?;
    let sr = Value::from_array(([1usize], vec![sample_rate]))?;
    let outputs = session.run(ort::inputs![input, sr])?;
    let (_shape, ids) = outputs[0].try_extract_tensor::<f32>()?;
    // Placeholder token-id-to-text mapping: the model's own vocabulary is
    // opaque to this crate, so non-zero activations are reported as a
    // generic transcript marker rather than fabricated text.
    Ok(if ids.iter().any(|v| *v > 0.5) {
        "[recognized speech]".to_string()
    } else {
        String::new()
    })
}

#[async_trait]
impl AsrEngine for OfflineEngine {
    fn name(&self) -> &str {
        "offline"
    }

    fn feed(&self, samples: &[f32]) {
        let mut state = self.state.lock().unwrap();
        state.buffer.extend_from_slice(samples);
        let frame = crate::types::Frame::new(samples.to_vec(), self.sample_rate);
        state.endpoint_vad.feed(&frame);
        if let Some((segment, _present)) = state.endpoint_vad.next_segment() {
            let text = self.decode(&segment);
            state.endpoint = true;
            state.final_text = Some(text.clone());
            state.partial = text;
        } else if state.endpoint_vad.is_speech() {
            state.partial = self.decode(&state.buffer.clone());
        }
    }

    fn get_result(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        if let Some(final_text) = &state.final_text {
            Some(final_text.clone())
        } else {
            Some(state.partial.clone())
        }
    }

    fn is_endpoint(&self) -> bool {
        self.state.lock().unwrap().endpoint
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.buffer.clear();
        state.endpoint_vad.reset();
        state.endpoint = false;
        state.partial.clear();
        state.final_text = None;
    }

    fn close(&self) {
        self.reset();
    }

    fn status(&self) -> EngineStatus {
        EngineStatus::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vad_cfg() -> VadConfig {
        VadConfig {
            threshold: 0.5,
            min_silence_ms: 100,
            model_path: None,
        }
    }

    #[test]
    fn pass_through_mode_yields_empty_text_but_detects_endpoint() {
        let engine = OfflineEngine::new(None, &vad_cfg(), 16_000, 512).unwrap();
        let loud = vec![0.8f32; 512];
        for _ in 0..5 {
            engine.feed(&loud);
        }
        assert!(!engine.is_endpoint());
        let silence = vec![0.0001f32; 512];
        for _ in 0..8 {
            engine.feed(&silence);
        }
        assert!(engine.is_endpoint());
        assert_eq!(engine.get_result(), Some(String::new()));
    }

    #[test]
    fn reset_clears_endpoint_and_buffer() {
        let engine = OfflineEngine::new(None, &vad_cfg(), 16_000, 512).unwrap();
        let loud = vec![0.8f32; 512];
        for _ in 0..5 {
            engine.feed(&loud);
        }
        let silence = vec![0.0001f32; 512];
        for _ in 0..8 {
            engine.feed(&silence);
        }
        assert!(engine.is_endpoint());
        engine.reset();
        assert!(!engine.is_endpoint());
    }
}
