//! Voice-activity detector (spec §4.3): `feed`/`isSpeech`/`flush`/
//! `nextSegment`/`reset`. Emits contiguous voiced runs bounded by
//! `minSilenceMs` trailing silence; used during `Listening` to decide
//! when the user has stopped talking.
//!
//! Grounded on the teacher's `voice/vad.rs::Vad` energy-threshold state
//! machine (onset/hangover frame counting, adaptive noise floor),
//! collapsed from a standalone processor into the push/pull shape the
//! orchestrator's dispatcher needs.

use crate::config::VadConfig as VadSettings;
use crate::types::Frame;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Silence,
    Speech,
}

/// A completed or in-progress voiced segment.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub samples: Vec<f32>,
}

/// Energy-based VAD with an adaptive noise floor, grounded on the
/// teacher's onset/hangover counting scheme but driven by `minSilenceMs`
/// instead of a fixed hangover-frame count.
pub struct Vad {
    sample_rate: u32,
    noise_floor: f32,
    threshold: f32,
    min_silence_frames: usize,
    onset_frames: usize,
    state: RunState,
    consecutive_speech: usize,
    consecutive_silence: usize,
    current: VecDeque<f32>,
    ready: Option<Segment>,
}

impl Vad {
    pub fn new(settings: &VadSettings, sample_rate: u32, frame_size: usize) -> Self {
        let frame_ms = (frame_size as f64 * 1000.0 / sample_rate as f64).max(1.0);
        let min_silence_frames = ((settings.min_silence_ms as f64 / frame_ms).ceil() as usize).max(1);
        Self {
            sample_rate,
            noise_floor: 1e-6,
            threshold: settings.threshold,
            min_silence_frames,
            onset_frames: 2,
            state: RunState::Silence,
            consecutive_speech: 0,
            consecutive_silence: 0,
            current: VecDeque::new(),
            ready: None,
        }
    }

    /// Feeds one frame, updating internal speech/silence state.
    pub fn feed(&mut self, frame: &Frame) {
        let energy = rms(frame.samples());
        let adaptive_threshold = self.noise_floor * (1.0 + self.threshold * 9.0);
        let frame_is_speech = energy > adaptive_threshold;

        if !frame_is_speech {
            self.noise_floor = self.noise_floor * 0.95 + energy * 0.05;
        }

        match self.state {
            RunState::Silence => {
                if frame_is_speech {
                    self.consecutive_speech += 1;
                    self.current.extend(frame.samples().iter().copied());
                    if self.consecutive_speech >= self.onset_frames {
                        self.state = RunState::Speech;
                    }
                } else {
                    self.consecutive_speech = 0;
                    self.current.clear();
                }
            }
            RunState::Speech => {
                self.current.extend(frame.samples().iter().copied());
                if frame_is_speech {
                    self.consecutive_silence = 0;
                } else {
                    self.consecutive_silence += 1;
                    if self.consecutive_silence >= self.min_silence_frames {
                        self.finish_segment();
                    }
                }
            }
        }
    }

    pub fn is_speech(&self) -> bool {
        self.state == RunState::Speech
    }

    /// Forces the in-progress run to close, e.g. on a hard stop.
    pub fn flush(&mut self) {
        if self.state == RunState::Speech && !self.current.is_empty() {
            self.finish_segment();
        }
    }

    /// Pops the next completed segment, if any, as `(samples, present)`.
    pub fn next_segment(&mut self) -> Option<(Vec<f32>, bool)> {
        self.ready.take().map(|seg| (seg.samples, true))
    }

    pub fn reset(&mut self) {
        self.state = RunState::Silence;
        self.consecutive_speech = 0;
        self.consecutive_silence = 0;
        self.current.clear();
        self.ready = None;
        self.noise_floor = 1e-6;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn finish_segment(&mut self) {
        let samples: Vec<f32> = self.current.drain(..).collect();
        self.ready = Some(Segment { samples });
        self.state = RunState::Silence;
        self.consecutive_speech = 0;
        self.consecutive_silence = 0;
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> VadSettings {
        VadSettings {
            threshold: 0.5,
            min_silence_ms: 100,
            model_path: None,
        }
    }

    #[test]
    fn silence_never_reports_speech() {
        let mut vad = Vad::new(&settings(), 16_000, 512);
        let silence = Frame::new(vec![0.0; 512], 16_000);
        for _ in 0..20 {
            vad.feed(&silence);
        }
        assert!(!vad.is_speech());
        assert!(vad.next_segment().is_none());
    }

    #[test]
    fn loud_then_silence_emits_segment() {
        let mut vad = Vad::new(&settings(), 16_000, 512);
        let silence = Frame::new(vec![0.0001; 512], 16_000);
        for _ in 0..10 {
            vad.feed(&silence);
        }
        let loud = Frame::new(vec![0.8; 512], 16_000);
        for _ in 0..5 {
            vad.feed(&loud);
        }
        assert!(vad.is_speech());
        // 100ms min silence / (512/16000*1000=32ms per frame) -> ~4 frames
        for _ in 0..6 {
            vad.feed(&silence);
        }
        assert!(!vad.is_speech());
        let (samples, present) = vad.next_segment().expect("segment should be ready");
        assert!(present);
        assert!(!samples.is_empty());
    }

    #[test]
    fn reset_clears_in_progress_run() {
        let mut vad = Vad::new(&settings(), 16_000, 512);
        let loud = Frame::new(vec![0.8; 512], 16_000);
        for _ in 0..5 {
            vad.feed(&loud);
        }
        assert!(vad.is_speech());
        vad.reset();
        assert!(!vad.is_speech());
        assert!(vad.next_segment().is_none());
    }
}
