//! Audio I/O: microphone capture and speaker playback.

mod capture;
mod player;

pub use capture::{AudioCapture, CaptureConfig};
pub use player::{cached_path, PausedMusicSnapshot, PlaybackOptions, StreamPlayer};
