//! Shared types used across modules
//!
//! Frame and State are the two types the whole crate is built around:
//! every consumer of the capture stream speaks `Frame`, and every state
//! transition in the orchestrator speaks `State`. Kept here, not in
//! `orchestrator`, so `asr`/`vad`/`wake`/`speaker` can depend on them
//! without depending on the orchestrator itself.

use serde::{Deserialize, Serialize};

/// Samples per captured frame at 16 kHz (configurable, this is the default).
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Capture sample rate in Hz. Fixed per spec; resampling (if any) happens
/// in the device layer, not here.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Playback sample rate in Hz for the device output side.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// A fixed-length slice of mono float32 samples at 16 kHz.
///
/// Cheap to clone (`Arc<[f32]>` backing) since it fans out by value to
/// four concurrent consumers (wake, VAD, ASR, embedder) every ~32ms.
#[derive(Debug, Clone)]
pub struct Frame {
    samples: std::sync::Arc<[f32]>,
    pub sample_rate: u32,
}

impl Frame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The orchestrator's four states. Transitions are total and enumerated
/// in `orchestrator::state`; only the dispatcher worker ever writes this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "idle"),
            State::Listening => write!(f, "listening"),
            State::Processing => write!(f, "processing"),
            State::Speaking => write!(f, "speaking"),
        }
    }
}

/// Role of a conversation message. `Tool` carries the id of the tool call
/// it answers via `ChatMessage::tool_call_id`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
