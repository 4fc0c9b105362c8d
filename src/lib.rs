//! Voxd: an always-on voice assistant orchestrator. Wake word detection,
//! streaming ASR with graceful fallback, an LLM tool-calling loop,
//! sentence-level TTS playback, and barge-in, wired together behind a
//! single four-state dispatcher (spec §2/§4.10).

pub mod asr;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod persistence;
pub mod security;
pub mod speaker;
pub mod tools;
pub mod tts;
pub mod types;
pub mod vad;
pub mod wake;

pub use config::Config;
pub use error::CoreError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
