//! Text-to-speech synthesis (spec §4.8): `synthesize(text) ->
//! (samples, sample_rate)`, returning float32 mono PCM. A primary
//! engine is tried first; an optional secondary engine is tried on
//! failure, matching the same primary/fallback shape as the LLM and
//! ASR composites.
//!
//! Grounded on the teacher's `voice/tts_local.rs::LocalTts` (Kokorox
//! OpenAI-compatible `/v1/audio/speech` HTTP client and its manual WAV
//! chunk scanner, needed because Kokorox streams WAV with a
//! `0xFFFFFFFF` placeholder chunk size that `hound` rejects), trimmed of
//! the teacher's local Coqui-model/GPU path since every engine here
//! speaks HTTP.

use crate::error::CoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-sentence synthesis budget (spec §5: "TTS per-sentence 10 s").
pub const SENTENCE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32), CoreError>;
}

/// HTTP client for a Kokorox-compatible TTS server.
pub struct RemoteTtsEngine {
    name: String,
    base_url: String,
    voice: String,
    client: Client,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl RemoteTtsEngine {
    pub fn new(name: impl Into<String>, base_url: &str, voice: &str) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl TtsEngine for RemoteTtsEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32), CoreError> {
        if text.is_empty() {
            return Ok((Vec::new(), 24_000));
        }
        debug!(engine = %self.name, "synthesizing {} chars", text.len());

        let request =
            SpeechRequest { model: "kokoro", input: text, voice: &self.voice, response_format: "wav" };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .json(&request)
            .timeout(SENTENCE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::from_http(status, None, &body));
        }

        let wav_bytes = response
            .bytes()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        let (samples, sample_rate) = wav_to_f32(&wav_bytes)
            .map_err(|e| CoreError::Protocol(format!("bad wav from {}: {e}", self.name)))?;

        info!(engine = %self.name, samples = samples.len(), sample_rate, "synthesized");
        Ok((samples, sample_rate))
    }
}

/// Tries `primary`, falling back to `secondary` (if configured) on any
/// error. Neither side is demoted permanently — unlike the LLM/ASR
/// composites, TTS failures are rare enough per-sentence that a sticky
/// "current index" would just mean replaying the same failure pattern
/// every sentence.
pub struct TtsComposite {
    primary: Box<dyn TtsEngine>,
    secondary: Option<Box<dyn TtsEngine>>,
}

impl TtsComposite {
    pub fn new(primary: Box<dyn TtsEngine>, secondary: Option<Box<dyn TtsEngine>>) -> Self {
        Self { primary, secondary }
    }

    pub async fn synthesize(&self, text: &str) -> Result<(Vec<f32>, u32), CoreError> {
        match self.primary.synthesize(text).await {
            Ok(result) => Ok(result),
            Err(primary_err) => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_err);
                };
                warn!(
                    primary = %self.primary.name(),
                    secondary = %secondary.name(),
                    error = %primary_err,
                    "primary TTS engine failed, falling back",
                );
                secondary.synthesize(text).await
            }
        }
    }
}

/// Parses WAV bytes into float32 samples plus the stream's own sample
/// rate, handling a streaming `0xFFFFFFFF` chunk-size placeholder that
/// `hound` cannot parse.
fn wav_to_f32(wav_bytes: &[u8]) -> anyhow::Result<(Vec<f32>, u32)> {
    if wav_bytes.len() < 44 {
        anyhow::bail!("WAV data too short: {} bytes", wav_bytes.len());
    }
    if &wav_bytes[0..4] != b"RIFF" || &wav_bytes[8..12] != b"WAVE" {
        anyhow::bail!("not a valid WAV file");
    }

    let mut pos = 12;
    let mut data_start = 0usize;
    let mut data_len = 0usize;
    let mut audio_format = 0u16;
    let mut bits_per_sample = 0u16;
    let mut sample_rate = 0u32;

    while pos + 8 <= wav_bytes.len() {
        let chunk_id = &wav_bytes[pos..pos + 4];
        let chunk_size =
            u32::from_le_bytes([wav_bytes[pos + 4], wav_bytes[pos + 5], wav_bytes[pos + 6], wav_bytes[pos + 7]]);

        if chunk_id == b"fmt " {
            if pos + 8 + 16 <= wav_bytes.len() {
                audio_format = u16::from_le_bytes([wav_bytes[pos + 8], wav_bytes[pos + 9]]);
                sample_rate = u32::from_le_bytes([
                    wav_bytes[pos + 12],
                    wav_bytes[pos + 13],
                    wav_bytes[pos + 14],
                    wav_bytes[pos + 15],
                ]);
                bits_per_sample = u16::from_le_bytes([wav_bytes[pos + 22], wav_bytes[pos + 23]]);
            }
            let real_size = if chunk_size == 0xFFFFFFFF { 16 } else { chunk_size as usize };
            pos += 8 + real_size;
        } else if chunk_id == b"data" {
            data_start = pos + 8;
            data_len = if chunk_size == 0xFFFFFFFF || pos + 8 + chunk_size as usize > wav_bytes.len() {
                wav_bytes.len() - data_start
            } else {
                chunk_size as usize
            };
            break;
        } else {
            let real_size = if chunk_size == 0xFFFFFFFF { 0 } else { chunk_size as usize };
            pos += 8 + real_size;
        }
    }

    if data_start == 0 || data_start >= wav_bytes.len() {
        anyhow::bail!("could not find data chunk in WAV");
    }
    let audio_data = &wav_bytes[data_start..data_start + data_len];

    let samples = match (audio_format, bits_per_sample) {
        (3, 32) => audio_data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        (1, 16) => audio_data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect(),
        (1, 32) => audio_data
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / i32::MAX as f32)
            .collect(),
        _ => anyhow::bail!("unsupported WAV format {audio_format}/{bits_per_sample}-bit"),
    };

    Ok((samples, sample_rate))
}
