//! Online ASR providers (spec §6): an HTTP batch engine and a
//! WebSocket streaming engine with an HMAC-SHA1-signed connect URL.
//! Grounded on the teacher's `tools/web.rs` HTTP-client idiom and
//! `agent/llm.rs`'s async-request-then-parse shape, generalized from
//! chat completions to speech recognition.

use super::{AsrEngine, EngineStatus};
use crate::error::CoreError;
use async_trait::async_trait;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type HmacSha1 = Hmac<Sha1>;

struct BatchState {
    pcm: Vec<u8>,
    result: Option<String>,
    status: EngineStatus,
}

/// `online-batch` sub-engine: buffers PCM until `trigger_recognize` is
/// called, then performs a single HTTP round-trip (spec §4.4 "batch
/// engines implement [triggerRecognize] and only perform their network
/// round-trip after it is called").
pub struct OnlineBatchEngine {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
    state: Mutex<BatchState>,
    cancelled: AtomicBool,
    sample_rate: u32,
    trailing_silence_ms: u64,
    floor_audio_ms: u64,
}

impl OnlineBatchEngine {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        sample_rate: u32,
        trailing_silence_ms: u64,
        floor_audio_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key,
            client: reqwest::Client::new(),
            state: Mutex::new(BatchState {
                pcm: Vec::new(),
                result: None,
                status: EngineStatus::Available,
            }),
            cancelled: AtomicBool::new(false),
            sample_rate,
            trailing_silence_ms,
            floor_audio_ms,
        }
    }

    /// Trims trailing silence from the buffered PCM16 before it's shipped
    /// over HTTP (spec §4.4 rule 7): keep everything up to the last
    /// sample exceeding a fixed small threshold, plus `trailing_silence_ms`
    /// of silence, with a floor of `floor_audio_ms` total audio.
    fn trim_trailing_silence<'a>(&self, pcm: &'a [u8]) -> &'a [u8] {
        const THRESHOLD: i16 = (0.01 * i16::MAX as f32) as i16;
        let samples = pcm.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]]));
        let last_loud = samples.enumerate().rev().find(|(_, s)| s.abs() > THRESHOLD).map(|(idx, _)| idx);

        let trailing_samples = (self.trailing_silence_ms as f64 / 1000.0 * self.sample_rate as f64) as usize;
        let floor_samples = (self.floor_audio_ms as f64 / 1000.0 * self.sample_rate as f64) as usize;
        let total_samples = pcm.len() / 2;

        let cut_at = match last_loud {
            Some(idx) => (idx + trailing_samples + 1).min(total_samples),
            None => total_samples,
        };
        let cut_at = cut_at.max(floor_samples.min(total_samples));
        &pcm[..cut_at * 2]
    }

    async fn recognize(&self) -> Result<String, CoreError> {
        let pcm = {
            let state = self.state.lock().unwrap();
            self.trim_trailing_silence(&state.pcm).to_vec()
        };
        let body = serde_json::json!({
            "audio": base64::engine::general_purpose::STANDARD.encode(&pcm),
            "sample_rate": self.sample_rate,
            "encoding": "pcm16le",
        });

        let mut req = self
            .client
            .post(&self.endpoint)
            .timeout(std::time::Duration::from_secs(10))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(CoreError::from)?;
        let status = resp.status();
        if !status.is_success() {
            let vendor_code = None;
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::from_http(status.as_u16(), vendor_code, &text));
        }
        let payload: serde_json::Value = resp.json().await.map_err(CoreError::from)?;
        Ok(payload
            .get("result")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl AsrEngine for OnlineBatchEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn feed(&self, samples: &[f32]) {
        let mut state = self.state.lock().unwrap();
        state.pcm.extend(samples.iter().flat_map(|&s| {
            let clamped = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            clamped.to_le_bytes()
        }));
    }

    fn get_result(&self) -> Option<String> {
        self.state.lock().unwrap().result.clone()
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.pcm.clear();
        state.result = None;
        state.status = EngineStatus::Available;
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.reset();
    }

    fn status(&self) -> EngineStatus {
        self.state.lock().unwrap().status
    }

    async fn trigger_recognize(&self) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        match self.recognize().await {
            Ok(text) => {
                let mut state = self.state.lock().unwrap();
                state.result = Some(text);
                state.status = EngineStatus::Available;
            }
            Err(e) => {
                warn!(engine = %self.name, "batch recognize failed: {e}");
                let mut state = self.state.lock().unwrap();
                state.status = if e.triggers_fallback() {
                    EngineStatus::Unavailable
                } else {
                    EngineStatus::Degraded
                };
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// `online-stream` sub-engine: WebSocket connection with an
/// HMAC-SHA1-signed connect URL (spec §6). Binary frames carry PCM
/// chunks; JSON control frames carry `slice_type`/`final`.
pub struct OnlineStreamEngine {
    name: String,
    tx: mpsc::UnboundedSender<StreamCommand>,
    result: std::sync::Arc<Mutex<Option<String>>>,
    status: std::sync::Arc<Mutex<EngineStatus>>,
}

enum StreamCommand {
    Pcm(Vec<u8>),
    Close,
}

impl OnlineStreamEngine {
    /// Spawns the connection task; `base_url` must already carry the
    /// unsigned query parameters, `secret` signs them.
    pub async fn connect(
        name: impl Into<String>,
        base_url: &str,
        access_key: &str,
        secret: &str,
    ) -> Result<Self, CoreError> {
        let url = sign_connect_url(base_url, access_key, secret)
            .map_err(|e| CoreError::Protocol(format!("failed to sign ASR stream URL: {e}")))?;

        let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<StreamCommand>();
        let result = std::sync::Arc::new(Mutex::new(None));
        let status = std::sync::Arc::new(Mutex::new(EngineStatus::Available));

        let result_writer = result.clone();
        let status_writer = status.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = rx.recv() => {
                        match cmd {
                            Some(StreamCommand::Pcm(bytes)) => {
                                if write.send(tokio_tungstenite::tungstenite::Message::Binary(bytes.into())).await.is_err() {
                                    *status_writer.lock().unwrap() = EngineStatus::Unavailable;
                                    break;
                                }
                            }
                            Some(StreamCommand::Close) | None => {
                                let _ = write.send(tokio_tungstenite::tungstenite::Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                                if let Ok(val) = serde_json::from_str::<serde_json::Value>(&text) {
                                    if let Some(text_result) = val.pointer("/result/text").and_then(|v| v.as_str()) {
                                        *result_writer.lock().unwrap() = Some(text_result.to_string());
                                    }
                                    let is_final = val.pointer("/result/slice_type").and_then(|v| v.as_i64()) == Some(2)
                                        || val.get("final").and_then(|v| v.as_i64()) == Some(1);
                                    if is_final {
                                        debug!("ASR stream reported final result");
                                    }
                                }
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("ASR stream read error: {e}");
                                *status_writer.lock().unwrap() = EngineStatus::Unavailable;
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Self {
            name: name.into(),
            tx,
            result,
            status,
        })
    }
}

#[async_trait]
impl AsrEngine for OnlineStreamEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn feed(&self, samples: &[f32]) {
        let bytes: Vec<u8> = samples
            .iter()
            .flat_map(|&s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
            .collect();
        let _ = self.tx.send(StreamCommand::Pcm(bytes));
    }

    fn get_result(&self) -> Option<String> {
        self.result.lock().unwrap().clone()
    }

    fn reset(&self) {
        *self.result.lock().unwrap() = None;
    }

    fn close(&self) {
        let _ = self.tx.send(StreamCommand::Close);
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock().unwrap()
    }

    fn cancel(&self) {
        let _ = self.tx.send(StreamCommand::Close);
    }
}

/// Builds a signed WebSocket connect URL: query parameters sorted
/// lexicographically, then HMAC-SHA1 signed, per spec §6.
fn sign_connect_url(base_url: &str, access_key: &str, secret: &str) -> anyhow::Result<url::Url> {
    let mut url = url::Url::parse(base_url)?;
    let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    params.push(("accessKey".to_string(), access_key.to_string()));
    params.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical: String = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())?;
    mac.update(canonical.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    params.push(("signature".to_string(), signature));
    url.query_pairs_mut().clear();
    for (k, v) in params {
        url.query_pairs_mut().append_pair(&k, &v);
    }
    Ok(url)
}
