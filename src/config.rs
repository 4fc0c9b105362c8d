//! Configuration surface (spec §6).
//!
//! Mirrors the teacher's `toml`-backed load/save pattern: a single struct
//! with `serde(default)` sections, each field defaulted through a
//! `default_*()` function so a partially-written config file still loads.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub asr: AsrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub voiceprint: VoiceprintConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
}

fn default_sample_rate() -> u32 {
    16_000
}
fn default_channels() -> u16 {
    1
}
fn default_frame_size() -> usize {
    512
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            frame_size: default_frame_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    #[serde(default = "default_wake_reply")]
    pub wake_reply: String,
    #[serde(default = "default_interrupt_reply")]
    pub interrupt_reply: String,
    #[serde(default = "default_listen_delay_ms")]
    pub listen_delay_ms: u64,
    #[serde(default = "default_continuous_timeout_secs")]
    pub continuous_timeout_secs: u64,
}

fn default_wake_reply() -> String {
    String::new()
}
fn default_interrupt_reply() -> String {
    "好的".to_string()
}
fn default_listen_delay_ms() -> u64 {
    500
}
fn default_continuous_timeout_secs() -> u64 {
    10
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            wake_reply: default_wake_reply(),
            interrupt_reply: default_interrupt_reply(),
            listen_delay_ms: default_listen_delay_ms(),
            continuous_timeout_secs: default_continuous_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeConfig {
    #[serde(default = "default_wake_threshold")]
    pub threshold: f32,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

fn default_wake_threshold() -> f32 {
    0.5
}
fn default_keywords() -> Vec<String> {
    vec!["你好小助手".to_string()]
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            threshold: default_wake_threshold(),
            keywords: default_keywords(),
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_silence_ms")]
    pub min_silence_ms: u64,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

fn default_vad_threshold() -> f32 {
    0.5
}
fn default_min_silence_ms() -> u64 {
    1200
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: default_vad_threshold(),
            min_silence_ms: default_min_silence_ms(),
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrEngineConfig {
    /// Engine tag, e.g. "cloud-batch", "cloud-stream", "offline".
    pub tag: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    #[serde(default = "default_asr_priority")]
    pub priority: Vec<String>,
    #[serde(default)]
    pub engines: Vec<AsrEngineConfig>,
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
    #[serde(default = "default_trailing_silence_ms")]
    pub trailing_silence_ms: u64,
    #[serde(default = "default_floor_audio_ms")]
    pub floor_audio_ms: u64,
}

fn default_asr_priority() -> Vec<String> {
    vec!["offline".to_string()]
}
fn default_recovery_interval_secs() -> u64 {
    300
}
fn default_trailing_silence_ms() -> u64 {
    200
}
fn default_floor_audio_ms() -> u64 {
    500
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            priority: default_asr_priority(),
            engines: Vec::new(),
            recovery_interval_secs: default_recovery_interval_secs(),
            trailing_silence_ms: default_trailing_silence_ms(),
            floor_audio_ms: default_floor_audio_ms(),
        }
    }
}

impl AsrConfig {
    /// `priority` with the offline tag force-appended if the user forgot
    /// it, per spec §6: "offline tag is force-appended if absent".
    pub fn priority_with_offline(&self) -> Vec<String> {
        let mut list = self.priority.clone();
        if !list.iter().any(|t| t == "offline") {
            list.push("offline".to_string());
        }
        list
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<LlmProviderConfig>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_history() -> usize {
    20
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            max_history: default_max_history(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_engine")]
    pub engine: String,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default = "default_tts_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

fn default_tts_engine() -> String {
    "local".to_string()
}
fn default_tts_sample_rate() -> u32 {
    24_000
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: default_tts_engine(),
            fallback: None,
            sample_rate: default_tts_sample_rate(),
            endpoint: None,
            voice: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceprintConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_voiceprint_threshold")]
    pub threshold: f32,
    #[serde(default = "default_buffer_secs")]
    pub buffer_secs: f32,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_voiceprint_threshold() -> f32 {
    0.6
}
fn default_buffer_secs() -> f32 {
    3.0
}

impl Default for VoiceprintConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            threshold: default_voiceprint_threshold(),
            buffer_secs: default_buffer_secs(),
            model_path: None,
        }
    }
}

/// Tool back-end endpoints (spec §4.7). Inline keys here are the last
/// resort in `security::keyring::resolve_provider_key`'s lookup chain;
/// the keyring and on-disk credential file both take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub weather_url: Option<String>,
    #[serde(default)]
    pub weather_api_key: Option<String>,
    #[serde(default)]
    pub news_url: Option<String>,
    #[serde(default)]
    pub news_api_key: Option<String>,
    #[serde(default)]
    pub home_automation_url: Option<String>,
    #[serde(default)]
    pub home_automation_token: Option<String>,
    #[serde(default)]
    pub music_stream_url_template: Option<String>,
    #[serde(default)]
    pub rss_default_feed_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            dialog: DialogConfig::default(),
            wake: WakeConfig::default(),
            vad: VadConfig::default(),
            asr: AsrConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            voiceprint: VoiceprintConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load from the platform config directory, writing out defaults the
    /// first time (teacher's `Config::load` pattern in the old
    /// `config.rs`).
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("failed to read config file")?;
            let config: Config = toml::from_str(&contents).context("failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&path, contents).context("failed to write config file")?;
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "voxd", "voxd")
        .context("failed to resolve project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "voxd", "voxd")
        .context("failed to resolve project directories")?;
    Ok(base.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_tag_force_appended() {
        let cfg = AsrConfig {
            priority: vec!["cloud-batch".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.priority_with_offline(), vec!["cloud-batch", "offline"]);
    }

    #[test]
    fn offline_tag_not_duplicated() {
        let cfg = AsrConfig {
            priority: vec!["cloud-batch".to_string(), "offline".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.priority_with_offline(), vec!["cloud-batch", "offline"]);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&s).unwrap();
        assert_eq!(back.dialog.listen_delay_ms, cfg.dialog.listen_delay_ms);
    }
}
