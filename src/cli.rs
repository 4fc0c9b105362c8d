//! CLI entry point (spec §1, "explicitly out-of-core but required for
//! the crate to be runnable"): loads config, resolves credentials,
//! constructs every collaborator, and runs the orchestrator until its
//! frame channel closes.

use crate::asr::fallback::AsrFallback;
use crate::asr::offline::OfflineEngine;
use crate::asr::online::{OnlineBatchEngine, OnlineStreamEngine};
use crate::asr::AsrEngine;
use crate::audio::{AudioCapture, CaptureConfig, StreamPlayer};
use crate::config::{AsrEngineConfig, Config, LlmProviderConfig};
use crate::llm::multi::LlmComposite;
use crate::llm::provider::{ChatProvider, ProviderConfig};
use crate::orchestrator::Orchestrator;
use crate::persistence::Store;
use crate::security::resolve_provider_key;
use crate::speaker::{Gallery, SpeakerEmbedder};
use crate::tools::{ToolRegistry, Tool};
use crate::tools::alarms::SetAlarmTool;
use crate::tools::home_automation::ControlDeviceTool;
use crate::tools::memos::AddMemoTool;
use crate::tools::music::{PlayMusicTool, ResumeMusicTool};
use crate::tools::news::GetNewsTool;
use crate::tools::rss::ReadRssTool;
use crate::tools::story::TellStoryTool;
use crate::tools::time::GetTimeTool;
use crate::tools::weather::GetWeatherTool;
use crate::tts::{RemoteTtsEngine, TtsComposite, TtsEngine};
use crate::wake::WakeDetector;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

const SPEAKER_EMBEDDING_DIM: usize = 256;

#[derive(Parser)]
#[command(name = "voxd")]
#[command(about = "Always-on voice assistant orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator (default if no command given)
    Run,
    /// Manage provider credentials and configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Store a provider credential in the OS keyring (tag, e.g. "llm-openrouter")
    SetKey { tag: String, key: String },
    /// Remove a stored provider credential
    DeleteKey { tag: String },
    /// Print the resolved configuration
    Show,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => run_orchestrator().await,
        Some(Commands::Config { command }) => run_config_command(command),
    }
}

fn run_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::SetKey { tag, key } => {
            crate::security::set_provider_key(&tag, &key)?;
            println!("stored credential for \"{tag}\"");
        }
        ConfigCommands::DeleteKey { tag } => {
            crate::security::delete_provider_key(&tag)?;
            println!("removed credential for \"{tag}\"");
        }
        ConfigCommands::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn run_orchestrator() -> Result<()> {
    let config = Config::load().context("failed to load config")?;
    let data_dir = crate::config::data_dir()?;
    std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

    let store = Arc::new(Store::open(data_dir.join("voxd.sqlite3")).context("failed to open persistence store")?);

    let capture = Arc::new(AudioCapture::new(CaptureConfig {
        sample_rate: config.audio.sample_rate,
        channels: config.audio.channels,
        frame_size: config.audio.frame_size,
    })?);

    let player = Arc::new(StreamPlayer::new(data_dir.join("cache")).context("failed to open audio output")?);

    let wake = WakeDetector::new(&config.wake).context("failed to build wake detector")?;

    let speaker = Arc::new(
        SpeakerEmbedder::new(config.voiceprint.model_path.as_ref(), config.audio.sample_rate, SPEAKER_EMBEDDING_DIM)
            .context("failed to build speaker embedder")?,
    );
    let gallery = Arc::new(build_gallery(&store)?);

    let asr = Arc::new(build_asr_fallback(&config).await.context("failed to build ASR engines")?);
    let llm = Arc::new(build_llm_composite(&config));
    let tools = Arc::new(build_tool_registry(&config, data_dir.join("cache")));
    let tts = Arc::new(build_tts_composite(&config));

    let orchestrator =
        Orchestrator::new(&config, capture, wake, speaker, gallery, asr, llm, tools, tts, player, store);

    info!("voxd orchestrator starting");
    orchestrator.run().await
}

fn build_gallery(store: &Store) -> Result<Gallery> {
    let gallery = Gallery::new();
    let mut by_name: std::collections::HashMap<String, Vec<Vec<f32>>> = std::collections::HashMap::new();
    for (name, vector) in store.all_speaker_embeddings()? {
        by_name.entry(name).or_default().push(vector);
    }
    for (name, vectors) in by_name {
        gallery.register(&name, vectors);
    }
    Ok(gallery)
}

async fn build_asr_fallback(config: &Config) -> Result<AsrFallback> {
    let mut engines: Vec<Box<dyn AsrEngine>> = Vec::new();
    for tag in config.asr.priority_with_offline() {
        let engine_config = config.asr.engines.iter().find(|e| e.tag == tag);
        let engine = build_one_asr_engine(&tag, engine_config, config).await?;
        engines.push(engine);
    }
    Ok(AsrFallback::new(engines, std::time::Duration::from_secs(config.asr.recovery_interval_secs)))
}

async fn build_one_asr_engine(
    tag: &str,
    engine_config: Option<&AsrEngineConfig>,
    config: &Config,
) -> Result<Box<dyn AsrEngine>> {
    if tag == "offline" {
        let model_path = engine_config.and_then(|e| e.endpoint.as_ref()).map(std::path::PathBuf::from);
        let engine = OfflineEngine::new(model_path.as_ref(), &config.vad, config.audio.sample_rate, config.audio.frame_size)?;
        return Ok(Box::new(engine));
    }

    let engine_config = engine_config
        .with_context(|| format!("ASR tag \"{tag}\" is in the priority list but has no [[asr.engines]] entry"))?;
    let api_key = resolve_provider_key(&format!("asr-{tag}"), engine_config.api_key.as_deref());
    let endpoint = engine_config.endpoint.clone().unwrap_or_default();

    if tag.contains("stream") {
        let secret = engine_config.app_secret.clone().unwrap_or_default();
        let engine = OnlineStreamEngine::connect(tag, &endpoint, api_key.as_deref().unwrap_or_default(), &secret)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect streaming ASR engine \"{tag}\": {e}"))?;
        Ok(Box::new(engine))
    } else {
        Ok(Box::new(OnlineBatchEngine::new(
            tag,
            endpoint,
            api_key,
            config.audio.sample_rate,
            config.asr.trailing_silence_ms,
            config.asr.floor_audio_ms,
        )))
    }
}

fn build_llm_composite(config: &Config) -> LlmComposite {
    let providers: Vec<ChatProvider> = config
        .llm
        .providers
        .iter()
        .map(|p: &LlmProviderConfig| {
            let api_key = resolve_provider_key(&format!("llm-{}", p.name), p.api_key.as_deref());
            ChatProvider::new(ProviderConfig {
                name: p.name.clone(),
                base_url: p.url.clone(),
                api_key,
                model: p.model.clone(),
            })
        })
        .collect();

    if providers.is_empty() {
        warn!("no LLM providers configured; the orchestrator will not be able to answer queries");
    }
    LlmComposite::new(providers)
}

fn build_tts_composite(config: &Config) -> TtsComposite {
    let voice = config.tts.voice.clone().unwrap_or_default();
    let endpoint = config.tts.endpoint.clone().unwrap_or_default();
    let primary: Box<dyn TtsEngine> = Box::new(RemoteTtsEngine::new(config.tts.engine.clone(), &endpoint, &voice));
    let secondary: Option<Box<dyn TtsEngine>> = config
        .tts
        .fallback
        .as_ref()
        .map(|fallback_url| Box::new(RemoteTtsEngine::new("fallback", fallback_url, &voice)) as Box<dyn TtsEngine>);
    TtsComposite::new(primary, secondary)
}

fn build_tool_registry(config: &Config, music_cache_dir: std::path::PathBuf) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let tools_config = &config.tools;

    let register = |registry: &mut ToolRegistry, tool: Arc<dyn Tool>| registry.register(tool);

    register(&mut registry, Arc::new(GetTimeTool));
    register(&mut registry, Arc::new(AddMemoTool));
    register(&mut registry, Arc::new(SetAlarmTool));
    register(&mut registry, Arc::new(TellStoryTool));
    register(&mut registry, Arc::new(ResumeMusicTool::new(music_cache_dir)));

    register(
        &mut registry,
        Arc::new(GetWeatherTool::new(
            tools_config.weather_url.clone().unwrap_or_default(),
            resolve_provider_key("tool-weather", tools_config.weather_api_key.as_deref()),
        )),
    );
    register(
        &mut registry,
        Arc::new(GetNewsTool::new(
            tools_config.news_url.clone().unwrap_or_default(),
            resolve_provider_key("tool-news", tools_config.news_api_key.as_deref()),
        )),
    );
    register(
        &mut registry,
        Arc::new(ControlDeviceTool::new(
            tools_config.home_automation_url.clone().unwrap_or_default(),
            resolve_provider_key("tool-home-automation", tools_config.home_automation_token.as_deref()),
        )),
    );
    register(
        &mut registry,
        Arc::new(PlayMusicTool::new(tools_config.music_stream_url_template.clone().unwrap_or_default())),
    );
    register(
        &mut registry,
        Arc::new(ReadRssTool::new(tools_config.rss_default_feed_url.clone().unwrap_or_default())),
    );

    registry
}
