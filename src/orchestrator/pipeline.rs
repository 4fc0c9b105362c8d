//! The query pipeline (spec §4.10, "Query pipeline"): one run per
//! finalized transcript. Generation, sentence splitting and
//! TTS-and-play run concurrently so the first sentence can start
//! playing while the model is still producing the rest; every stage
//! checks `Turn::is_interrupted` before its next blocking call, and a
//! barge-in's `Turn::interrupt()` aborts the tasks directly so an
//! in-flight HTTP request doesn't need to poll anything to die.

use super::sentence::SentenceSplitter;
use super::tool_loop::{run_tool_loop, ToolLoopOutcome};
use super::turn::Turn;
use crate::audio::StreamPlayer;
use crate::llm::history::History;
use crate::llm::multi::LlmComposite;
use crate::llm::provider::ChatMessage;
use crate::orchestrator::state::SharedState;
use crate::persistence::Store;
use crate::tools::{ToolContext, ToolRegistry};
use crate::tts::TtsComposite;
use crate::types::State;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// Collaborators shared across every query pipeline run.
pub struct PipelineDeps {
    pub llm: Arc<LlmComposite>,
    pub tools: Arc<ToolRegistry>,
    pub persistence: Arc<Store>,
    pub tts: Arc<TtsComposite>,
    pub player: Arc<StreamPlayer>,
    pub history: Arc<Mutex<History>>,
    pub state: Arc<SharedState>,
    pub max_tokens: Option<u32>,
}

pub struct PipelineOutcome {
    pub interrupted: bool,
    pub spoke_anything: bool,
}

/// Spawns the pipeline as the turn's own worker and registers it so a
/// barge-in can abort it in one call.
pub fn spawn_query_pipeline(
    deps: Arc<PipelineDeps>,
    turn: Arc<Turn>,
    preferences: Option<serde_json::Value>,
) -> tokio::task::JoinHandle<PipelineOutcome> {
    let turn_for_registration = turn.clone();
    let handle = tokio::spawn(run_query_pipeline(deps, turn.clone(), preferences));
    turn_for_registration.register_task(&handle);
    handle
}

async fn run_query_pipeline(
    deps: Arc<PipelineDeps>,
    turn: Arc<Turn>,
    preferences: Option<serde_json::Value>,
) -> PipelineOutcome {
    let messages = {
        let mut history = deps.history.lock().unwrap();
        history.push(ChatMessage::user(turn.transcript.clone()));
        let capabilities: Vec<&str> = deps.tools.names();
        history.to_request(preferences.as_ref(), &capabilities)
    };

    let tool_context =
        ToolContext { persistence: deps.persistence.clone(), player: deps.player.clone(), speaker_id: turn.speaker_id.clone() };

    let (text_tx, text_rx) = mpsc::unbounded_channel::<String>();
    let (sentence_tx, sentence_rx) = mpsc::unbounded_channel::<String>();

    let splitter_handle = tokio::spawn(split_sentences(text_rx, sentence_tx));
    turn.register_task(&splitter_handle);

    let playback_handle = tokio::spawn(speak_sentences(deps.clone(), turn.clone(), sentence_rx));
    turn.register_task(&playback_handle);

    let tool_loop_result =
        run_tool_loop(&deps.llm, &deps.tools, &tool_context, messages, deps.max_tokens, text_tx).await;

    // `skipLLM` content never goes through the streaming channel (the
    // tool loop returns before sending anything), so it's spoken directly
    // here; the splitter/playback tasks still drain out on their own once
    // the loop drops its sender.
    let (assistant_text, is_error, skip_llm_spoken) = match tool_loop_result {
        Ok(ToolLoopOutcome::Final(content)) => (content, false, false),
        Ok(ToolLoopOutcome::SkipLlm(content)) => {
            let spoke = speak_one_off(&deps, &turn, &content).await;
            (content, false, spoke)
        }
        Err(e) => {
            warn!(error = %e, "query pipeline's LLM call failed");
            (String::new(), true, false)
        }
    };

    let _ = splitter_handle.await;
    let streamed_spoken = playback_handle.await.unwrap_or(false);
    let spoke_anything = streamed_spoken || skip_llm_spoken;

    if !assistant_text.is_empty() && !is_error {
        let mut history = deps.history.lock().unwrap();
        history.push(ChatMessage::assistant(assistant_text));
    }

    let interrupted = turn.is_interrupted();
    if is_error && !interrupted {
        deps.state.set(State::Idle);
    }

    PipelineOutcome { interrupted, spoke_anything }
}

async fn split_sentences(mut text_rx: mpsc::UnboundedReceiver<String>, sentence_tx: mpsc::UnboundedSender<String>) {
    let mut splitter = SentenceSplitter::new();
    while let Some(chunk) = text_rx.recv().await {
        for sentence in splitter.push(&chunk) {
            if sentence_tx.send(sentence).is_err() {
                return;
            }
        }
    }
    if let Some(rest) = splitter.flush() {
        let _ = sentence_tx.send(rest);
    }
}

/// Reads synthesized sentences as they arrive and plays them in order,
/// oscillating `Processing`/`Speaking` per chunk (spec §4.10 transition
/// table). Returns whether anything was actually spoken.
async fn speak_sentences(deps: Arc<PipelineDeps>, turn: Arc<Turn>, mut sentence_rx: mpsc::UnboundedReceiver<String>) -> bool {
    let mut spoke_anything = false;
    while let Some(sentence) = sentence_rx.recv().await {
        if turn.is_interrupted() {
            break;
        }
        if speak_one_off(&deps, &turn, &sentence).await {
            spoke_anything = true;
        }
        if turn.is_interrupted() {
            break;
        }
        deps.state.set(State::Processing);
    }
    spoke_anything
}

/// Synthesizes and plays one chunk of text, entering `Speaking` for its
/// rough duration. Returns `true` if anything was actually played.
async fn speak_one_off(deps: &Arc<PipelineDeps>, turn: &Arc<Turn>, text: &str) -> bool {
    if text.trim().is_empty() || turn.is_interrupted() {
        return false;
    }
    let (samples, rate) = match deps.tts.synthesize(text).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "sentence synthesis failed, skipping it");
            return false;
        }
    };
    if turn.is_interrupted() || samples.is_empty() {
        return false;
    }

    deps.state.set(State::Speaking);
    if let Err(e) = deps.player.play_samples(&samples, rate) {
        warn!(error = %e, "playback failed");
        return false;
    }

    let duration = std::time::Duration::from_secs_f64(samples.len() as f64 / rate.max(1) as f64);
    wait_roughly(duration, turn).await;
    true
}

/// Sleeps for roughly `duration`, polling `turn.is_interrupted()` every
/// 50ms so a barge-in cuts the wait short instead of finishing it out.
async fn wait_roughly(duration: std::time::Duration, turn: &Arc<Turn>) {
    const POLL: std::time::Duration = std::time::Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > std::time::Duration::ZERO {
        if turn.is_interrupted() {
            return;
        }
        let step = remaining.min(POLL);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
}
