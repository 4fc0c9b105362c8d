//! The orchestrator (spec §4.10): the four-state machine, per-frame
//! dispatch, the query pipeline, the tool-calling loop, and the
//! sentence-boundary splitter that ties LLM streaming to sentence-level
//! TTS playback.

pub mod dispatcher;
pub mod pipeline;
pub mod sentence;
pub mod state;
pub mod tool_loop;
pub mod turn;

use crate::audio::{AudioCapture, StreamPlayer};
use crate::asr::fallback::AsrFallback;
use crate::config::Config;
use crate::llm::history::History;
use crate::llm::multi::LlmComposite;
use crate::persistence::reminders::ReminderTick;
use crate::persistence::Store;
use crate::speaker::{Gallery, SpeakerEmbedder};
use crate::tools::ToolRegistry;
use crate::tts::TtsComposite;
use crate::types::State;
use crate::vad::Vad;
use crate::wake::WakeDetector;
use dispatcher::Dispatcher;
use pipeline::PipelineDeps;
use state::SharedState;
use std::sync::{Arc, Mutex};

/// Everything the orchestrator needs, already constructed by the
/// caller (`cli`/`main`), wired together and run to completion.
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
    capture: Arc<AudioCapture>,
    store: Arc<Store>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        capture: Arc<AudioCapture>,
        wake: WakeDetector,
        speaker: Arc<SpeakerEmbedder>,
        gallery: Arc<Gallery>,
        asr: Arc<AsrFallback>,
        llm: Arc<LlmComposite>,
        tools: Arc<ToolRegistry>,
        tts: Arc<TtsComposite>,
        player: Arc<StreamPlayer>,
        store: Arc<Store>,
    ) -> Self {
        let vad = Vad::new(&config.vad, config.audio.sample_rate, config.audio.frame_size);
        let (state, _rx) = SharedState::new(State::Idle);
        let state = Arc::new(state);

        let pipeline_deps = Arc::new(PipelineDeps {
            llm,
            tools,
            persistence: store.clone(),
            tts: tts.clone(),
            player: player.clone(),
            history: Arc::new(Mutex::new(History::new(config.llm.max_history))),
            state: state.clone(),
            max_tokens: Some(config.llm.max_tokens),
        });

        let dispatcher = Arc::new(Dispatcher::new(
            state,
            wake,
            vad,
            asr,
            speaker,
            gallery,
            player,
            tts,
            config.dialog.clone(),
            pipeline_deps,
        ));

        Self { dispatcher, capture, store }
    }

    /// Starts audio capture, the reminder tick worker, and the
    /// dispatcher loop; runs until capture's frame channel closes.
    pub async fn run(self) -> anyhow::Result<()> {
        let frames = self.capture.subscribe();
        let _audio_stream = self.capture.start()?;

        let (reminder_tx, reminder_rx) = tokio::sync::mpsc::unbounded_channel();
        let reminder_handle = ReminderTick::new(self.store.clone(), reminder_tx).spawn();

        self.dispatcher.run(frames, reminder_rx).await;

        reminder_handle.abort();
        Ok(())
    }
}
