//! Per-frame dispatcher (spec §4.10 "Per-frame dispatcher"): the sole
//! writer of orchestrator `State`. Routes every captured frame to the
//! right leaf components for the current state, and — critically —
//! keeps feeding the wake detector during `Processing`/`Speaking`, not
//! just `Idle`/`Listening`. Treating those states as deaf to the wake
//! word is the bug this design must not reintroduce: it would open a
//! window, for the whole network-latency duration of a reply, during
//! which the user cannot interrupt.

use super::pipeline::{spawn_query_pipeline, PipelineDeps};
use super::turn::Turn;
use crate::asr::fallback::AsrFallback;
use crate::audio::StreamPlayer;
use crate::config::DialogConfig;
use crate::orchestrator::state::SharedState;
use crate::persistence::reminders::ReminderEvent;
use crate::speaker::{Gallery, SpeakerEmbedder};
use crate::tts::TtsComposite;
use crate::types::{Frame, State};
use crate::vad::Vad;
use crate::wake::WakeDetector;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub struct Dispatcher {
    state: Arc<SharedState>,
    wake: Mutex<WakeDetector>,
    vad: Mutex<Vad>,
    asr: Arc<AsrFallback>,
    speaker: Arc<SpeakerEmbedder>,
    gallery: Arc<Gallery>,
    player: Arc<StreamPlayer>,
    tts: Arc<TtsComposite>,
    dialog: DialogConfig,
    pipeline_deps: Arc<PipelineDeps>,
    current_turn: Mutex<Option<Arc<Turn>>>,
    speaker_buffer: Mutex<Vec<f32>>,
    listening_deadline: Mutex<Option<Instant>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SharedState>,
        wake: WakeDetector,
        vad: Vad,
        asr: Arc<AsrFallback>,
        speaker: Arc<SpeakerEmbedder>,
        gallery: Arc<Gallery>,
        player: Arc<StreamPlayer>,
        tts: Arc<TtsComposite>,
        dialog: DialogConfig,
        pipeline_deps: Arc<PipelineDeps>,
    ) -> Self {
        Self {
            state,
            wake: Mutex::new(wake),
            vad: Mutex::new(vad),
            asr,
            speaker,
            gallery,
            player,
            tts,
            dialog,
            pipeline_deps,
            current_turn: Mutex::new(None),
            speaker_buffer: Mutex::new(Vec::new()),
            listening_deadline: Mutex::new(None),
        }
    }

    /// Drives the dispatcher until the frame channel closes. Takes
    /// `Arc<Self>` so its frame and query-pipeline continuations can
    /// clone a handle back to the dispatcher itself.
    pub async fn run(
        self: Arc<Self>,
        mut frames: broadcast::Receiver<Frame>,
        mut reminders: mpsc::UnboundedReceiver<ReminderEvent>,
    ) {
        loop {
            tokio::select! {
                frame = frames.recv() => {
                    match frame {
                        Ok(frame) => self.handle_frame(&frame).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "frame receiver lagged, dropping frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(event) = reminders.recv() => {
                    self.handle_reminder(event).await;
                }
            }
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: &Frame) {
        match self.state.get() {
            State::Idle => self.feed_wake_from_idle(frame).await,
            State::Listening => self.handle_listening_frame(frame).await,
            State::Processing | State::Speaking => self.feed_wake_during_reply(frame).await,
        }
    }

    async fn feed_wake_from_idle(self: &Arc<Self>, frame: &Frame) {
        if !self.feed_wake(frame) {
            return;
        }
        info!("wake word detected from idle");

        self.speak_reply(&self.dialog.wake_reply).await;
        tokio::time::sleep(Duration::from_millis(self.dialog.listen_delay_ms)).await;
        self.enter_listening(None);
    }

    async fn feed_wake_during_reply(self: &Arc<Self>, frame: &Frame) {
        if !self.feed_wake(frame) {
            return;
        }
        info!("wake word detected mid-reply, barging in");

        let interrupted_turn = self.current_turn.lock().unwrap().take();
        if let Some(turn) = &interrupted_turn {
            turn.interrupt();
        }
        if self.player.is_playing_music() {
            self.player.snapshot_and_stop_music();
        } else if self.player.is_playing() {
            self.player.stop();
        }

        self.speak_reply(&self.dialog.interrupt_reply).await;
        tokio::time::sleep(Duration::from_millis(self.dialog.listen_delay_ms)).await;
        self.enter_listening(None);
    }

    /// Feeds one frame to the wake detector, resetting it and reporting
    /// `true` exactly once per detection.
    fn feed_wake(&self, frame: &Frame) -> bool {
        let mut wake = self.wake.lock().unwrap();
        wake.feed(frame);
        if wake.detected() {
            wake.reset();
            true
        } else {
            false
        }
    }

    fn enter_listening(&self, deadline: Option<Instant>) {
        self.vad.lock().unwrap().reset();
        self.asr.reset();
        self.speaker_buffer.lock().unwrap().clear();
        *self.listening_deadline.lock().unwrap() = deadline;
        self.state.set(State::Listening);
    }

    async fn handle_listening_frame(self: &Arc<Self>, frame: &Frame) {
        {
            let mut vad = self.vad.lock().unwrap();
            vad.feed(frame);
        }
        self.asr.feed(frame.samples()).await;
        self.speaker_buffer.lock().unwrap().extend_from_slice(frame.samples());

        let vad_segment = self.vad.lock().unwrap().next_segment();
        let asr_endpoint = self.asr.is_endpoint();

        if vad_segment.is_some() || asr_endpoint {
            self.finalize_listening().await;
            return;
        }

        let elapsed = self.listening_deadline.lock().unwrap().map(|d| Instant::now() >= d).unwrap_or(false);
        if elapsed {
            info!("continuous listening window elapsed with no speech, returning to idle");
            *self.listening_deadline.lock().unwrap() = None;
            self.state.set(State::Idle);
        }
    }

    async fn finalize_listening(self: &Arc<Self>) {
        let transcript = self.asr.get_result().await;
        self.reset_listening_state();

        if transcript.trim().is_empty() {
            info!("empty transcript at end of listening, returning to idle");
            self.state.set(State::Idle);
            return;
        }

        let speaker_id = {
            let buf = self.speaker_buffer.lock().unwrap();
            self.speaker.extract(&buf).and_then(|embedding| self.gallery.search(&embedding, 0.6))
        };

        let turn = Arc::new(Turn::new(transcript, speaker_id));
        *self.current_turn.lock().unwrap() = Some(turn.clone());
        self.state.set(State::Processing);
        self.run_turn_to_completion(turn, true);
    }

    async fn handle_reminder(self: &Arc<Self>, event: ReminderEvent) {
        if self.state.get() != State::Idle {
            // Reminders don't interrupt an active conversation; a still-due
            // alarm will simply be picked up again on the tick worker's
            // next pass.
            return;
        }
        info!(transcript = %event.transcript, "reminder fired, starting a synthetic turn");
        let turn = Arc::new(Turn::new(event.transcript, None));
        *self.current_turn.lock().unwrap() = Some(turn.clone());
        self.state.set(State::Processing);
        self.run_turn_to_completion(turn, false);
    }

    /// Spawns the query pipeline for `turn` and, once it finishes without
    /// having been interrupted, either re-arms a continuous-listening
    /// window (spec §4.10: "schedule `continuousTimeout` window in
    /// Listening") or returns to idle.
    fn run_turn_to_completion(self: &Arc<Self>, turn: Arc<Turn>, allow_continuous_listening: bool) {
        let dispatcher = self.clone();
        let handle = spawn_query_pipeline(self.pipeline_deps.clone(), turn, None);
        tokio::spawn(async move {
            let outcome = handle.await;
            dispatcher.current_turn.lock().unwrap().take();
            match outcome {
                Ok(outcome) if !outcome.interrupted => {
                    if allow_continuous_listening {
                        let deadline = Instant::now() + Duration::from_secs(dispatcher.dialog.continuous_timeout_secs);
                        dispatcher.enter_listening(Some(deadline));
                    } else {
                        dispatcher.state.set(State::Idle);
                    }
                }
                Ok(_) => {} // interrupted: the barge-in path already set Listening
                Err(e) => {
                    warn!(error = ?e, "query pipeline task panicked");
                    dispatcher.state.set(State::Idle);
                }
            }
        });
    }

    fn reset_listening_state(&self) {
        self.vad.lock().unwrap().reset();
        self.asr.reset();
        self.speaker_buffer.lock().unwrap().clear();
    }

    async fn speak_reply(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        match self.tts.synthesize(text).await {
            Ok((samples, rate)) if !samples.is_empty() => {
                self.state.set(State::Speaking);
                let _ = self.player.play_samples(&samples, rate);
                let duration = Duration::from_secs_f64(samples.len() as f64 / rate.max(1) as f64);
                tokio::time::sleep(duration).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to synthesize a fixed reply"),
        }
    }
}
