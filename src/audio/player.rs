//! Stream player (spec §4.9): PCM playback of TTS output and streamed
//! playback of music URLs, with a tee-write+atomic-rename cache and
//! pause/resume/position tracking so interrupted music can resume.
//!
//! Grounded on the teacher's `AudioOutput` (rodio sink construction) with
//! a `reqwest` streaming decode path added for `play_url`.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct PlaybackOptions {
    pub cache_key: Option<String>,
    pub start_position_secs: f64,
}

struct PlaybackState {
    /// Wall-clock instant the current segment started, used to derive
    /// `position()` without polling the sink on every call.
    started_at: Option<Instant>,
    base_position_secs: f64,
}

/// Snapshot of paused music taken on barge-in (spec §4.10 barge-in step
/// 3), so a later `resume_music` call with no track id can seek back
/// into the cached file rather than just restarting.
#[derive(Debug, Clone)]
pub struct PausedMusicSnapshot {
    pub track_id: String,
    pub position_secs: f64,
    pub paused_at: Instant,
}

/// Speaker output. `_stream` must stay alive for the duration of the
/// sink's life; dropping it silences output. `sink` is `None` when no
/// audio device was available at construction time (headless hosts,
/// CI, tests) — playback calls become silent no-ops instead of erroring
/// so the rest of the orchestrator doesn't need a separate "no speaker"
/// code path.
pub struct StreamPlayer {
    sink: Option<Arc<rodio::Sink>>,
    _stream: Option<rodio::OutputStream>,
    cache_dir: PathBuf,
    state: std::sync::Mutex<PlaybackState>,
    position_floor_secs: AtomicU64,
    /// Track id of whatever music is currently queued, if any. `None`
    /// while a TTS reply is playing, which is how `is_playing_music`
    /// tells the two apart on the same sink.
    now_playing_track_id: std::sync::Mutex<Option<String>>,
    paused_music: std::sync::Mutex<Option<PausedMusicSnapshot>>,
}

impl StreamPlayer {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir).context("failed to create player cache dir")?;
        let (stream, sink) = match rodio::OutputStream::try_default() {
            Ok((stream, handle)) => match rodio::Sink::try_new(&handle) {
                Ok(sink) => (Some(stream), Some(Arc::new(sink))),
                Err(e) => {
                    warn!("failed to create audio sink, running with playback disabled: {e}");
                    (None, None)
                }
            },
            Err(e) => {
                warn!("no audio output device available, running with playback disabled: {e}");
                (None, None)
            }
        };
        Ok(Self {
            sink,
            _stream: stream,
            cache_dir,
            state: std::sync::Mutex::new(PlaybackState {
                started_at: None,
                base_position_secs: 0.0,
            }),
            position_floor_secs: AtomicU64::new(0),
            now_playing_track_id: std::sync::Mutex::new(None),
            paused_music: std::sync::Mutex::new(None),
        })
    }

    /// Plays a single float32 mono buffer (one TTS sentence chunk). Never
    /// music, so this always clears `now_playing_track_id`.
    pub fn play_samples(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        *self.now_playing_track_id.lock().unwrap() = None;
        if samples.is_empty() {
            return Ok(());
        }
        let Some(sink) = &self.sink else { return Ok(()) };
        let source = rodio::buffer::SamplesBuffer::new(1, sample_rate, samples.to_vec());
        sink.append(source);
        self.mark_started(0.0);
        Ok(())
    }

    /// Streams a compressed audio URL, decoding and playing it. If
    /// `options.cache_key` is set, tee-writes the compressed bytes to a
    /// temp file and atomically renames it to the cache path on
    /// completion (spec §4.9).
    pub async fn play_url(&self, url: &str, options: PlaybackOptions) -> Result<()> {
        let client = reqwest::Client::new();
        let resp = client
            .get(url)
            .send()
            .await
            .context("music stream request failed")?;
        let mut stream = resp.bytes_stream();

        let cache_target = options
            .cache_key
            .as_ref()
            .map(|key| self.cache_dir.join(format!("{key}.cache")));
        let tmp_path = cache_target
            .as_ref()
            .map(|p| p.with_extension("cache.tmp"));
        let mut tmp_file = match &tmp_path {
            Some(p) => Some(std::fs::File::create(p).context("failed to open cache tmp file")?),
            None => None,
        };

        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("music stream read failed")?;
            if let Some(f) = tmp_file.as_mut() {
                f.write_all(&chunk).context("failed to tee-write cache bytes")?;
            }
            buf.extend_from_slice(&chunk);
        }

        if let (Some(tmp), Some(target)) = (&tmp_path, &cache_target) {
            std::fs::rename(tmp, target).context("failed to atomically finalize cache file")?;
            info!(cache_key = ?options.cache_key, "music cached");
        }

        let cursor = std::io::Cursor::new(buf);
        let decoder = rodio::Decoder::new(cursor).context("failed to decode music stream")?;
        if let Some(sink) = &self.sink {
            sink.append(decoder);
        }
        *self.now_playing_track_id.lock().unwrap() = options.cache_key;
        self.mark_started(options.start_position_secs);
        Ok(())
    }

    /// Resumes playback from a previously-cached file at `start_position_secs`.
    /// Does not itself mark `now_playing_track_id`; callers resuming a
    /// specific track should call `set_now_playing_track` after this
    /// succeeds.
    pub fn play_from_file(&self, path: &Path, start_position_secs: f64) -> Result<()> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open cached file {path:?}"))?;
        let decoder = rodio::Decoder::new(std::io::BufReader::new(file))
            .context("failed to decode cached file")?;
        if let Some(sink) = &self.sink {
            sink.append(decoder);
        }
        self.mark_started(start_position_secs);
        Ok(())
    }

    pub fn set_now_playing_track(&self, track_id: Option<String>) {
        *self.now_playing_track_id.lock().unwrap() = track_id;
    }

    /// True only while the currently-queued audio is music, not a TTS
    /// reply (spec §4.10 barge-in step 3: "if music was playing (not
    /// TTS)"). Distinguishes the two even though both route through the
    /// same sink.
    pub fn is_playing_music(&self) -> bool {
        self.now_playing_track_id.lock().unwrap().is_some() && self.is_playing()
    }

    /// Barge-in helper: captures a resumable snapshot of the currently
    /// playing track and stops the sink so the interrupt reply can play
    /// cleanly. No-op (returns `None`) if nothing playable is music.
    pub fn snapshot_and_stop_music(&self) -> Option<PausedMusicSnapshot> {
        let track_id = self.now_playing_track_id.lock().unwrap().clone()?;
        let snapshot = PausedMusicSnapshot {
            track_id,
            position_secs: self.position(),
            paused_at: Instant::now(),
        };
        self.stop();
        *self.paused_music.lock().unwrap() = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Takes (consumes) the paused-music snapshot left by the last
    /// barge-in, if any.
    pub fn take_paused_music(&self) -> Option<PausedMusicSnapshot> {
        self.paused_music.lock().unwrap().take()
    }

    /// Test seam: headless test runs have no sink, so `is_playing_music`
    /// can never observe a real barge-in; this injects a snapshot
    /// directly so `resume_music`'s elapsed-time branching is testable.
    #[cfg(test)]
    pub fn inject_paused_music_for_test(&self, snapshot: PausedMusicSnapshot) {
        *self.paused_music.lock().unwrap() = Some(snapshot);
    }

    /// Stops output but retains `position()` so callers can resume later.
    pub fn pause(&self) {
        self.freeze_position();
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.started_at = Some(Instant::now());
        drop(state);
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    /// Clears the queue and resets `position()` to zero.
    pub fn stop(&self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        let mut state = self.state.lock().unwrap();
        state.started_at = None;
        state.base_position_secs = 0.0;
        self.position_floor_secs.store(0, Ordering::SeqCst);
        *self.now_playing_track_id.lock().unwrap() = None;
    }

    pub fn position(&self) -> f64 {
        let state = self.state.lock().unwrap();
        match state.started_at {
            Some(t) => state.base_position_secs + t.elapsed().as_secs_f64(),
            None => state.base_position_secs,
        }
    }

    pub fn is_playing(&self) -> bool {
        match &self.sink {
            Some(sink) => !sink.empty() && !sink.is_paused(),
            None => false,
        }
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume.clamp(0.0, 1.0));
        }
    }

    fn mark_started(&self, base_position_secs: f64) {
        let mut state = self.state.lock().unwrap();
        state.base_position_secs = base_position_secs;
        state.started_at = Some(Instant::now());
    }

    fn freeze_position(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(t) = state.started_at.take() {
            state.base_position_secs += t.elapsed().as_secs_f64();
        }
    }
}

/// Cached path for a given cache key, if a completed download exists.
pub fn cached_path(cache_dir: &Path, cache_key: &str) -> Option<PathBuf> {
    let p = cache_dir.join(format!("{cache_key}.cache"));
    if p.exists() {
        Some(p)
    } else {
        None
    }
}
