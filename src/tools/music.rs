//! `play_music`/`resume_music` tools (spec §4.9): stream a track through
//! the shared `StreamPlayer`, tee-caching it, and record play history.
//! `resume_music` either seeks back into the player's barge-in snapshot
//! (restarting if it's stale, spec §4.10 barge-in step 3) or, given an
//! explicit track id, replays from a previously completed cache entry.

const RESUME_SNAPSHOT_MAX_AGE_SECS: f64 = 60.0;

use super::{Tool, ToolContext, ToolOutcome};
use crate::audio::PlaybackOptions;
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct PlayArgs {
    track_id: String,
    title: String,
    #[serde(default)]
    favorite: bool,
}

/// `stream_url_template` gets `{track_id}` substituted in, e.g.
/// `"https://music.example/api/stream/{track_id}"`.
pub struct PlayMusicTool {
    stream_url_template: String,
}

impl PlayMusicTool {
    pub fn new(stream_url_template: impl Into<String>) -> Self {
        Self { stream_url_template: stream_url_template.into() }
    }

    fn stream_url(&self, track_id: &str) -> String {
        self.stream_url_template.replace("{track_id}", track_id)
    }
}

#[async_trait]
impl Tool for PlayMusicTool {
    fn name(&self) -> &str {
        "play_music"
    }

    fn description(&self) -> &str {
        "Streams and plays a track by id, optionally saving it as a favorite."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "track_id": {"type": "string"},
                "title": {"type": "string"},
                "favorite": {"type": "boolean"},
            },
            "required": ["track_id", "title"],
        })
    }

    async fn execute(&self, context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: PlayArgs = serde_json::from_str(args_json)
            .map_err(|e| CoreError::ToolExecution(format!("bad play_music args: {e}")))?;

        let url = self.stream_url(&args.track_id);
        let options = PlaybackOptions { cache_key: Some(args.track_id.clone()), start_position_secs: 0.0 };
        context
            .player
            .play_url(&url, options)
            .await
            .map_err(|e| CoreError::ToolExecution(format!("failed to stream track: {e}")))?;

        context
            .persistence
            .record_music_played(&args.track_id)
            .map_err(|e| CoreError::ToolExecution(format!("failed to record play history: {e}")))?;
        if args.favorite {
            context
                .persistence
                .add_music_favorite(&args.track_id, &args.title)
                .map_err(|e| CoreError::ToolExecution(format!("failed to save favorite: {e}")))?;
        }

        Ok(ToolOutcome::skip_llm(format!("Playing {}.", args.title)))
    }
}

#[derive(Deserialize, Default)]
struct ResumeArgs {
    #[serde(default)]
    track_id: Option<String>,
}

/// `cache_dir` mirrors the `StreamPlayer`'s own cache directory so a
/// completed download can be replayed without re-streaming.
pub struct ResumeMusicTool {
    cache_dir: std::path::PathBuf,
}

impl ResumeMusicTool {
    pub fn new(cache_dir: std::path::PathBuf) -> Self {
        Self { cache_dir }
    }
}

#[async_trait]
impl Tool for ResumeMusicTool {
    fn name(&self) -> &str {
        "resume_music"
    }

    fn description(&self) -> &str {
        "Resumes the current track, or replays a previously cached one by id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"track_id": {"type": "string", "description": "optional; resumes current playback if omitted"}},
        })
    }

    async fn execute(&self, context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: ResumeArgs = if args_json.trim().is_empty() {
            ResumeArgs::default()
        } else {
            serde_json::from_str(args_json)
                .map_err(|e| CoreError::ToolExecution(format!("bad resume_music args: {e}")))?
        };

        let Some(track_id) = args.track_id else {
            return self.resume_from_snapshot(context);
        };

        let cached = crate::audio::cached_path(&self.cache_dir, &track_id);
        match cached {
            Some(path) => {
                context
                    .player
                    .play_from_file(&path, 0.0)
                    .map_err(|e| CoreError::ToolExecution(format!("failed to replay cached track: {e}")))?;
                context.player.set_now_playing_track(Some(track_id));
                Ok(ToolOutcome::skip_llm("Resuming from where you left off."))
            }
            None => Err(CoreError::ToolExecution(format!("no cached audio for track {track_id}"))),
        }
    }
}

impl ResumeMusicTool {
    /// No explicit track id: resumes from the barge-in snapshot left by
    /// `StreamPlayer::snapshot_and_stop_music`, seeking back into the
    /// cached file if it's been under a minute, else restarting it from
    /// the top; falls back to a plain sink un-pause if there's no
    /// snapshot or cache entry to seek into.
    fn resume_from_snapshot(&self, context: &ToolContext) -> Result<ToolOutcome, CoreError> {
        let Some(snapshot) = context.player.take_paused_music() else {
            context.player.resume();
            return Ok(ToolOutcome::skip_llm("Resuming."));
        };

        let Some(path) = crate::audio::cached_path(&self.cache_dir, &snapshot.track_id) else {
            context.player.resume();
            return Ok(ToolOutcome::skip_llm("Resuming."));
        };

        let elapsed = snapshot.paused_at.elapsed().as_secs_f64();
        let seek_position = if elapsed <= RESUME_SNAPSHOT_MAX_AGE_SECS { snapshot.position_secs } else { 0.0 };
        context
            .player
            .play_from_file(&path, seek_position)
            .map_err(|e| CoreError::ToolExecution(format!("failed to resume cached track: {e}")))?;
        context.player.set_now_playing_track(Some(snapshot.track_id));
        Ok(ToolOutcome::skip_llm("Resuming from where you left off."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Store;
    use std::sync::Arc;

    fn context(cache_dir: std::path::PathBuf) -> ToolContext {
        ToolContext {
            persistence: Arc::new(Store::open_in_memory().unwrap()),
            player: Arc::new(crate::audio::StreamPlayer::new(cache_dir).unwrap()),
            speaker_id: None,
        }
    }

    #[test]
    fn stream_url_substitutes_track_id() {
        let tool = PlayMusicTool::new("https://music.example/api/stream/{track_id}");
        assert_eq!(tool.stream_url("abc123"), "https://music.example/api/stream/abc123");
    }

    #[tokio::test]
    async fn resume_without_track_id_resumes_current_sink() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());
        let tool = ResumeMusicTool::new(dir.path().to_path_buf());
        let outcome = tool.execute(&ctx, "{}").await.unwrap();
        assert!(outcome.skips_llm());
    }

    #[tokio::test]
    async fn resume_falls_back_to_plain_resume_when_snapshot_has_no_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());
        let tool = ResumeMusicTool::new(dir.path().to_path_buf());

        ctx.player.inject_paused_music_for_test(crate::audio::PausedMusicSnapshot {
            track_id: "never-cached".into(),
            position_secs: 12.5,
            paused_at: std::time::Instant::now(),
        });

        let outcome = tool.execute(&ctx, "{}").await.unwrap();
        assert!(outcome.skips_llm());
        // the snapshot was consumed even though it couldn't be used
        assert!(ctx.player.take_paused_music().is_none());
    }

    #[tokio::test]
    async fn resume_with_unknown_track_id_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());
        let tool = ResumeMusicTool::new(dir.path().to_path_buf());
        let result = tool.execute(&ctx, r#"{"track_id":"missing"}"#).await;
        assert!(result.is_err());
    }
}
