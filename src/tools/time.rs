//! `get_time` tool: current wall-clock time, spoken directly (no LLM
//! round-trip needed for a fact this cheap).

use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use chrono::Local;

pub struct GetTimeTool;

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Returns the current local date and time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _context: &ToolContext, _args_json: &str) -> Result<ToolOutcome, CoreError> {
        let now = Local::now();
        Ok(ToolOutcome::skip_llm(now.format("It's %A, %B %e at %H:%M.").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_time_skips_llm_and_mentions_a_colon() {
        let store = std::sync::Arc::new(crate::persistence::Store::open_in_memory().unwrap());
        let player = std::sync::Arc::new(crate::audio::StreamPlayer::new(std::env::temp_dir()).unwrap());
        let context = ToolContext { persistence: store, player, speaker_id: None };
        let outcome = GetTimeTool.execute(&context, "{}").await.unwrap();
        assert!(outcome.skips_llm());
        assert!(outcome.content().contains(':'));
    }
}
