//! `add_memo` tool: appends a free-text note to the persisted memo list.

use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct Args {
    text: String,
}

pub struct AddMemoTool;

#[async_trait]
impl Tool for AddMemoTool {
    fn name(&self) -> &str {
        "add_memo"
    }

    fn description(&self) -> &str {
        "Saves a short note for later recall."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"],
        })
    }

    async fn execute(&self, context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = serde_json::from_str(args_json)
            .map_err(|e| CoreError::ToolExecution(format!("bad add_memo args: {e}")))?;

        context
            .persistence
            .add_memo(&args.text)
            .map_err(|e| CoreError::ToolExecution(format!("failed to store memo: {e}")))?;

        Ok(ToolOutcome::skip_llm("Noted."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Store;
    use std::sync::Arc;

    #[tokio::test]
    async fn add_memo_persists_text() {
        let ctx = ToolContext {
            persistence: Arc::new(Store::open_in_memory().unwrap()),
            player: Arc::new(crate::audio::StreamPlayer::new(std::env::temp_dir()).unwrap()),
            speaker_id: None,
        };
        let outcome = AddMemoTool.execute(&ctx, r#"{"text":"buy milk"}"#).await.unwrap();
        assert!(outcome.skips_llm());
        let memos = ctx.persistence.list_memos().unwrap();
        assert_eq!(memos.len(), 1);
        assert_eq!(memos[0].text, "buy milk");
    }
}
