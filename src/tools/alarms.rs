//! `set_alarm` tool: schedules an alarm the `persistence::reminders`
//! tick worker will later surface as a synthetic turn.

use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct Args {
    /// RFC3339 timestamp, e.g. "2026-08-02T07:30:00Z".
    fire_at: DateTime<Utc>,
    label: String,
    #[serde(default)]
    recurring: bool,
}

pub struct SetAlarmTool;

#[async_trait]
impl Tool for SetAlarmTool {
    fn name(&self) -> &str {
        "set_alarm"
    }

    fn description(&self) -> &str {
        "Schedules an alarm for a specific time, optionally recurring daily."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fire_at": {"type": "string", "description": "RFC3339 timestamp"},
                "label": {"type": "string"},
                "recurring": {"type": "boolean", "description": "repeat daily at this time"},
            },
            "required": ["fire_at", "label"],
        })
    }

    async fn execute(&self, context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = serde_json::from_str(args_json)
            .map_err(|e| CoreError::ToolExecution(format!("bad set_alarm args: {e}")))?;

        context
            .persistence
            .add_alarm(args.fire_at, &args.label, args.recurring)
            .map_err(|e| CoreError::ToolExecution(format!("failed to store alarm: {e}")))?;

        Ok(ToolOutcome::skip_llm(format!(
            "Alarm set for {}: {}.",
            args.fire_at.format("%Y-%m-%d %H:%M"),
            args.label
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Store;
    use std::sync::Arc;

    fn context() -> ToolContext {
        ToolContext {
            persistence: Arc::new(Store::open_in_memory().unwrap()),
            player: Arc::new(crate::audio::StreamPlayer::new(std::env::temp_dir()).unwrap()),
            speaker_id: None,
        }
    }

    #[tokio::test]
    async fn set_alarm_persists_and_skips_llm() {
        let ctx = context();
        let outcome = SetAlarmTool
            .execute(&ctx, r#"{"fire_at":"2026-08-02T07:30:00Z","label":"wake up","recurring":true}"#)
            .await
            .unwrap();
        assert!(outcome.skips_llm());
        let due = ctx
            .persistence
            .due_alarms(chrono::DateTime::parse_from_rfc3339("2026-08-02T08:00:00Z").unwrap().into())
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].label, "wake up");
    }

    #[tokio::test]
    async fn set_alarm_rejects_malformed_args() {
        let ctx = context();
        let result = SetAlarmTool.execute(&ctx, "{}").await;
        assert!(result.is_err());
    }
}
