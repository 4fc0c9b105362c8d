//! `control_device` tool: sends a command to a configured home
//! automation HTTP bridge (e.g. Home Assistant's REST API).

use super::http_client::{client, DEFAULT_TOOL_TIMEOUT};
use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct Args {
    device: String,
    action: String,
}

/// `base_url` is the bridge's command endpoint; requests are posted as
/// `{"device": ..., "action": ...}`.
pub struct ControlDeviceTool {
    base_url: String,
    token: Option<String>,
}

impl ControlDeviceTool {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self { base_url: base_url.into(), token }
    }
}

#[async_trait]
impl Tool for ControlDeviceTool {
    fn name(&self) -> &str {
        "control_device"
    }

    fn description(&self) -> &str {
        "Sends an on/off/adjust command to a named home automation device."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "device": {"type": "string"},
                "action": {"type": "string", "description": "e.g. \"on\", \"off\", \"dim 50%\""},
            },
            "required": ["device", "action"],
        })
    }

    async fn execute(&self, _context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = serde_json::from_str(args_json)
            .map_err(|e| CoreError::ToolExecution(format!("bad control_device args: {e}")))?;

        let mut req = client()
            .post(&self.base_url)
            .timeout(DEFAULT_TOOL_TIMEOUT)
            .json(&serde_json::json!({"device": args.device, "action": args.action}));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(CoreError::from_http(resp.status().as_u16(), None, ""));
        }

        Ok(ToolOutcome::skip_llm(format!("{}: {}.", args.device, args.action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_device_and_action() {
        let tool = ControlDeviceTool::new("https://example.invalid/command", None);
        let schema = tool.parameters_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["device", "action"]);
    }
}
