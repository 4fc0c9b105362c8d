//! `get_news` tool: top headlines from a configured HTTP news API,
//! returned as plain text for the LLM to summarize conversationally.

use super::http_client::{client, DEFAULT_TOOL_TIMEOUT};
use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize, Default)]
struct Args {
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Deserialize)]
struct NewsResponse {
    headlines: Vec<String>,
}

pub struct GetNewsTool {
    base_url: String,
    api_key: Option<String>,
}

impl GetNewsTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { base_url: base_url.into(), api_key }
    }
}

#[async_trait]
impl Tool for GetNewsTool {
    fn name(&self) -> &str {
        "get_news"
    }

    fn description(&self) -> &str {
        "Fetches recent headlines, optionally filtered to a topic."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"topic": {"type": "string", "description": "optional topic filter"}},
        })
    }

    async fn execute(&self, _context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = if args_json.trim().is_empty() {
            Args::default()
        } else {
            serde_json::from_str(args_json)
                .map_err(|e| CoreError::ToolExecution(format!("bad get_news args: {e}")))?
        };

        let mut req = client().get(&self.base_url).timeout(DEFAULT_TOOL_TIMEOUT);
        if let Some(topic) = &args.topic {
            req = req.query(&[("topic", topic)]);
        }
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key)]);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(CoreError::from_http(resp.status().as_u16(), None, ""));
        }
        let body: NewsResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::ToolExecution(format!("bad news response: {e}")))?;

        if body.headlines.is_empty() {
            return Ok(ToolOutcome::text("No headlines found."));
        }
        Ok(ToolOutcome::text(body.headlines.join("; ")))
    }
}
