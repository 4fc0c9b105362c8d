//! `read_rss` tool: fetches a configured feed and extracts item titles.
//!
//! No XML parser is in the dependency stack, so this uses the same
//! `regex` crate already pulled in for sentence splitting to pick out
//! `<title>` text — adequate for the well-formed feeds this tool is
//! pointed at, not a general-purpose RSS/Atom parser.

use super::http_client::{client, DEFAULT_TOOL_TIMEOUT};
use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Deserialize)]
struct Args {
    #[serde(default)]
    feed_url: Option<String>,
}

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<title>\s*(?:<!\[CDATA\[(.*?)\]\]>|(.*?))\s*</title>").unwrap())
}

fn extract_titles(body: &str) -> Vec<String> {
    title_pattern()
        .captures_iter(body)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        // the feed's own `<channel><title>` is almost always the first
        // match and isn't an item headline.
        .skip(1)
        .collect()
}

/// `default_feed_url` is used when the caller doesn't name one.
pub struct ReadRssTool {
    default_feed_url: String,
}

impl ReadRssTool {
    pub fn new(default_feed_url: impl Into<String>) -> Self {
        Self { default_feed_url: default_feed_url.into() }
    }
}

#[async_trait]
impl Tool for ReadRssTool {
    fn name(&self) -> &str {
        "read_rss"
    }

    fn description(&self) -> &str {
        "Reads item headlines from a configured RSS feed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"feed_url": {"type": "string", "description": "optional feed override"}},
        })
    }

    async fn execute(&self, _context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = if args_json.trim().is_empty() {
            Args { feed_url: None }
        } else {
            serde_json::from_str(args_json)
                .map_err(|e| CoreError::ToolExecution(format!("bad read_rss args: {e}")))?
        };
        let url = args.feed_url.as_deref().unwrap_or(&self.default_feed_url);

        let resp = client().get(url).timeout(DEFAULT_TOOL_TIMEOUT).send().await?;
        if !resp.status().is_success() {
            return Err(CoreError::from_http(resp.status().as_u16(), None, ""));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::ToolExecution(format!("failed to read feed body: {e}")))?;

        let titles = extract_titles(&body);
        if titles.is_empty() {
            return Ok(ToolOutcome::text("Feed had no items."));
        }
        Ok(ToolOutcome::text(titles.join("; ")))
    }
}
