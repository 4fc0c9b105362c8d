//! `get_weather` tool: current conditions for a named location, fetched
//! from a configured HTTP weather API and handed back as plain text for
//! the LLM to phrase (spec §4.7's default envelope, since a bare
//! forecast reads stiffer than the assistant's usual voice).
//!
//! Grounded on the teacher's `tools/web.rs` client-construction idiom,
//! narrowed to one fixed endpoint instead of an LLM-chosen URL.

use super::http_client::{client, DEFAULT_TOOL_TIMEOUT};
use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct Args {
    location: String,
}

/// `base_url` must accept a `?location=` query parameter and answer with
/// `{"summary": "...", "temperature_c": ...}`.
pub struct GetWeatherTool {
    base_url: String,
    api_key: Option<String>,
}

impl GetWeatherTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self { base_url: base_url.into(), api_key }
    }
}

#[derive(Deserialize)]
struct WeatherResponse {
    summary: String,
    temperature_c: f64,
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Looks up the current weather conditions for a named location."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"location": {"type": "string", "description": "city or place name"}},
            "required": ["location"],
        })
    }

    async fn execute(&self, _context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = serde_json::from_str(args_json)
            .map_err(|e| CoreError::ToolExecution(format!("bad get_weather args: {e}")))?;

        let mut req = client()
            .get(&self.base_url)
            .timeout(DEFAULT_TOOL_TIMEOUT)
            .query(&[("location", &args.location)]);
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key)]);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(CoreError::from_http(resp.status().as_u16(), None, ""));
        }
        let body: WeatherResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::ToolExecution(format!("bad weather response: {e}")))?;

        Ok(ToolOutcome::text(format!(
            "Weather in {}: {}, {:.0}\u{00b0}C.",
            args.location, body.summary, body.temperature_c
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_location_argument() {
        let args: Args = serde_json::from_str(r#"{"location":"Shanghai"}"#).unwrap();
        assert_eq!(args.location, "Shanghai");
    }

    #[test]
    fn schema_requires_location() {
        let tool = GetWeatherTool::new("https://example.invalid/weather", None);
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"][0], "location");
    }
}
