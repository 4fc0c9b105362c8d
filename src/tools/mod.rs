//! Tool registry (spec §4.7): named, JSON-schema-described side-effectful
//! actions invoked by the LLM. `execute` returns either plain text
//! (consumed by the LLM on the next round) or a structured envelope
//! marked `skip_llm: true` which the orchestrator speaks directly.
//!
//! Grounded on the teacher's `agent/tools.rs::{Tool, ToolContext,
//! ToolResult}` shapes, trimmed of the teacher's approval/sandbox gates
//! since every tool here is a fixed, pre-declared action rather than an
//! LLM-chosen filesystem/shell operation.

pub mod alarms;
pub mod home_automation;
pub mod http_client;
pub mod memos;
pub mod music;
pub mod news;
pub mod rss;
pub mod story;
pub mod time;
pub mod weather;

use crate::error::CoreError;
use crate::llm::provider::{FunctionDefinition, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared collaborators a tool's `execute` may need: persistence,
/// the stream player (for music), and the active speaker's id.
#[derive(Clone)]
pub struct ToolContext {
    pub persistence: Arc<crate::persistence::Store>,
    pub player: Arc<crate::audio::StreamPlayer>,
    pub speaker_id: Option<String>,
}

/// What a tool's `execute` call produced (spec §4.7).
pub enum ToolOutcome {
    /// Plain text fed back to the LLM on the next round.
    Text(String),
    /// Spoken directly by the orchestrator; exits the tool loop.
    Structured { content: String, skip_llm: bool },
}

impl ToolOutcome {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutcome::Text(s.into())
    }

    pub fn skip_llm(content: impl Into<String>) -> Self {
        ToolOutcome::Structured { content: content.into(), skip_llm: true }
    }

    /// Parses a tool's raw JSON return, per §9's open-question
    /// resolution: text that fails to parse as the `{content,
    /// skipLLM}` envelope is treated as a raw string, not an error.
    pub fn from_raw(raw: &str) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            content: String,
            #[serde(default, rename = "skipLLM")]
            skip_llm: bool,
        }
        match serde_json::from_str::<Envelope>(raw) {
            Ok(env) => ToolOutcome::Structured { content: env.content, skip_llm: env.skip_llm },
            Err(_) => ToolOutcome::Text(raw.to_string()),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ToolOutcome::Text(s) => s,
            ToolOutcome::Structured { content, .. } => content,
        }
    }

    pub fn skips_llm(&self) -> bool {
        matches!(self, ToolOutcome::Structured { skip_llm: true, .. })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    async fn execute(&self, context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError>;
}

/// Named set of tools offered to the LLM each round (spec §4.7).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Builds the JSON-schema tool catalog sent with every LLM request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
            Ok(ToolOutcome::text(args_json.to_string()))
        }
    }

    #[test]
    fn registry_lists_registered_tool_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function.name, "echo");
    }

    #[test]
    fn outcome_from_raw_parses_envelope() {
        let outcome = ToolOutcome::from_raw(r#"{"content":"it's sunny","skipLLM":true}"#);
        assert!(outcome.skips_llm());
        assert_eq!(outcome.content(), "it's sunny");
    }

    #[test]
    fn outcome_from_raw_falls_back_to_plain_text() {
        let outcome = ToolOutcome::from_raw("not json");
        assert!(!outcome.skips_llm());
        assert_eq!(outcome.content(), "not json");
    }
}
