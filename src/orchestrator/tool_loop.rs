//! Tool-calling round trip (spec §4.7): sends the running message
//! history plus the tool catalog to the LLM, executes whatever tool
//! calls come back, feeds results to the next round, and repeats up to
//! a fixed cap. A `skipLLM` tool result short-circuits the loop and is
//! spoken verbatim instead of being handed back to the model.
//!
//! Grounded on this file's own prior ReAct shape (`run_tool_loop`'s
//! iterate-until-no-tool-calls structure and its
//! `MAX_CONSECUTIVE_DUPES` repeated-call guard, kept here as a by-key
//! duplicate-call skip), rebuilt on `llm::multi::LlmComposite` and
//! `tools::ToolRegistry` instead of the now-removed `agent::llm`
//! client and `agent::tools` registry.

use crate::error::CoreError;
use crate::llm::multi::LlmComposite;
use crate::llm::provider::ChatMessage;
use crate::tools::{ToolContext, ToolOutcome, ToolRegistry};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::warn;

/// Cap on tool-calling round trips per query (spec §4.7).
pub const MAX_TOOL_ROUNDS: usize = 3;

pub enum ToolLoopOutcome {
    /// Plain model text, already streamed sentence-by-sentence to `text_tx`.
    Final(String),
    /// A tool's `skipLLM` result, to be spoken directly without further
    /// model involvement.
    SkipLlm(String),
}

pub async fn run_tool_loop(
    llm: &LlmComposite,
    registry: &ToolRegistry,
    context: &ToolContext,
    mut messages: Vec<ChatMessage>,
    max_tokens: Option<u32>,
    text_tx: mpsc::UnboundedSender<String>,
) -> Result<ToolLoopOutcome, CoreError> {
    let tool_defs = registry.definitions();
    let mut seen_calls: HashSet<String> = HashSet::new();

    for _round in 0..MAX_TOOL_ROUNDS {
        let result = llm.chat_stream(&messages, Some(&tool_defs), max_tokens, text_tx.clone()).await?;

        if result.tool_calls.is_empty() {
            return Ok(ToolLoopOutcome::Final(result.content));
        }

        messages.push(ChatMessage::assistant_with_tools(result.content.clone(), result.tool_calls.clone()));

        for call in &result.tool_calls {
            let key = format!("{}:{}", call.function.name, call.function.arguments);
            if !seen_calls.insert(key) {
                warn!(tool = %call.function.name, "skipping duplicate tool call");
                messages.push(ChatMessage::tool_result(call.id.clone(), "duplicate call skipped"));
                continue;
            }

            let outcome = match registry.get(&call.function.name) {
                None => Err(CoreError::ToolExecution(format!("unknown tool \"{}\"", call.function.name))),
                Some(tool) => tool.execute(context, &call.function.arguments).await,
            };

            match outcome {
                Ok(ToolOutcome::Structured { content, skip_llm: true }) => {
                    return Ok(ToolLoopOutcome::SkipLlm(content));
                }
                Ok(outcome) => {
                    messages.push(ChatMessage::tool_result(call.id.clone(), outcome.content().to_string()));
                }
                Err(e) => {
                    warn!(tool = %call.function.name, error = %e, "tool execution failed");
                    messages.push(ChatMessage::tool_result(call.id.clone(), format!("error: {e}")));
                }
            }
        }
    }

    warn!(rounds = MAX_TOOL_ROUNDS, "tool loop exhausted its round budget");
    Ok(ToolLoopOutcome::Final(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StreamPlayer;
    use crate::llm::provider::{FunctionCall, ToolCall};
    use crate::persistence::Store;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn context() -> ToolContext {
        ToolContext {
            persistence: Arc::new(Store::open_in_memory().unwrap()),
            player: Arc::new(StreamPlayer::new(std::env::temp_dir()).unwrap()),
            speaker_id: None,
        }
    }

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

    fn tool_call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall { id: id.to_string(), function: FunctionCall { name: name.to_string(), arguments: args.to_string() } }
    }

    #[test]
    fn duplicate_call_keys_are_skipped() {
        let mut seen = HashSet::new();
        assert!(seen.insert("a:{}".to_string()));
        assert!(!seen.insert("a:{}".to_string()));
        assert!(seen.insert("a:{\"x\":1}".to_string()));
    }

    #[tokio::test]
    async fn unknown_tool_name_yields_none_from_registry() {
        let ctx = context();
        let registry = ToolRegistry::new();
        let call = tool_call("1", "not_registered", "{}");
        assert!(registry.get(&call.function.name).is_none());
        // context itself must be constructible off-device without panicking
        assert!(ctx.speaker_id.is_none());
    }

    #[tokio::test]
    async fn registered_tool_executes_and_returns_text_outcome() {
        let ctx = context();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let tool = registry.get("echo").unwrap();
        let outcome = tool.execute(&ctx, r#"{"a":1}"#).await.unwrap();
        assert!(!outcome.skips_llm());
        assert_eq!(outcome.content(), r#"{"a":1}"#);
    }
}
