//! OpenAI-compatible streaming chat client (spec §4.6/§6): `chat_stream`
//! returns a `(textChan, resultChan)` pair, assembling tool-call deltas
//! by `index` across SSE chunks.
//!
//! Grounded on the teacher's `agent/llm.rs::OpenRouterClient` for the
//! HTTP/SSE plumbing (`ProviderConfig`, header handling,
//! `stream_complete`'s chunk parsing), generalized to also surface
//! assembled tool calls, which the teacher's streaming path didn't need.

use crate::error::CoreError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// One configured chat provider (spec §6's `llm.providers[]`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None, name: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None, name: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: Some(content.into()), tool_calls: None, tool_call_id: None, name: None }
    }
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: "assistant".into(), content: Some(content.into()), tool_calls: Some(tool_calls), tool_call_id: None, name: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: "tool".into(), content: Some(content.into()), tool_calls: None, tool_call_id: Some(tool_call_id.into()), name: None }
    }
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What a completed stream produced: accumulated text plus any
/// assembled tool calls (spec §4.6: "on completion a single
/// `{content, toolCalls[]}` is posted to `resultChan`").
#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Debug, Deserialize)]
struct SseChunk {
    choices: Vec<SseChoice>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    delta: SseDelta,
}

#[derive(Debug, Deserialize, Default)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<SseToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<SseFunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct SseFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// A single OpenAI-compatible chat provider.
pub struct ChatProvider {
    client: Client,
    config: ProviderConfig,
}

impl ChatProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self { client: Client::new(), config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Streams a completion, pushing text deltas to `text_tx` as they
    /// arrive and posting the final assembled result on return.
    /// Tool-call fragments are assembled by `index` (spec §4.6).
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        max_tokens: Option<u32>,
        text_tx: mpsc::UnboundedSender<String>,
    ) -> Result<StreamResult, CoreError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens,
            stream: true,
            tools,
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .timeout(std::time::Duration::from_secs(60))
            .json(&request);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(CoreError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::from_http(status.as_u16(), None, &body));
        }

        use futures_util::StreamExt;
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut pending: BTreeMap<usize, (String, String, String)> = BTreeMap::new(); // index -> (id, name, arguments)

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(CoreError::from)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer = buffer[pos + 2..].to_string();

                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    let Ok(parsed) = serde_json::from_str::<SseChunk>(data) else { continue };
                    let Some(choice) = parsed.choices.into_iter().next() else { continue };

                    if let Some(text) = choice.delta.content {
                        content.push_str(&text);
                        let _ = text_tx.send(text);
                    }
                    if let Some(deltas) = choice.delta.tool_calls {
                        for delta in deltas {
                            let entry = pending.entry(delta.index).or_insert_with(|| (String::new(), String::new(), String::new()));
                            if let Some(id) = delta.id {
                                entry.0 = id;
                            }
                            if let Some(func) = delta.function {
                                if let Some(name) = func.name {
                                    entry.1.push_str(&name);
                                }
                                if let Some(args) = func.arguments {
                                    entry.2.push_str(&args);
                                }
                            }
                        }
                    }
                }
            }
        }

        let tool_calls = pending
            .into_iter()
            .map(|(_, (id, name, arguments))| ToolCall { id, function: FunctionCall { name, arguments } })
            .collect();

        Ok(StreamResult { content, tool_calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_builders_set_role() {
        assert_eq!(ChatMessage::user("hi").role, "user");
        assert_eq!(ChatMessage::system("sys").role, "system");
        assert!(ChatMessage::assistant_with_tools("", vec![ToolCall { id: "1".into(), function: FunctionCall { name: "f".into(), arguments: "{}".into() } }]).has_tool_calls());
    }

    #[test]
    fn sse_tool_call_delta_assembles_by_index() {
        let mut pending: BTreeMap<usize, (String, String, String)> = BTreeMap::new();
        let deltas = vec![
            SseToolCallDelta { index: 0, id: Some("call_1".into()), function: Some(SseFunctionDelta { name: Some("get_".into()), arguments: Some("{\"a\":".into()) }) },
            SseToolCallDelta { index: 0, id: None, function: Some(SseFunctionDelta { name: Some("weather".into()), arguments: Some("1}".into()) }) },
        ];
        for delta in deltas {
            let entry = pending.entry(delta.index).or_insert_with(|| (String::new(), String::new(), String::new()));
            if let Some(id) = delta.id {
                entry.0 = id;
            }
            if let Some(func) = delta.function {
                if let Some(name) = func.name {
                    entry.1.push_str(&name);
                }
                if let Some(args) = func.arguments {
                    entry.2.push_str(&args);
                }
            }
        }
        let (id, name, args) = &pending[&0];
        assert_eq!(id, "call_1");
        assert_eq!(name, "get_weather");
        assert_eq!(args, "{\"a\":1}");
    }
}
