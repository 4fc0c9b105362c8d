//! Conversation history (spec §3 "Conversation context"): bounded by
//! `maxHistory` turns, truncation drops orphaned `tool` messages, and
//! the system message is regenerated per request from the current
//! date, the active speaker's preferences, and capability hints.
//!
//! Grounded on the teacher's `agent/conversation.rs::Conversation`
//! shape (message list + timestamps), collapsed from the teacher's
//! persistence-coupled design down to a plain in-memory buffer since
//! persistence for history isn't part of this crate's data model
//! (spec §3 only persists speakers/alarms/memos/music/RSS).

use super::provider::ChatMessage;
use chrono::Utc;

/// Conversation history for one speaker-facing dialog. Survives across
/// turns until explicitly cleared (spec §3 "LLM history: lives across
/// turns, survives until explicit clear").
pub struct History {
    messages: Vec<ChatMessage>,
    max_turns: usize,
}

impl History {
    pub fn new(max_turns: usize) -> Self {
        Self { messages: Vec::new(), max_turns }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.truncate();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Builds the full request: a freshly regenerated system message
    /// followed by the truncated history window.
    pub fn to_request(&self, preferences: Option<&serde_json::Value>, capabilities: &[&str]) -> Vec<ChatMessage> {
        let mut request = vec![ChatMessage::system(system_prompt(preferences, capabilities))];
        request.extend(self.messages.iter().cloned());
        request
    }

    /// Keeps at most `max_turns * 2` messages (one turn ≈ two messages,
    /// spec §3), then drops any leading `tool` message whose matching
    /// assistant tool-call fell outside the retained window.
    fn truncate(&mut self) {
        let cap = self.max_turns * 2;
        if self.messages.len() > cap {
            let drop = self.messages.len() - cap;
            self.messages.drain(0..drop);
        }
        while let Some(first) = self.messages.first() {
            if first.role == "tool" {
                self.messages.remove(0);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

fn system_prompt(preferences: Option<&serde_json::Value>, capabilities: &[&str]) -> String {
    let date = Utc::now().format("%Y-%m-%d");
    let mut prompt = format!("Today's date is {date}. You are a voice assistant; replies are spoken aloud, so keep them concise and avoid markdown.");
    if let Some(prefs) = preferences {
        prompt.push_str(&format!(" The current speaker's preferences: {prefs}."));
    }
    if !capabilities.is_empty() {
        prompt.push_str(&format!(" Available tools: {}.", capabilities.join(", ")));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::provider::{FunctionCall, ToolCall};

    #[test]
    fn truncation_respects_max_turns() {
        let mut history = History::new(1);
        for i in 0..5 {
            history.push(ChatMessage::user(format!("msg {i}")));
        }
        assert!(history.len() <= 2);
    }

    #[test]
    fn truncation_drops_orphaned_tool_message() {
        let mut history = History::new(10);
        history.push(ChatMessage::assistant_with_tools("", vec![ToolCall { id: "1".into(), function: FunctionCall { name: "get_time".into(), arguments: "{}".into() } }]));
        history.push(ChatMessage::tool_result("1", "12:00"));
        // Force truncation to drop the assistant tool-call message but not the tool reply.
        let mut forced = History::new(0);
        forced.messages = history.messages.clone();
        forced.truncate();
        assert!(forced.messages.iter().all(|m| m.role != "tool"));
    }

    #[test]
    fn to_request_prepends_regenerated_system_message() {
        let mut history = History::new(10);
        history.push(ChatMessage::user("hi"));
        let request = history.to_request(None, &["get_time"]);
        assert_eq!(request[0].role, "system");
        assert!(request[0].content.as_ref().unwrap().contains("get_time"));
    }
}
