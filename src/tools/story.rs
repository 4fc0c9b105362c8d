//! `tell_story` tool: recites a short story matched by keyword from a
//! small built-in corpus, spoken verbatim (spec's worked example:
//! `tell_story({keyword:"小马"})` returns `{content:"《小马过河》…",
//! skipLLM:true}` — the LLM never gets a chance to paraphrase it).

use super::{Tool, ToolContext, ToolOutcome};
use crate::error::CoreError;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct Args {
    keyword: String,
}

const FALLBACK: &str = "I don't know a story about that yet.";

fn corpus() -> &'static [(&'static str, &'static str)] {
    &[
        (
            "小马",
            "《小马过河》：小马要过河，松鼠说水很深,老牛说水很浅。小马自己试了试，水既不像老牛说的那样浅，也不像松鼠说的那样深。",
        ),
        (
            "龟兔",
            "《龟兔赛跑》：兔子嘲笑乌龟走得慢，便与它比赛跑步。兔子骄傲轻敌，中途睡觉，乌龟不停歇地爬，最终乌龟获得了胜利。",
        ),
    ]
}

pub struct TellStoryTool;

#[async_trait]
impl Tool for TellStoryTool {
    fn name(&self) -> &str {
        "tell_story"
    }

    fn description(&self) -> &str {
        "Tells a short story matching the given keyword."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"keyword": {"type": "string"}},
            "required": ["keyword"],
        })
    }

    async fn execute(&self, _context: &ToolContext, args_json: &str) -> Result<ToolOutcome, CoreError> {
        let args: Args = serde_json::from_str(args_json)
            .map_err(|e| CoreError::ToolExecution(format!("bad tell_story args: {e}")))?;

        let story = corpus()
            .iter()
            .find(|(keyword, _)| args.keyword.contains(keyword) || keyword.contains(&args.keyword))
            .map(|(_, text)| *text)
            .unwrap_or(FALLBACK);

        Ok(ToolOutcome::skip_llm(story))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tells_matching_story_and_skips_llm() {
        let ctx = ToolContext {
            persistence: std::sync::Arc::new(crate::persistence::Store::open_in_memory().unwrap()),
            player: std::sync::Arc::new(crate::audio::StreamPlayer::new(std::env::temp_dir()).unwrap()),
            speaker_id: None,
        };
        let outcome = TellStoryTool.execute(&ctx, r#"{"keyword":"小马"}"#).await.unwrap();
        assert!(outcome.skips_llm());
        assert!(outcome.content().contains("小马过河"));
    }

    #[tokio::test]
    async fn unknown_keyword_falls_back() {
        let ctx = ToolContext {
            persistence: std::sync::Arc::new(crate::persistence::Store::open_in_memory().unwrap()),
            player: std::sync::Arc::new(crate::audio::StreamPlayer::new(std::env::temp_dir()).unwrap()),
            speaker_id: None,
        };
        let outcome = TellStoryTool.execute(&ctx, r#"{"keyword":"恐龙"}"#).await.unwrap();
        assert_eq!(outcome.content(), FALLBACK);
    }
}
