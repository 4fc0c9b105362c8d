//! Shared HTTP client construction for tool back-ends (spec §4.7: "each
//! [tool] owns its transport"). Grounded on the teacher's
//! `tools/web.rs::WebConfig` defaults (timeout, user agent), trimmed of
//! the teacher's URL-allowlisting/approval machinery since tool targets
//! here are fixed, configured endpoints rather than LLM-chosen URLs.

use std::sync::OnceLock;
use std::time::Duration;

/// Default per-request timeout for tool HTTP calls that aren't called
/// out with a specific value in spec §5 (weather, news, RSS, home
/// automation). Music HTTP calls use their own 30s timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);
pub const MUSIC_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn user_agent() -> &'static str {
    static USER_AGENT: OnceLock<String> = OnceLock::new();
    USER_AGENT.get_or_init(|| format!("voxd/{} (+voice-assistant)", env!("CARGO_PKG_VERSION")))
}

/// Builds a `reqwest::Client` shared by tool implementations; each call
/// site still sets its own per-request timeout since tools vary (music
/// streaming vs. a quick weather lookup).
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .build()
        .expect("reqwest client builder should not fail with static config")
}
