//! Error taxonomy for the orchestrator core.
//!
//! Replaces the lowercase-substring-scan-over-`Display` pattern with typed
//! variants so fallback decisions don't need to pattern-match on message
//! text. The one place a substring scan is actually specified (the vendor
//! 429-body keyword scan) is implemented narrowly in `llm::multi` and
//! `asr::fallback`, not here.

use thiserror::Error;

/// The kinds of failure an engine or provider call can produce. Drives
/// fallback/demotion decisions uniformly across the LLM and ASR
/// composites.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancellation,

    #[error("tool execution error: {0}")]
    ToolExecution(String),

    #[error("device fatal: {0}")]
    DeviceFatal(String),
}

impl CoreError {
    /// Transport and Quota errors drive fallback in the LLM and ASR
    /// composites; Auth is treated the same way for fallback purposes
    /// (spec §7) even though it's logged distinctly.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            CoreError::Transport(_) | CoreError::Quota(_) | CoreError::Auth(_)
        )
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, CoreError::Cancellation)
    }

    /// Classify an HTTP response for the LLM/ASR-batch composites. Status
    /// code and vendor JSON fields are checked first; the §7-mandated body
    /// keyword scan only runs for a bare 429 that doesn't already carry a
    /// recognized vendor code.
    pub fn from_http(status: u16, vendor_code: Option<&str>, body: &str) -> Self {
        if let Some(code) = vendor_code {
            if matches!(code, "ResourceInsufficient" | "QuotaExhausted") {
                return CoreError::Quota(format!("vendor code {code}"));
            }
        }
        match status {
            402 => CoreError::Quota(format!("HTTP 402: {body}")),
            401 | 403 => CoreError::Auth(format!("HTTP {status}")),
            429 => {
                let lower = body.to_lowercase();
                const KEYWORDS: [&str; 4] = ["quota", "insufficient", "balance", "rate limit"];
                if KEYWORDS.iter().any(|k| lower.contains(k)) {
                    CoreError::Quota(format!("HTTP 429: {body}"))
                } else {
                    CoreError::Transport(format!("HTTP 429: {body}"))
                }
            }
            500..=599 => CoreError::Transport(format!("HTTP {status}: {body}")),
            _ => CoreError::Protocol(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            CoreError::Transport(e.to_string())
        } else {
            CoreError::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_vendor_code_as_quota() {
        let e = CoreError::from_http(429, Some("QuotaExhausted"), "");
        assert!(matches!(e, CoreError::Quota(_)));
    }

    #[test]
    fn classifies_429_keyword_body_as_quota() {
        let e = CoreError::from_http(429, None, "Insufficient Balance");
        assert!(matches!(e, CoreError::Quota(_)));
    }

    #[test]
    fn classifies_bare_429_as_transport() {
        let e = CoreError::from_http(429, None, "slow down");
        assert!(matches!(e, CoreError::Transport(_)));
    }

    #[test]
    fn classifies_402_as_quota() {
        let e = CoreError::from_http(402, None, "Insufficient Balance");
        assert!(matches!(e, CoreError::Quota(_)));
        assert!(e.triggers_fallback());
    }

    #[test]
    fn cancellation_is_not_fallback() {
        assert!(!CoreError::Cancellation.triggers_fallback());
        assert!(CoreError::Cancellation.is_cancellation());
    }
}
