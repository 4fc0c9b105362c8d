//! LLM multi-provider chat stack (spec §4.6): an OpenAI-compatible
//! streaming client per provider (`provider`), an ordered composite with
//! failover (`multi`), and bounded conversation history (`history`).

pub mod history;
pub mod multi;
pub mod provider;
