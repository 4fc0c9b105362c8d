//! Provider credential storage: OS keyring with a config-dir file
//! fallback, keyed per provider tag (spec §6).

pub mod keyring;

pub use keyring::{delete_provider_key, has_provider_key, resolve_provider_key, set_provider_key};
