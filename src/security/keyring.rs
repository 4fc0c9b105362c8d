//! Provider credential storage (spec §6: "`apiKey` fields in `llm`/`asr`
//! config are resolved through `security/keyring.rs`"). Tries the OS
//! keyring first, falls back to a config-dir file.
//!
//! Grounded on the teacher's `security/keyring.rs::{set,get}_api_key`
//! keyring-then-file fallback idiom, generalized from a single
//! hardcoded OpenRouter credential to a named-provider-tag lookup so
//! every configured LLM/ASR provider gets its own entry.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

const SERVICE_NAME: &str = "voxd";

fn credentials_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "voxd", "voxd")
        .context("failed to resolve project directories")?;
    let dir = base.config_dir().join("credentials");
    fs::create_dir_all(&dir).context("failed to create credentials directory")?;
    Ok(dir)
}

fn file_path(tag: &str) -> Result<PathBuf> {
    Ok(credentials_dir()?.join(format!("{tag}.key")))
}

fn username(tag: &str) -> String {
    format!("provider-{tag}")
}

/// Stores `key` for `tag` (a provider name, e.g. `"openai"`, an ASR
/// engine tag, etc). Keyring first, file as a backup that also serves
/// hosts without keyring support.
pub fn set_provider_key(tag: &str, key: &str) -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, &username(tag)) {
        let _ = entry.set_password(key);
    }
    let path = file_path(tag)?;
    fs::write(&path, key).context("failed to write credential file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Resolves a provider's API key. Preference order per spec §6: a
/// keyring entry, then the credentials file, then the inline config
/// value (kept for tests/CI where neither a keyring nor a persisted
/// file is available).
pub fn resolve_provider_key(tag: &str, inline: Option<&str>) -> Option<String> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, &username(tag)) {
        if let Ok(key) = entry.get_password() {
            return Some(key);
        }
    }
    if let Ok(path) = file_path(tag) {
        if let Ok(key) = fs::read_to_string(&path) {
            return Some(key.trim().to_string());
        }
    }
    inline.map(|s| s.to_string())
}

pub fn delete_provider_key(tag: &str) -> Result<()> {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, &username(tag)) {
        let _ = entry.delete_credential();
    }
    let path = file_path(tag)?;
    if path.exists() {
        fs::remove_file(&path)?;
    }
    Ok(())
}

pub fn has_provider_key(tag: &str) -> bool {
    if let Ok(entry) = keyring::Entry::new(SERVICE_NAME, &username(tag)) {
        if entry.get_password().is_ok() {
            return true;
        }
    }
    file_path(tag).map(|p| p.exists()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_inline_when_nothing_stored() {
        let resolved = resolve_provider_key("nonexistent-test-tag-xyz", Some("inline-key"));
        assert_eq!(resolved, Some("inline-key".to_string()));
    }
}
