// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! First-run secret generation.
//!
//! On first start — or whenever an operator runs the explicit bootstrap
//! command — the process needs two secrets: the API key gating the
//! HTTP/GraphQL surface (§4.7) and a provider master key standing in for
//! whatever upstream LLM credential the deployment's `openai-compat`
//! entries expect. Both are generated once, written to an environment
//! file, and printed so the operator can copy them into their process
//! manager. Re-running bootstrap against an existing file is a no-op that
//! reports the keys already on disk rather than silently rotating them out
//! from under a running deployment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rand::rngs::OsRng;
use rand::RngCore;

pub const API_KEY_VAR: &str = "ARIA_API_KEY";
pub const LLM_MASTER_KEY_VAR: &str = "ARIA_LLM_MASTER_KEY";

#[derive(Debug, Clone)]
pub struct BootstrapKeys {
    pub api_key: String,
    pub llm_master_key: String,
    pub env_file: PathBuf,
    /// `true` if the keys were freshly generated this call, `false` if an
    /// existing environment file was reused.
    pub generated: bool,
}

/// Default environment-file location, OS-appropriate: `dirs::config_dir()`
/// (`~/.config` on Linux, `~/Library/Application Support` on macOS,
/// `%APPDATA%` on Windows) joined with `aria/aria.env`.
pub fn default_env_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aria")
        .join("aria.env")
}

/// Generate (or load) the API key and LLM master key at `path` (or the
/// OS-default location). Returns the resolved keys either way.
pub fn bootstrap_keys(path: Option<&Path>) -> anyhow::Result<BootstrapKeys> {
    let env_file = path.map(Path::to_path_buf).unwrap_or_else(default_env_path);

    if env_file.is_file() {
        let existing = parse_env_file(&env_file)?;
        let api_key = existing
            .get(API_KEY_VAR)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} missing {API_KEY_VAR}", env_file.display()))?;
        let llm_master_key = existing
            .get(LLM_MASTER_KEY_VAR)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} missing {LLM_MASTER_KEY_VAR}", env_file.display()))?;
        return Ok(BootstrapKeys { api_key, llm_master_key, env_file, generated: false });
    }

    let api_key = generate_key();
    let llm_master_key = generate_key();

    if let Some(parent) = env_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating bootstrap directory {}", parent.display()))?;
    }
    let contents = format!(
        "# generated by `aria bootstrap` — treat this file as a secret\n{API_KEY_VAR}={api_key}\n{LLM_MASTER_KEY_VAR}={llm_master_key}\n"
    );
    write_secret_file(&env_file, contents.as_bytes())
        .with_context(|| format!("writing {}", env_file.display()))?;

    Ok(BootstrapKeys { api_key, llm_master_key, env_file, generated: true })
}

fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse_env_file(path: &Path) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut map = std::collections::HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    Ok(map)
}

fn write_secret_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aria.env");
        let keys = bootstrap_keys(Some(&path)).unwrap();
        assert!(keys.generated);
        assert_ne!(keys.api_key, keys.llm_master_key);
        assert_eq!(keys.api_key.len(), 64, "hex-encoded 32 bytes");
    }

    #[test]
    fn second_call_reuses_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aria.env");
        let first = bootstrap_keys(Some(&path)).unwrap();
        let second = bootstrap_keys(Some(&path)).unwrap();
        assert!(!second.generated);
        assert_eq!(first.api_key, second.api_key);
        assert_eq!(first.llm_master_key, second.llm_master_key);
    }

    #[test]
    fn missing_key_in_existing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aria.env");
        std::fs::write(&path, format!("{API_KEY_VAR}=only-one-key\n")).unwrap();
        assert!(bootstrap_keys(Some(&path)).is_err());
    }
}
