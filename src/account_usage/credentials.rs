//! Credential file reading for the monitored providers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Provider-specific credentials needed to fetch usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCredentials {
    Claude {
        access_token: String,
        /// Expiry in Unix epoch milliseconds.
        expires_at: Option<i64>,
    },
    Codex {
        access_token: String,
        account_id: Option<String>,
    },
}

impl ProviderCredentials {
    /// True when the token carries an expiry that has already passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            ProviderCredentials::Claude {
                expires_at: Some(expires_at),
                ..
            } => *expires_at <= now.timestamp_millis(),
            _ => false,
        }
    }

    pub fn access_token(&self) -> &str {
        match self {
            ProviderCredentials::Claude { access_token, .. }
            | ProviderCredentials::Codex { access_token, .. } => access_token,
        }
    }
}

/// Claude config directory: `$CLAUDE_CONFIG_DIR` or `~/.claude`.
pub fn claude_config_dir() -> Result<PathBuf> {
    std::env::var("CLAUDE_CONFIG_DIR")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|h| h.join(".claude")))
        .context("Cannot determine Claude config directory")
}

/// Codex home directory: `$CODEX_HOME` or `~/.codex`.
pub fn codex_home_dir() -> Result<PathBuf> {
    std::env::var("CODEX_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|h| h.join(".codex")))
        .context("Cannot determine Codex config directory")
}

/// Reads Claude credentials from `.credentials.json` in the config directory.
pub fn read_claude_credentials() -> Result<Option<ProviderCredentials>> {
    let creds_path = claude_config_dir()?.join(".credentials.json");
    if !creds_path.exists() {
        return Ok(None);
    }

    let content =
        std::fs::read_to_string(&creds_path).context("Failed to read Claude credentials")?;
    let json: serde_json::Value =
        serde_json::from_str(&content).context("Failed to parse Claude credentials")?;

    let oauth = &json["claudeAiOauth"];
    if oauth.is_null() {
        return Ok(None);
    }

    let access_token = oauth["accessToken"]
        .as_str()
        .context("Missing accessToken")?
        .to_string();
    let expires_at = oauth["expiresAt"].as_i64();

    Ok(Some(ProviderCredentials::Claude {
        access_token,
        expires_at,
    }))
}

/// Reads Codex credentials from `auth.json` in the Codex home.
pub fn read_codex_credentials() -> Result<Option<ProviderCredentials>> {
    let creds_path = codex_home_dir()?.join("auth.json");
    if !creds_path.exists() {
        return Ok(None);
    }

    let content =
        std::fs::read_to_string(&creds_path).context("Failed to read Codex credentials")?;
    let json: serde_json::Value =
        serde_json::from_str(&content).context("Failed to parse Codex credentials")?;

    let tokens = &json["tokens"];
    if tokens.is_null() {
        return Ok(None);
    }

    let access_token = tokens["access_token"]
        .as_str()
        .context("Missing access_token")?
        .to_string();
    let account_id = tokens["account_id"].as_str().map(String::from);

    Ok(Some(ProviderCredentials::Codex {
        access_token,
        account_id,
    }))
}

/// Extracts the email claim from a JWT without verifying it.
pub fn extract_email_from_jwt(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    use base64::Engine;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .ok()?;
    let json: serde_json::Value = serde_json::from_slice(&payload).ok()?;

    json["email"]
        .as_str()
        .or_else(|| json["https://api.openai.com/profile"]["email"].as_str())
        .map(String::from)
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
