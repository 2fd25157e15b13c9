//! Browser storage state: the cookie + local-storage snapshot that lets a
//! browser resume an authenticated session without re-submitting credentials.
//!
//! The JSON layout matches what the session-capture extension uploads:
//!
//! ```json
//! {"cookies": [{"name": "...", "value": "...", "domain": ".example.net", "path": "/",
//!               "expires": 1767225600, "httpOnly": true, "secure": true, "sameSite": "Lax"}],
//!  "origins": [{"origin": "https://member.example.net",
//!               "localStorage": [{"name": "k", "value": "v"}]}]}
//! ```
//!
//! Accounts store the blob verbatim; this type is only materialized when a
//! browser needs to be seeded or a live session is captured.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Unix seconds; `-1` or absent for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default, rename = "localStorage")]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

fn root_path() -> String {
    "/".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid storage state: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("failed to read session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageState {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Load the legacy on-disk session file (`auth.json`).
    pub fn load_file(path: &Path) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }
}

/// True when a stored blob carries no session at all (`""`, `{}`, or
/// whitespace around either).
pub fn is_blank_blob(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed == "{}"
}
