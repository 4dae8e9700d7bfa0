use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems loading host settings at startup.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not read credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Credentials are not a valid Google key file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A Google credential the user consented to ahead of time.
///
/// Both shapes are the JSON files Google tooling writes: `gcloud auth
/// application-default login` produces `authorized_user`, the Cloud Console
/// produces `service_account` keys.
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        /// Falls back to the configured token endpoint when absent.
        #[serde(default)]
        token_uri: Option<String>,
    },
}

impl Credentials {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&content)
    }

    /// Loads from `OVERDRIVE_CREDENTIALS` (a path) or
    /// `OVERDRIVE_CREDENTIALS_JSON` (inline). `None` when neither is set.
    pub async fn from_env() -> Result<Option<Self>, SettingsError> {
        if let Ok(path) = std::env::var("OVERDRIVE_CREDENTIALS") {
            if !path.trim().is_empty() {
                return Self::from_file(path.trim()).await.map(Some);
            }
        }

        if let Ok(json) = std::env::var("OVERDRIVE_CREDENTIALS_JSON") {
            if !json.trim().is_empty() {
                return Self::from_json(&json).map(Some);
            }
        }

        Ok(None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::AuthorizedUser { .. } => "authorized_user",
            Credentials::ServiceAccount { .. } => "service_account",
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::AuthorizedUser { client_id, .. } => f
                .debug_struct("AuthorizedUser")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Credentials::ServiceAccount { client_email, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .finish_non_exhaustive(),
        }
    }
}
