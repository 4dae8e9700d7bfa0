// Session tokens for the storage API.
// The core never persists a token: it asks the provider on demand and tells it
// to forget the token when the storage API rejects it.

use async_trait::async_trait;
use std::fmt;

use crate::core::errors::SyncError;

/// Opaque bearer credential with a provider-managed lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

// Tokens end up in tracing fields; never print the secret.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Obtains and revokes bearer tokens for the storage API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a valid token.
    ///
    /// With `interactive == false` this must not start any consent or grant
    /// exchange: it either returns a cached, unexpired token or fails with
    /// [`SyncError::Auth`].
    async fn acquire(&self, interactive: bool) -> Result<AccessToken, SyncError>;

    /// Invalidates the token locally and with the remote provider.
    /// Best effort: failures are logged, never returned.
    async fn revoke(&self, token: &AccessToken);

    /// Drops the cached token without contacting the provider.
    async fn forget(&self);
}
