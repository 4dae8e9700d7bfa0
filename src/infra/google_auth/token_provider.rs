// OAuth2 token provider for Google APIs.
//
// The host cannot show a consent screen, so the "interactive" path is a grant
// exchange against a credential the user consented to ahead of time: a
// refresh token (authorized_user) or a signed JWT (service_account).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::credentials::Credentials;
use crate::core::auth::{AccessToken, TokenProvider};
use crate::core::errors::SyncError;
use crate::infra::drive::request_client::error_message;

pub const DRIVE_SCOPES: &str =
    "https://www.googleapis.com/auth/drive.file https://www.googleapis.com/auth/drive.appdata";

const EXPIRY_MARGIN_SECS: i64 = 60;

/// Logging out revokes the refresh grant too, so a stored refresh token stops
/// working for good and only a new credentials file helps.
pub const REVOKED_GRANT_MESSAGE: &str = "The saved Google sign-in was revoked or has expired. \
Regenerate the credentials file (OVERDRIVE_CREDENTIALS) and restart the extension.";

fn is_invalid_grant(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .map(|value| value["error"] == "invalid_grant")
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub token_url: String,
    pub revoke_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revoke_url: "https://oauth2.googleapis.com/revoke".to_string(),
        }
    }
}

impl OAuthEndpoints {
    /// Reads `OVERDRIVE_OAUTH_TOKEN_URL` and `OVERDRIVE_OAUTH_REVOKE_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: String| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(fallback)
        };
        Self {
            token_url: read("OVERDRIVE_OAUTH_TOKEN_URL", defaults.token_url),
            revoke_url: read("OVERDRIVE_OAUTH_REVOKE_URL", defaults.revoke_url),
        }
    }
}

/// JWT claims for the service account grant.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: AccessToken,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

pub struct GoogleTokenProvider {
    credentials: Option<Credentials>,
    endpoints: OAuthEndpoints,
    client: Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl GoogleTokenProvider {
    /// `None` credentials make every acquisition fail with an auth error.
    pub fn new(credentials: Option<Credentials>, endpoints: OAuthEndpoints) -> Self {
        Self {
            credentials,
            endpoints,
            client: Client::new(),
            cached_token: RwLock::new(None),
        }
    }

    async fn cached(&self) -> Option<AccessToken> {
        let cached = self.cached_token.read().await;
        cached
            .as_ref()
            .filter(|c| c.is_fresh(Utc::now()))
            .map(|c| c.token.clone())
    }

    async fn exchange(&self, credentials: &Credentials) -> Result<TokenResponse, SyncError> {
        let response = match credentials {
            Credentials::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
            } => {
                self.client
                    .post(&self.endpoints.token_url)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("refresh_token", refresh_token.as_str()),
                    ])
                    .send()
                    .await
            }
            Credentials::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => {
                let token_url = token_uri
                    .as_deref()
                    .unwrap_or(self.endpoints.token_url.as_str());
                let jwt = sign_assertion(client_email, private_key, token_url)?;
                self.client
                    .post(token_url)
                    .form(&[
                        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                        ("assertion", jwt.as_str()),
                    ])
                    .send()
                    .await
            }
        }
        .map_err(|e| SyncError::Network(format!("Could not reach Google sign-in: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let refresh_token_dead = matches!(credentials, Credentials::AuthorizedUser { .. })
                && is_invalid_grant(&body);
            let message = if refresh_token_dead {
                REVOKED_GRANT_MESSAGE.to_string()
            } else {
                error_message(&body)
                    .unwrap_or_else(|| format!("Token exchange failed ({}).", status))
            };
            tracing::debug!(status = status.as_u16(), "Token exchange rejected: {}", body);
            return Err(if status.is_client_error() {
                SyncError::Auth(message)
            } else {
                SyncError::Api {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        response.json::<TokenResponse>().await.map_err(|e| SyncError::Api {
            status: status.as_u16(),
            message: format!("Unexpected token response: {}", e),
        })
    }
}

fn sign_assertion(
    client_email: &str,
    private_key: &str,
    audience: &str,
) -> Result<String, SyncError> {
    let now = Utc::now().timestamp();
    let claims = JwtClaims {
        iss: client_email.to_string(),
        scope: DRIVE_SCOPES.to_string(),
        aud: audience.to_string(),
        iat: now,
        exp: now + 3600,
    };

    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| SyncError::Auth(format!("Service account key is unusable: {}", e)))?;
    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| SyncError::Auth(format!("Could not sign token request: {}", e)))
}

#[async_trait]
impl TokenProvider for GoogleTokenProvider {
    async fn acquire(&self, interactive: bool) -> Result<AccessToken, SyncError> {
        if let Some(token) = self.cached().await {
            return Ok(token);
        }
        if !interactive {
            return Err(SyncError::Auth("Not signed in.".to_string()));
        }

        let credentials = self.credentials.as_ref().ok_or_else(|| {
            SyncError::Auth(
                "No Google credentials configured. Set OVERDRIVE_CREDENTIALS.".to_string(),
            )
        })?;

        tracing::debug!(kind = credentials.kind(), "Exchanging credentials for an access token");
        let response = self.exchange(credentials).await?;
        let token = AccessToken::new(response.access_token);

        *self.cached_token.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        });
        tracing::info!("Signed in to Google Drive");
        Ok(token)
    }

    async fn revoke(&self, token: &AccessToken) {
        self.forget().await;

        let result = self
            .client
            .post(&self.endpoints.revoke_url)
            .form(&[("token", token.secret())])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Token revoked");
            }
            Ok(response) => {
                tracing::warn!(status = response.status().as_u16(), "Token revoke was rejected");
            }
            Err(e) => tracing::warn!("Token revoke failed: {}", e),
        }
    }

    async fn forget(&self) {
        *self.cached_token.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authorized_user() -> Credentials {
        Credentials::AuthorizedUser {
            client_id: "client".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
        }
    }

    fn endpoints(server: &MockServer) -> OAuthEndpoints {
        OAuthEndpoints {
            token_url: format!("{}/token", server.uri()),
            revoke_url: format!("{}/revoke", server.uri()),
        }
    }

    async fn mount_token(server: &MockServer, expires_in: i64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.fresh",
                "expires_in": expires_in,
                "token_type": "Bearer"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn silent_acquire_never_hits_the_network() {
        let server = MockServer::start().await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        let err = provider.acquire(false).await.unwrap_err();

        assert_eq!(err, SyncError::Auth("Not signed in.".into()));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interactive_acquire_exchanges_once_then_caches() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        let first = provider.acquire(true).await.unwrap();
        let silent = provider.acquire(false).await.unwrap();

        assert_eq!(first.secret(), "ya29.fresh");
        assert_eq!(silent, first);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn nearly_expired_token_counts_as_absent() {
        let server = MockServer::start().await;
        mount_token(&server, 30).await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        provider.acquire(true).await.unwrap();

        assert!(provider.acquire(false).await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn rejected_refresh_token_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        let err = provider.acquire(true).await.unwrap_err();

        assert_eq!(err, SyncError::Auth(REVOKED_GRANT_MESSAGE.into()));
    }

    #[tokio::test]
    async fn login_after_logout_explains_the_revoked_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        let token = provider.acquire(true).await.unwrap();
        provider.revoke(&token).await;
        let err = provider.acquire(true).await.unwrap_err();

        assert!(err.is_auth());
        assert!(err.to_string().contains("OVERDRIVE_CREDENTIALS"));
    }

    #[tokio::test]
    async fn other_client_errors_keep_googles_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "The OAuth client was not found."
            })))
            .mount(&server)
            .await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        let err = provider.acquire(true).await.unwrap_err();

        assert_eq!(err, SyncError::Auth("The OAuth client was not found.".into()));
    }

    #[tokio::test]
    async fn missing_credentials_fail_interactive_acquire() {
        let provider = GoogleTokenProvider::new(None, OAuthEndpoints::default());
        assert!(provider.acquire(true).await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn unusable_service_account_key_is_an_auth_error() {
        let credentials = Credentials::ServiceAccount {
            client_email: "bot@example.iam.gserviceaccount.com".into(),
            private_key: "not a pem".into(),
            token_uri: None,
        };
        let provider = GoogleTokenProvider::new(Some(credentials), OAuthEndpoints::default());

        let err = provider.acquire(true).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn revoke_posts_token_and_drops_cache() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .and(body_string_contains("token=ya29.fresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));
        let token = provider.acquire(true).await.unwrap();

        provider.revoke(&token).await;

        assert!(provider.acquire(false).await.is_err());
    }

    #[tokio::test]
    async fn failed_revoke_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));

        provider.revoke(&AccessToken::new("stale")).await;
    }

    #[tokio::test]
    async fn forget_keeps_credentials_for_the_next_sign_in() {
        let server = MockServer::start().await;
        mount_token(&server, 3600).await;
        let provider = GoogleTokenProvider::new(Some(authorized_user()), endpoints(&server));
        provider.acquire(true).await.unwrap();

        provider.forget().await;

        assert!(provider.acquire(false).await.is_err());
        assert!(provider.acquire(true).await.is_ok());
    }
}
