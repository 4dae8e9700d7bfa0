use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;

use crate::core::auth::AccessToken;
use crate::core::errors::SyncError;

/// Body of an outbound storage API call.
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Metadata plus media in one `multipart/related` request.
    Multipart {
        metadata: Value,
        content: Vec<u8>,
        mime_type: String,
    },
}

/// Thin wrapper over reqwest for authenticated storage API calls.
///
/// Every call carries the bearer token, and every non-2xx response is turned
/// into a [`SyncError`] before it reaches the caller.
pub struct DriveRequestClient {
    client: Client,
}

impl DriveRequestClient {
    pub fn new() -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent("OverdriveHost/0.2")
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn call(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: RequestBody,
        token: &AccessToken,
    ) -> Result<Response, SyncError> {
        tracing::debug!(%method, url, "Drive API call");

        let mut request = self
            .client
            .request(method, url)
            .query(query)
            .header(AUTHORIZATION, token.bearer_header());

        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart {
                metadata,
                content,
                mime_type,
            } => {
                let boundary = new_boundary();
                let payload = multipart_related(&boundary, &metadata, &content, &mime_type);
                request
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/related; boundary={}", boundary),
                    )
                    .body(payload)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("Could not reach Google Drive: {}", e)))?;

        check_response(response).await
    }
}

fn new_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("overdrive_{}", suffix)
}

/// Builds a two-part `multipart/related` body: JSON metadata, then media.
fn multipart_related(boundary: &str, metadata: &Value, content: &[u8], mime_type: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            boundary, metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{}\r\nContent-Type: {}\r\n\r\n", boundary, mime_type).as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Pulls a human-readable message out of a Google error body. Handles both
/// the API shape (`{"error": {"message": ..}}`) and the OAuth shape
/// (`{"error": "..", "error_description": ..}`).
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value["error"]["message"]
        .as_str()
        .or_else(|| value["error_description"].as_str())
        .or_else(|| value["error"].as_str())
        .map(str::to_string)
}

pub async fn check_response(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    tracing::debug!(status = status.as_u16(), "Drive API error: {}", body);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Auth(
            message.unwrap_or_else(|| "Authorization expired. Please sign in again.".to_string()),
        ),
        StatusCode::NOT_FOUND => {
            SyncError::NotFound(message.unwrap_or_else(|| "File not found.".to_string()))
        }
        _ => SyncError::Api {
            status: status.as_u16(),
            message: message
                .unwrap_or_else(|| format!("Google Drive request failed ({}).", status)),
        },
    })
}
