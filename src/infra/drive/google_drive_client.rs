use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::request_client::{DriveRequestClient, RequestBody};
use crate::core::auth::AccessToken;
use crate::core::drive::{DriveApi, FileMetadata, APP_DATA_FOLDER};
use crate::core::errors::SyncError;

const GOOGLE_API_BASE: &str = "https://www.googleapis.com";

/// Base URLs of the Drive v3 REST API. Overridable for tests and proxies.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: GOOGLE_API_BASE.to_string(),
            upload_base: GOOGLE_API_BASE.to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Reads `OVERDRIVE_DRIVE_API_BASE` and `OVERDRIVE_DRIVE_UPLOAD_BASE`,
    /// falling back to Google's production hosts.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: String| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(fallback)
        };
        Self {
            api_base: read("OVERDRIVE_DRIVE_API_BASE", defaults.api_base),
            upload_base: read("OVERDRIVE_DRIVE_UPLOAD_BASE", defaults.upload_base),
        }
    }

    /// Both bases pointing at one host, e.g. a mock server.
    #[cfg(test)]
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            api_base: base.clone(),
            upload_base: base,
        }
    }

    fn files(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn file(&self, file_id: &str) -> String {
        format!("{}/drive/v3/files/{}", self.api_base, file_id)
    }

    fn upload(&self) -> String {
        format!("{}/upload/drive/v3/files", self.upload_base)
    }

    fn upload_file(&self, file_id: &str) -> String {
        format!("{}/upload/drive/v3/files/{}", self.upload_base, file_id)
    }
}

/// Google Drive v3 client. Exposes only the calls the sync workflow needs.
pub struct GoogleDriveClient {
    http: DriveRequestClient,
    endpoints: DriveEndpoints,
}

impl GoogleDriveClient {
    pub fn new(endpoints: DriveEndpoints) -> Result<Self, SyncError> {
        Ok(Self {
            http: DriveRequestClient::new()?,
            endpoints,
        })
    }

    fn metadata_json(metadata: &FileMetadata) -> Value {
        let mut value = json!({
            "name": metadata.name,
            "mimeType": metadata.mime_type,
        });
        if !metadata.parents.is_empty() {
            value["parents"] = json!(metadata.parents);
        }
        value
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, SyncError> {
        response.json::<T>().await.map_err(|e| SyncError::Api {
            status: 200,
            message: format!("Unexpected response from Google Drive: {}", e),
        })
    }
}

/// Escapes a value for use inside a single-quoted Drive query string.
fn quote_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl DriveApi for GoogleDriveClient {
    async fn find_app_data_file(
        &self,
        name: &str,
        token: &AccessToken,
    ) -> Result<Option<String>, SyncError> {
        let q = format!("name='{}' and trashed=false", quote_query_value(name));
        let response = self
            .http
            .call(
                Method::GET,
                &self.endpoints.files(),
                &[
                    ("spaces", APP_DATA_FOLDER),
                    ("q", &q),
                    ("fields", "files(id)"),
                ],
                RequestBody::Empty,
                token,
            )
            .await?;

        let list: ApiFileList = Self::parse(response).await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_file(
        &self,
        metadata: &FileMetadata,
        content: Option<&[u8]>,
        token: &AccessToken,
    ) -> Result<String, SyncError> {
        let response = match content {
            None => {
                self.http
                    .call(
                        Method::POST,
                        &self.endpoints.files(),
                        &[("fields", "id")],
                        RequestBody::Json(Self::metadata_json(metadata)),
                        token,
                    )
                    .await?
            }
            Some(bytes) => {
                self.http
                    .call(
                        Method::POST,
                        &self.endpoints.upload(),
                        &[("uploadType", "multipart"), ("fields", "id")],
                        RequestBody::Multipart {
                            metadata: Self::metadata_json(metadata),
                            content: bytes.to_vec(),
                            mime_type: metadata.mime_type.clone(),
                        },
                        token,
                    )
                    .await?
            }
        };

        let created: ApiFile = Self::parse(response).await?;
        tracing::debug!(file_id = %created.id, name = %metadata.name, "Drive file created");
        Ok(created.id)
    }

    async fn download(&self, file_id: &str, token: &AccessToken) -> Result<Vec<u8>, SyncError> {
        let response = self
            .http
            .call(
                Method::GET,
                &self.endpoints.file(file_id),
                &[("alt", "media")],
                RequestBody::Empty,
                token,
            )
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("Could not download file: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn update_content(
        &self,
        file_id: &str,
        content: &[u8],
        mime_type: &str,
        token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.http
            .call(
                Method::PATCH,
                &self.endpoints.upload_file(file_id),
                &[("uploadType", "multipart"), ("fields", "id")],
                RequestBody::Multipart {
                    metadata: json!({ "mimeType": mime_type }),
                    content: content.to_vec(),
                    mime_type: mime_type.to_string(),
                },
                token,
            )
            .await?;
        Ok(())
    }

    async fn rename(
        &self,
        file_id: &str,
        name: &str,
        token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.http
            .call(
                Method::PATCH,
                &self.endpoints.file(file_id),
                &[("fields", "id")],
                RequestBody::Json(json!({ "name": name })),
                token,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, file_id: &str, token: &AccessToken) -> Result<(), SyncError> {
        self.http
            .call(
                Method::DELETE,
                &self.endpoints.file(file_id),
                &[],
                RequestBody::Empty,
                token,
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiFileList {
    #[serde(default)]
    files: Vec<ApiFile>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    id: String,
}
