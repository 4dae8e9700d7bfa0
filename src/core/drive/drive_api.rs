use async_trait::async_trait;

use crate::core::auth::AccessToken;
use crate::core::errors::SyncError;

pub const PDF_MIME_TYPE: &str = "application/pdf";
pub const JSON_MIME_TYPE: &str = "application/json";

/// The private per-application area of the user's Drive.
pub const APP_DATA_FOLDER: &str = "appDataFolder";

/// Metadata sent when a new storage object is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    /// Empty means "the user's root folder".
    pub parents: Vec<String>,
}

impl FileMetadata {
    pub fn pdf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: PDF_MIME_TYPE.to_string(),
            parents: Vec::new(),
        }
    }

    pub fn app_data_json(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: JSON_MIME_TYPE.to_string(),
            parents: vec![APP_DATA_FOLDER.to_string()],
        }
    }
}

/// The storage operations the sync workflow needs.
///
/// Implementations normalize HTTP failures before returning:
/// - 401/403 become [`SyncError::Auth`]
/// - 404 becomes [`SyncError::NotFound`]
/// - any other non-2xx becomes [`SyncError::Api`] with the provider's message
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Looks up a non-trashed file by exact name in the app data area.
    async fn find_app_data_file(
        &self,
        name: &str,
        token: &AccessToken,
    ) -> Result<Option<String>, SyncError>;

    /// Creates a file and returns its id. `None` content creates a
    /// metadata-only object.
    async fn create_file(
        &self,
        metadata: &FileMetadata,
        content: Option<&[u8]>,
        token: &AccessToken,
    ) -> Result<String, SyncError>;

    async fn download(&self, file_id: &str, token: &AccessToken) -> Result<Vec<u8>, SyncError>;

    /// Replaces the content in place; the file id stays the same.
    async fn update_content(
        &self,
        file_id: &str,
        content: &[u8],
        mime_type: &str,
        token: &AccessToken,
    ) -> Result<(), SyncError>;

    async fn rename(&self, file_id: &str, name: &str, token: &AccessToken)
        -> Result<(), SyncError>;

    async fn delete(&self, file_id: &str, token: &AccessToken) -> Result<(), SyncError>;
}
