use std::sync::Arc;

use async_trait::async_trait;

use super::links::pdf_file_name;
use crate::core::auth::AccessToken;
use crate::core::drive::{DriveApi, FileMetadata, PDF_MIME_TYPE};
use crate::core::errors::SyncError;

/// Read access to the active editor page, implemented by whatever scripting
/// layer can see the page.
#[async_trait]
pub trait DocumentPageAccessor: Send + Sync {
    /// URL of the page, if known.
    fn page_url(&self) -> Option<&str>;

    /// Absolute URL of the compiled PDF, or `None` when the page does not
    /// offer a download yet.
    async fn find_download_link(&self) -> Result<Option<String>, SyncError>;
}

/// Fetches the compiled artifact's bytes.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError>;
}

/// Moves compiled PDFs from the editor page into Drive files.
pub struct ArtifactTransfer<D: DriveApi, F: ArtifactFetcher> {
    drive: Arc<D>,
    fetcher: F,
}

impl<D: DriveApi, F: ArtifactFetcher> ArtifactTransfer<D, F> {
    pub fn new(drive: Arc<D>, fetcher: F) -> Self {
        Self { drive, fetcher }
    }

    pub async fn extract_download_link(
        &self,
        page: &dyn DocumentPageAccessor,
    ) -> Result<String, SyncError> {
        page.find_download_link().await?.ok_or_else(|| {
            SyncError::NotFound(
                "Could not find PDF link. Please recompile the project.".to_string(),
            )
        })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        tracing::debug!(bytes = bytes.len(), "Fetched artifact");
        Ok(bytes)
    }

    /// Creates a new PDF in the user's Drive from `bytes`.
    pub async fn create_remote_file(
        &self,
        name: &str,
        bytes: &[u8],
        token: &AccessToken,
    ) -> Result<String, SyncError> {
        let metadata = FileMetadata::pdf(pdf_file_name(name));
        self.drive.create_file(&metadata, Some(bytes), token).await
    }

    /// Creates an empty PDF placeholder; the first sync fills it.
    pub async fn create_empty_remote_file(
        &self,
        name: &str,
        token: &AccessToken,
    ) -> Result<String, SyncError> {
        let metadata = FileMetadata::pdf(pdf_file_name(name));
        self.drive.create_file(&metadata, None, token).await
    }

    /// Replaces the content of an existing file, keeping its id and shares.
    pub async fn update_remote_file(
        &self,
        file_id: &str,
        bytes: &[u8],
        token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.drive
            .update_content(file_id, bytes, PDF_MIME_TYPE, token)
            .await
    }

    pub async fn rename_remote_file(
        &self,
        file_id: &str,
        new_name: &str,
        token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.drive
            .rename(file_id, &pdf_file_name(new_name), token)
            .await
    }

    /// Fails with [`SyncError::NotFound`] when the file is already gone.
    pub async fn delete_remote_file(
        &self,
        file_id: &str,
        token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.drive.delete(file_id, token).await
    }
}
