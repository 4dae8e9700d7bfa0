// Orchestration for every UI action: get a token, read the config, move the
// artifact, write the config. No framing or HTTP types in here, so the whole
// workflow runs in tests against in-memory fakes.

use std::sync::Arc;

use super::sync_models::{
    DeleteOutcome, LinkTarget, ProgressSink, SaveOutcome, SaveProject, SessionView, StageTracker,
    SyncStage,
};
use crate::core::auth::{AccessToken, TokenProvider};
use crate::core::config::{Config, ConfigStore, Project};
use crate::core::drive::DriveApi;
use crate::core::errors::SyncError;
use crate::core::projects;
use crate::core::transfer::{ArtifactFetcher, ArtifactTransfer, DocumentPageAccessor};

pub struct SyncService<T: TokenProvider, D: DriveApi, F: ArtifactFetcher> {
    tokens: T,
    store: ConfigStore<D>,
    transfer: ArtifactTransfer<D, F>,
}

fn required(value: &str, what: &str) -> Result<String, SyncError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidRequest(format!("{} cannot be empty.", what)));
    }
    Ok(trimmed.to_string())
}

fn linked_project(config: &Config, project_id: &str) -> Result<Project, SyncError> {
    config.get(project_id).ok_or_else(|| {
        SyncError::NotFound(format!("Project '{}' is not linked.", project_id))
    })
}

impl<T, D, F> SyncService<T, D, F>
where
    T: TokenProvider,
    D: DriveApi,
    F: ArtifactFetcher,
{
    pub fn new(tokens: T, drive: Arc<D>, fetcher: F) -> Self {
        Self {
            tokens,
            store: ConfigStore::new(Arc::clone(&drive)),
            transfer: ArtifactTransfer::new(drive, fetcher),
        }
    }

    /// A rejected credential poisons everything derived from it: drop the
    /// token and both caches so the next call starts from scratch.
    async fn guard<R>(&self, result: Result<R, SyncError>) -> Result<R, SyncError> {
        if let Err(err) = &result {
            if err.is_auth() {
                tracing::warn!("Credential rejected, clearing session state: {}", err);
                self.clear_session().await;
            }
        }
        result
    }

    async fn clear_session(&self) {
        self.tokens.forget().await;
        self.store.invalidate().await;
    }

    async fn finish<R>(
        &self,
        result: Result<R, SyncError>,
        tracker: &mut StageTracker<'_>,
    ) -> Result<R, SyncError> {
        let result = self.guard(result).await;
        match &result {
            Ok(_) => tracker.advance(SyncStage::Done),
            Err(err) => tracker.fail(err),
        }
        result
    }

    async fn sign_in(&self, tracker: &mut StageTracker<'_>) -> Result<AccessToken, SyncError> {
        tracker.advance(SyncStage::Authenticating);
        self.tokens.acquire(true).await
    }

    async fn read_config(
        &self,
        token: &AccessToken,
        tracker: &mut StageTracker<'_>,
    ) -> Result<Config, SyncError> {
        tracker.advance(SyncStage::ReadingConfig);
        self.store.read(token).await
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    /// Silent check used when a UI surface opens. A missing or rejected
    /// token is "signed out", not an error.
    pub async fn initial_state(&self) -> Result<SessionView, SyncError> {
        let signed_out = SessionView {
            authenticated: false,
            config: None,
        };

        let token = match self.tokens.acquire(false).await {
            Ok(token) => token,
            Err(err) if err.is_auth() => return Ok(signed_out),
            Err(err) => return Err(err),
        };

        let result = self.store.read(&token).await;
        match self.guard(result).await {
            Ok(config) => Ok(SessionView {
                authenticated: true,
                config: Some(config),
            }),
            Err(err) if err.is_auth() => Ok(signed_out),
            Err(err) => Err(err),
        }
    }

    /// Interactive sign-in followed by a config read.
    pub async fn login(&self) -> Result<Config, SyncError> {
        let result = async {
            let token = self.tokens.acquire(true).await?;
            self.store.read(&token).await
        }
        .await;
        self.guard(result).await
    }

    pub async fn logout(&self) {
        if let Ok(token) = self.tokens.acquire(false).await {
            self.tokens.revoke(&token).await;
        }
        self.clear_session().await;
        tracing::info!("Signed out");
    }

    /// Deletes the remote config file, then signs out.
    pub async fn reset(&self) -> Result<(), SyncError> {
        let token = self.guard(self.tokens.acquire(true).await).await?;

        if let Err(err) = self.store.delete(&token).await {
            tracing::warn!("Could not delete config file during reset: {}", err);
        }
        self.tokens.revoke(&token).await;
        self.clear_session().await;
        tracing::info!("Config reset");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    pub async fn save_project(
        &self,
        request: SaveProject<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<SaveOutcome, SyncError> {
        let mut tracker = StageTracker::new(progress);
        let result = self.save_project_inner(request, &mut tracker).await;
        self.finish(result, &mut tracker).await
    }

    async fn save_project_inner(
        &self,
        request: SaveProject<'_>,
        tracker: &mut StageTracker<'_>,
    ) -> Result<SaveOutcome, SyncError> {
        let project_id = required(&request.project_id, "Project id")?;
        let name = required(&request.name, "Project name")?;

        let token = self.sign_in(tracker).await?;
        let mut config = self.read_config(&token, tracker).await?;

        tracker.advance(SyncStage::TransferringArtifact);
        let drive_file_id = match request.target {
            LinkTarget::CreateFromPage(page) => {
                let url = self.transfer.extract_download_link(page).await?;
                let bytes = self.transfer.fetch_bytes(&url).await?;
                self.transfer
                    .create_remote_file(&name, &bytes, &token)
                    .await?
            }
            LinkTarget::CreateEmpty => {
                self.transfer
                    .create_empty_remote_file(&name, &token)
                    .await?
            }
            LinkTarget::Existing(file_id) => required(&file_id, "Drive file id")?,
        };

        tracker.advance(SyncStage::PersistingConfig);
        projects::upsert(&mut config, &project_id, &name, &drive_file_id)?;
        self.store.write(&config, &token).await?;

        tracing::info!(%project_id, %drive_file_id, "Project saved");
        Ok(SaveOutcome {
            config,
            drive_file_id,
        })
    }

    /// Renames the remote file first, then the local entry.
    pub async fn edit_project(
        &self,
        project_id: &str,
        new_name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<Config, SyncError> {
        let mut tracker = StageTracker::new(progress);
        let result = self
            .edit_project_inner(project_id, new_name, &mut tracker)
            .await;
        self.finish(result, &mut tracker).await
    }

    async fn edit_project_inner(
        &self,
        project_id: &str,
        new_name: &str,
        tracker: &mut StageTracker<'_>,
    ) -> Result<Config, SyncError> {
        let new_name = required(new_name, "Project name")?;

        let token = self.sign_in(tracker).await?;
        let mut config = self.read_config(&token, tracker).await?;
        let project = linked_project(&config, project_id)?;

        tracker.advance(SyncStage::TransferringArtifact);
        self.transfer
            .rename_remote_file(&project.drive_file_id, &new_name, &token)
            .await?;

        tracker.advance(SyncStage::PersistingConfig);
        projects::rename(&mut config, project_id, &new_name)?;
        self.store.write(&config, &token).await?;

        tracing::info!(%project_id, "Project renamed");
        Ok(config)
    }

    /// Deletes the remote file, then the local entry. A remote file that is
    /// already gone still gets its dangling local entry removed.
    pub async fn delete_project(
        &self,
        project_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<DeleteOutcome, SyncError> {
        let mut tracker = StageTracker::new(progress);
        let result = self.delete_project_inner(project_id, &mut tracker).await;
        self.finish(result, &mut tracker).await
    }

    async fn delete_project_inner(
        &self,
        project_id: &str,
        tracker: &mut StageTracker<'_>,
    ) -> Result<DeleteOutcome, SyncError> {
        let token = self.sign_in(tracker).await?;
        let mut config = self.read_config(&token, tracker).await?;
        let project = linked_project(&config, project_id)?;

        tracker.advance(SyncStage::TransferringArtifact);
        let stale_link = match self
            .transfer
            .delete_remote_file(&project.drive_file_id, &token)
            .await
        {
            Ok(()) => false,
            Err(err) if err.is_not_found() => {
                tracing::warn!(
                    %project_id,
                    drive_file_id = %project.drive_file_id,
                    "Remote file already gone, removing stale link"
                );
                true
            }
            Err(err) => return Err(err),
        };

        tracker.advance(SyncStage::PersistingConfig);
        projects::remove(&mut config, project_id)?;
        self.store.write(&config, &token).await?;

        tracing::info!(%project_id, stale_link, "Project deleted");
        Ok(DeleteOutcome { config, stale_link })
    }

    /// Pushes the freshly compiled PDF into the project's existing file.
    pub async fn sync_project(
        &self,
        project_id: &str,
        page: &dyn DocumentPageAccessor,
        progress: &dyn ProgressSink,
    ) -> Result<Config, SyncError> {
        let mut tracker = StageTracker::new(progress);
        let result = self.sync_project_inner(project_id, page, &mut tracker).await;
        self.finish(result, &mut tracker).await
    }

    async fn sync_project_inner(
        &self,
        project_id: &str,
        page: &dyn DocumentPageAccessor,
        tracker: &mut StageTracker<'_>,
    ) -> Result<Config, SyncError> {
        let token = self.sign_in(tracker).await?;
        let config = self.read_config(&token, tracker).await?;
        let project = linked_project(&config, project_id)?;

        tracker.advance(SyncStage::TransferringArtifact);
        let url = self.transfer.extract_download_link(page).await?;
        let bytes = self.transfer.fetch_bytes(&url).await?;
        self.transfer
            .update_remote_file(&project.drive_file_id, &bytes, &token)
            .await?;
        self.transfer
            .rename_remote_file(&project.drive_file_id, &project.name, &token)
            .await?;

        tracing::info!(project_id = %project.id, bytes = bytes.len(), "Project synced");
        Ok(config)
    }

    /// Legacy upload: the caller already knows both the PDF URL and the
    /// target file. A failed rename does not fail the upload.
    pub async fn upload(
        &self,
        pdf_url: &str,
        drive_file_id: &str,
        new_file_name: Option<&str>,
    ) -> Result<(), SyncError> {
        let result = async {
            let token = self.tokens.acquire(true).await?;
            let bytes = self.transfer.fetch_bytes(pdf_url).await?;
            self.transfer
                .update_remote_file(drive_file_id, &bytes, &token)
                .await?;

            if let Some(name) = new_file_name.filter(|n| !n.trim().is_empty()) {
                if let Err(err) = self
                    .transfer
                    .rename_remote_file(drive_file_id, name, &token)
                    .await
                {
                    tracing::warn!(%drive_file_id, "Uploaded but rename failed: {}", err);
                }
            }
            Ok::<(), SyncError>(())
        }
        .await;
        self.guard(result).await
    }
}
