use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::config_models::{Config, CONFIG_FILE_NAME};
use crate::core::auth::AccessToken;
use crate::core::drive::{DriveApi, FileMetadata, JSON_MIME_TYPE};
use crate::core::errors::SyncError;

/// What the store remembers between messages. Lives exactly as long as the
/// store that owns it; tests get a fresh one per store.
#[derive(Debug, Default)]
pub struct ConfigCache {
    config: Option<Config>,
    file_id: Option<String>,
}

/// Locates, reads, writes and deletes the single config file in the user's
/// app data area, caching both the parsed content and the file id.
///
/// The cache lock is never held across a network call, so two handlers can
/// interleave reads and writes; the last write wins. Locating the file is
/// serialized by `locate`, which is held across find-then-create so only one
/// config file is ever created.
pub struct ConfigStore<D: DriveApi> {
    drive: Arc<D>,
    cache: RwLock<ConfigCache>,
    locate: Mutex<()>,
}

impl<D: DriveApi> ConfigStore<D> {
    pub fn new(drive: Arc<D>) -> Self {
        Self {
            drive,
            cache: RwLock::new(ConfigCache::default()),
            locate: Mutex::new(()),
        }
    }

    /// Returns the config file id, searching for it (and creating an empty
    /// config if none exists) only when the id is not cached yet.
    pub async fn locate_or_create(&self, token: &AccessToken) -> Result<String, SyncError> {
        if let Some(id) = self.cache.read().await.file_id.clone() {
            return Ok(id);
        }

        let _locating = self.locate.lock().await;
        // Another caller may have located the file while we waited.
        if let Some(id) = self.cache.read().await.file_id.clone() {
            return Ok(id);
        }

        if let Some(id) = self
            .drive
            .find_app_data_file(CONFIG_FILE_NAME, token)
            .await?
        {
            tracing::debug!(file_id = %id, "Found existing config file");
            self.cache.write().await.file_id = Some(id.clone());
            return Ok(id);
        }

        let empty = Config::default();
        let content = empty.to_pretty_json()?;
        let id = self
            .drive
            .create_file(
                &FileMetadata::app_data_json(CONFIG_FILE_NAME),
                Some(&content),
                token,
            )
            .await?;
        tracing::info!(file_id = %id, "Created config file");

        let mut cache = self.cache.write().await;
        cache.file_id = Some(id.clone());
        cache.config = Some(empty);
        Ok(id)
    }

    /// Returns the cached config, or downloads and parses it.
    pub async fn read(&self, token: &AccessToken) -> Result<Config, SyncError> {
        if let Some(config) = self.cache.read().await.config.clone() {
            return Ok(config);
        }

        let file_id = self.locate_or_create(token).await?;
        let bytes = match self.drive.download(&file_id, token).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                self.invalidate_file_id().await;
                return Err(SyncError::NotFound("Config file not found.".to_string()));
            }
            Err(err) => return Err(err),
        };

        let config = Config::parse(&bytes)?;
        self.cache.write().await.config = Some(config.clone());
        Ok(config)
    }

    /// Uploads `config` as the file content and makes it the cached value.
    pub async fn write(&self, config: &Config, token: &AccessToken) -> Result<(), SyncError> {
        let file_id = self.locate_or_create(token).await?;
        let content = config.to_pretty_json()?;

        match self
            .drive
            .update_content(&file_id, &content, JSON_MIME_TYPE, token)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                self.invalidate_file_id().await;
                return Err(SyncError::NotFound("Config file not found.".to_string()));
            }
            Err(err) => return Err(err),
        }

        self.cache.write().await.config = Some(config.clone());
        tracing::debug!(projects = config.projects.len(), "Config written");
        Ok(())
    }

    /// Removes the remote config file if there is one. Both caches are
    /// cleared whatever the remote outcome was.
    pub async fn delete(&self, token: &AccessToken) -> Result<(), SyncError> {
        let result = self.delete_remote(token).await;
        self.invalidate().await;
        result
    }

    async fn delete_remote(&self, token: &AccessToken) -> Result<(), SyncError> {
        let cached = self.cache.read().await.file_id.clone();
        let file_id = match cached {
            Some(id) => Some(id),
            None => {
                self.drive
                    .find_app_data_file(CONFIG_FILE_NAME, token)
                    .await?
            }
        };

        match file_id {
            Some(id) => match self.drive.delete(&id, token).await {
                Err(err) if err.is_not_found() => Ok(()),
                other => other,
            },
            None => Ok(()),
        }
    }

    /// Drops the cached config and file id.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.config = None;
        cache.file_id = None;
    }

    pub async fn invalidate_file_id(&self) {
        self.cache.write().await.file_id = None;
    }

    #[cfg(test)]
    pub async fn is_cached(&self) -> (bool, bool) {
        let cache = self.cache.read().await;
        (cache.config.is_some(), cache.file_id.is_some())
    }
}
