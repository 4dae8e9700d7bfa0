// In-memory stand-in for Google Drive, used by the core tests.
//
// Behaves like the real client for the calls the workflow makes: missing ids
// are NotFound, app data search matches on name and parent, and a single
// failure can be queued per operation to exercise error paths.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::auth::AccessToken;
use crate::core::drive::{DriveApi, FileMetadata, APP_DATA_FOLDER, PDF_MIME_TYPE};
use crate::core::errors::SyncError;

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum DriveOp {
    Find,
    Create,
    Download,
    Update,
    Rename,
    Delete,
}

#[derive(Clone, Debug)]
pub struct StoredFile {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
    pub content: Vec<u8>,
}

pub struct InMemoryDrive {
    files: DashMap<String, StoredFile>,
    calls: DashMap<DriveOp, usize>,
    failures: DashMap<DriveOp, SyncError>,
    next_id: AtomicUsize,
}

impl InMemoryDrive {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
            calls: DashMap::new(),
            failures: DashMap::new(),
            next_id: AtomicUsize::new(1),
        }
    }

    /// How many times `op` has been called, including failed calls.
    pub fn calls(&self, op: DriveOp) -> usize {
        self.calls.get(&op).map(|count| *count).unwrap_or(0)
    }

    pub fn file(&self, file_id: &str) -> Option<StoredFile> {
        self.files.get(file_id).map(|entry| entry.clone())
    }

    pub fn seed_app_data_file(&self, name: &str, content: &[u8]) -> String {
        self.insert(StoredFile {
            name: name.to_string(),
            mime_type: "application/json".to_string(),
            parents: vec![APP_DATA_FOLDER.to_string()],
            content: content.to_vec(),
        })
    }

    pub fn seed_file(&self, name: &str, content: &[u8]) -> String {
        self.insert(StoredFile {
            name: name.to_string(),
            mime_type: PDF_MIME_TYPE.to_string(),
            parents: Vec::new(),
            content: content.to_vec(),
        })
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: DriveOp, err: SyncError) {
        self.failures.insert(op, err);
    }

    fn insert(&self, file: StoredFile) -> String {
        let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.files.insert(id.clone(), file);
        id
    }

    fn record(&self, op: DriveOp) -> Result<(), SyncError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.remove(&op) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    fn missing(file_id: &str) -> SyncError {
        SyncError::NotFound(format!("File not found: {}.", file_id))
    }
}

#[async_trait]
impl DriveApi for InMemoryDrive {
    async fn find_app_data_file(
        &self,
        name: &str,
        _token: &AccessToken,
    ) -> Result<Option<String>, SyncError> {
        self.record(DriveOp::Find)?;
        // Suspend like a real request so concurrent callers interleave here.
        tokio::task::yield_now().await;
        // Lowest id first so the result does not depend on map iteration order.
        let mut matches: Vec<String> = self
            .files
            .iter()
            .filter(|entry| {
                entry.name == name && entry.parents.iter().any(|p| p == APP_DATA_FOLDER)
            })
            .map(|entry| entry.key().clone())
            .collect();
        matches.sort_by_key(|id| {
            id.trim_start_matches("file-")
                .parse::<usize>()
                .unwrap_or(usize::MAX)
        });
        Ok(matches.into_iter().next())
    }

    async fn create_file(
        &self,
        metadata: &FileMetadata,
        content: Option<&[u8]>,
        _token: &AccessToken,
    ) -> Result<String, SyncError> {
        self.record(DriveOp::Create)?;
        Ok(self.insert(StoredFile {
            name: metadata.name.clone(),
            mime_type: metadata.mime_type.clone(),
            parents: metadata.parents.clone(),
            content: content.map(<[u8]>::to_vec).unwrap_or_default(),
        }))
    }

    async fn download(&self, file_id: &str, _token: &AccessToken) -> Result<Vec<u8>, SyncError> {
        self.record(DriveOp::Download)?;
        self.file(file_id)
            .map(|file| file.content)
            .ok_or_else(|| Self::missing(file_id))
    }

    async fn update_content(
        &self,
        file_id: &str,
        content: &[u8],
        mime_type: &str,
        _token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.record(DriveOp::Update)?;
        let mut file = self
            .files
            .get_mut(file_id)
            .ok_or_else(|| Self::missing(file_id))?;
        file.content = content.to_vec();
        file.mime_type = mime_type.to_string();
        Ok(())
    }

    async fn rename(
        &self,
        file_id: &str,
        name: &str,
        _token: &AccessToken,
    ) -> Result<(), SyncError> {
        self.record(DriveOp::Rename)?;
        let mut file = self
            .files
            .get_mut(file_id)
            .ok_or_else(|| Self::missing(file_id))?;
        file.name = name.to_string();
        Ok(())
    }

    async fn delete(&self, file_id: &str, _token: &AccessToken) -> Result<(), SyncError> {
        self.record(DriveOp::Delete)?;
        self.files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| Self::missing(file_id))
    }
}
