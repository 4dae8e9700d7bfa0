// Project repository: pure mutations on an in-memory Config.
// Persisting (ConfigStore::write) and touching the remote file are the
// caller's job, in that order: remote first, then local, then write.

use crate::core::config::{Config, ProjectEntry};
use crate::core::errors::SyncError;

fn normalized_name(name: &str) -> Result<String, SyncError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidRequest(
            "Project name cannot be empty.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn not_found(id: &str) -> SyncError {
    SyncError::NotFound(format!("Project '{}' is not linked.", id))
}

/// Inserts or replaces the entry for `id`.
pub fn upsert(
    config: &mut Config,
    id: &str,
    name: &str,
    drive_file_id: &str,
) -> Result<(), SyncError> {
    let name = normalized_name(name)?;
    config.projects.insert(
        id.to_string(),
        ProjectEntry {
            name,
            drive_file_id: drive_file_id.to_string(),
        },
    );
    Ok(())
}

/// Renames an existing entry. The config is untouched on failure.
pub fn rename(config: &mut Config, id: &str, new_name: &str) -> Result<(), SyncError> {
    let new_name = normalized_name(new_name)?;
    let entry = config.projects.get_mut(id).ok_or_else(|| not_found(id))?;
    entry.name = new_name;
    Ok(())
}

/// Removes an entry and returns it.
pub fn remove(config: &mut Config, id: &str) -> Result<ProjectEntry, SyncError> {
    config.projects.remove(id).ok_or_else(|| not_found(id))
}
