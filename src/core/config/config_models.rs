use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::errors::SyncError;

/// Fixed name of the config file in the app data area.
pub const CONFIG_FILE_NAME: &str = "overdrive-config.json";

/// One linked project as stored in the config file. The project id is the
/// map key, so it is not repeated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    #[serde(rename = "driveFileId")]
    pub drive_file_id: String,
}

/// A project with its id attached, for callers that need all three fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub drive_file_id: String,
}

/// Entry shape written by the first release: a list instead of a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProject {
    pub project_name: String,
    pub overleaf_project_id: String,
    pub drive_file_id: String,
}

/// The whole config file.
///
/// Serialized as `{"projects": {"<id>": {"name": .., "driveFileId": ..}}}`.
/// Reading also accepts the legacy list form; the next write upgrades it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct Config {
    pub projects: BTreeMap<String, ProjectEntry>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    projects: RawProjects,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProjects {
    Mapping(BTreeMap<String, ProjectEntry>),
    List(Vec<LegacyProject>),
}

impl Default for RawProjects {
    fn default() -> Self {
        RawProjects::Mapping(BTreeMap::new())
    }
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let projects = match raw.projects {
            RawProjects::Mapping(map) => map,
            // Later entries win, same as the old filter-then-push upsert.
            RawProjects::List(list) => list
                .into_iter()
                .map(|p| {
                    (
                        p.overleaf_project_id,
                        ProjectEntry {
                            name: p.project_name,
                            drive_file_id: p.drive_file_id,
                        },
                    )
                })
                .collect(),
        };
        Config { projects }
    }
}

impl Config {
    /// Parses file content. Blank content (a freshly created, metadata-only
    /// file) is an empty config; anything else that fails to parse is an error.
    pub fn parse(bytes: &[u8]) -> Result<Self, SyncError> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Config::default());
        }
        serde_json::from_slice(bytes).map_err(|e| SyncError::MalformedConfig(e.to_string()))
    }

    pub fn to_pretty_json(&self) -> Result<Vec<u8>, SyncError> {
        serde_json::to_vec_pretty(self).map_err(|e| SyncError::MalformedConfig(e.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Project> {
        self.projects.get(id).map(|entry| Project {
            id: id.to_string(),
            name: entry.name.clone(),
            drive_file_id: entry.drive_file_id.clone(),
        })
    }

    /// List view used by the legacy popup, ordered by project id.
    pub fn legacy_view(&self) -> Vec<LegacyProject> {
        self.projects
            .iter()
            .map(|(id, entry)| LegacyProject {
                project_name: entry.name.clone(),
                overleaf_project_id: id.clone(),
                drive_file_id: entry.drive_file_id.clone(),
            })
            .collect()
    }
}
