// Wire shapes exchanged with the extension.
//
// Two families share the channel: side-panel requests carry a kebab-case
// `type`, popup requests carry a snake_case `action`. Each family has its own
// reply envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::{Config, LegacyProject, ProjectEntry};
use crate::core::sync::SyncStage;
use crate::infra::page::PageSnapshot;

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PanelRequest {
    GetInitialState,
    Login,
    Logout,
    Reset,
    #[serde(rename_all = "camelCase")]
    SaveProject {
        project_id: String,
        name: String,
        #[serde(default)]
        create_new: bool,
        #[serde(default)]
        drive_file_id: Option<String>,
        #[serde(default)]
        drive_url: Option<String>,
        #[serde(default)]
        page: Option<PageSnapshot>,
    },
    #[serde(rename_all = "camelCase")]
    EditProject { project_id: String, new_name: String },
    #[serde(rename_all = "camelCase")]
    DeleteProject { project_id: String },
    #[serde(rename_all = "camelCase")]
    SyncProject {
        project_id: String,
        page: PageSnapshot,
    },
}

/// Project fields of `add_project`, sent either inline or under `projectData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProjectFields {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub overleaf_project_id: Option<String>,
    #[serde(default)]
    pub create_new: bool,
    #[serde(default)]
    pub drive_file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LegacyRequest {
    GetConfig,
    #[serde(rename_all = "camelCase")]
    AddProject {
        #[serde(default)]
        project_name: Option<String>,
        #[serde(default)]
        overleaf_project_id: Option<String>,
        #[serde(default)]
        create_new: bool,
        #[serde(default)]
        drive_file_id: Option<String>,
        #[serde(default)]
        project_data: Option<LegacyProjectFields>,
    },
    #[serde(rename_all = "camelCase")]
    Upload {
        pdf_url: String,
        drive_file_id: String,
        #[serde(default)]
        new_file_name: Option<String>,
    },
    ResetAuth,
}

const LEGACY_ACTIONS: [&str; 4] = ["get_config", "add_project", "upload", "reset_auth"];

impl LegacyRequest {
    /// The `add_project` fields, preferring the nested `projectData` form.
    pub fn project_fields(&self) -> Option<LegacyProjectFields> {
        match self {
            LegacyRequest::AddProject {
                project_data: Some(data),
                ..
            } => Some(data.clone()),
            LegacyRequest::AddProject {
                project_name,
                overleaf_project_id,
                create_new,
                drive_file_id,
                project_data: None,
            } => Some(LegacyProjectFields {
                project_name: project_name.clone(),
                overleaf_project_id: overleaf_project_id.clone(),
                create_new: *create_new,
                drive_file_id: drive_file_id.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Panel,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Panel(PanelRequest),
    Legacy(LegacyRequest),
    /// Could not be turned into a request; answered in `family`'s envelope.
    Invalid { family: Family, reason: String },
}

/// One decoded inbound frame plus its optional correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub request_id: Option<u64>,
    pub body: Inbound,
}

impl InboundMessage {
    pub fn invalid(request_id: Option<u64>, family: Family, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            body: Inbound::Invalid {
                family,
                reason: reason.into(),
            },
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Self::from_value(value),
            Err(e) => Self::invalid(None, Family::Panel, format!("Invalid JSON message: {}", e)),
        }
    }

    /// Classifies a JSON value into a family and decodes it. Never fails:
    /// anything unusable becomes [`Inbound::Invalid`].
    pub fn from_value(value: Value) -> Self {
        let request_id = value.get("requestId").and_then(Value::as_u64);

        if value.get("type").is_some() {
            return match serde_json::from_value::<PanelRequest>(value) {
                Ok(request) => Self {
                    request_id,
                    body: Inbound::Panel(request),
                },
                Err(e) => Self::invalid(request_id, Family::Panel, format!("Invalid request: {}", e)),
            };
        }

        if let Some(action) = value.get("action") {
            let known = action
                .as_str()
                .is_some_and(|a| LEGACY_ACTIONS.contains(&a));
            if !known {
                return Self::invalid(request_id, Family::Legacy, "Unknown action");
            }
            return match serde_json::from_value::<LegacyRequest>(value) {
                Ok(request) => Self {
                    request_id,
                    body: Inbound::Legacy(request),
                },
                Err(e) => Self::invalid(request_id, Family::Legacy, format!("Invalid request: {}", e)),
            };
        }

        Self::invalid(
            request_id,
            Family::Panel,
            "Message has neither a type nor an action.",
        )
    }
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// `{status, message?, projects?, authenticated?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelReply {
    pub status: ReplyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<BTreeMap<String, ProjectEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
}

impl PanelReply {
    pub fn success() -> Self {
        Self {
            status: ReplyStatus::Success,
            message: None,
            projects: None,
            authenticated: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
            projects: None,
            authenticated: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_projects(mut self, config: Config) -> Self {
        self.projects = Some(config.projects);
        self
    }

    pub fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = Some(authenticated);
        self
    }
}

/// `{success, data?, error?, newFileId?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_file_id: Option<String>,
}

#[derive(Serialize)]
struct LegacyConfigData<'a> {
    projects: &'a [LegacyProject],
}

impl LegacyReply {
    pub fn success() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            new_file_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            new_file_id: None,
        }
    }

    /// `data = {projects: [{projectName, overleafProjectId, driveFileId}]}`
    pub fn with_config(mut self, config: &Config) -> Self {
        let projects = config.legacy_view();
        self.data = serde_json::to_value(LegacyConfigData {
            projects: &projects,
        })
        .ok();
        self
    }
}

/// Progress broadcast for a long-running request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub stage: &'static str,
    pub message: String,
}

impl StatusUpdate {
    pub fn from_stage(stage: &SyncStage) -> Self {
        Self {
            kind: "status-update",
            stage: stage.label(),
            message: stage.message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundBody {
    Panel(PanelReply),
    Legacy(LegacyReply),
    Status(StatusUpdate),
}

/// Anything the host writes to the extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(flatten)]
    pub body: OutboundBody,
}

impl OutboundFrame {
    pub fn new(request_id: Option<u64>, body: OutboundBody) -> Self {
        Self { request_id, body }
    }
}
