// Turns decoded requests into service calls and service results into replies.
// Every error ends up in the family's error envelope; nothing here panics on
// bad input.

use tokio::sync::mpsc::UnboundedSender;

use super::protocol::{
    Family, Inbound, InboundMessage, LegacyReply, LegacyRequest, OutboundBody, OutboundFrame,
    PanelReply, PanelRequest, StatusUpdate,
};
use crate::core::auth::TokenProvider;
use crate::core::drive::DriveApi;
use crate::core::errors::SyncError;
use crate::core::sync::{LinkTarget, NoProgress, ProgressSink, SaveProject, SyncService, SyncStage};
use crate::core::transfer::links::{
    drive_file_id_from_link, is_drive_file_id, is_project_page, project_id_from_url,
};
use crate::core::transfer::{ArtifactFetcher, DocumentPageAccessor};
use crate::infra::page::{PageSnapshot, SnapshotPageAccessor};

/// Forwards stage transitions to the extension as `status-update` frames.
pub struct ChannelProgress {
    request_id: Option<u64>,
    outbound: UnboundedSender<OutboundFrame>,
}

impl ChannelProgress {
    pub fn new(request_id: Option<u64>, outbound: UnboundedSender<OutboundFrame>) -> Self {
        Self {
            request_id,
            outbound,
        }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, stage: &SyncStage) {
        let frame = OutboundFrame::new(
            self.request_id,
            OutboundBody::Status(StatusUpdate::from_stage(stage)),
        );
        // The writer only goes away at shutdown; a lost broadcast is harmless then.
        let _ = self.outbound.send(frame);
    }
}

pub struct MessageRouter<T: TokenProvider, D: DriveApi, F: ArtifactFetcher> {
    sync: SyncService<T, D, F>,
}

fn invalid(message: &str) -> SyncError {
    SyncError::InvalidRequest(message.to_string())
}

/// Page accessor for a save/sync request. The page must be the editor of
/// `project_id`; anything else is refused before a byte is fetched.
fn page_accessor(project_id: &str, page: PageSnapshot) -> Result<SnapshotPageAccessor, SyncError> {
    let accessor = SnapshotPageAccessor::new(page);
    let url = accessor
        .page_url()
        .filter(|url| is_project_page(url))
        .ok_or_else(|| invalid("Please open an Overleaf project first."))?;
    if project_id_from_url(url).as_deref() != Some(project_id) {
        return Err(invalid(
            "The open editor tab belongs to a different project. Switch to it and try again.",
        ));
    }
    Ok(accessor)
}

fn checked_file_id(id: &str) -> Result<String, SyncError> {
    let id = id.trim();
    if is_drive_file_id(id) {
        Ok(id.to_string())
    } else {
        Err(invalid("Invalid Google Drive file id."))
    }
}

fn existing_file_id(
    drive_file_id: Option<String>,
    drive_url: Option<String>,
) -> Result<String, SyncError> {
    if let Some(id) = drive_file_id.filter(|id| !id.trim().is_empty()) {
        return checked_file_id(&id);
    }
    let link = drive_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| invalid("A Google Drive file link is required."))?;
    drive_file_id_from_link(&link)
        .ok_or_else(|| invalid("Invalid or unrecognized Google Drive link format."))
}

impl<T, D, F> MessageRouter<T, D, F>
where
    T: TokenProvider,
    D: DriveApi,
    F: ArtifactFetcher,
{
    pub fn new(sync: SyncService<T, D, F>) -> Self {
        Self { sync }
    }

    /// Handles one message and returns its reply. Progress broadcasts go
    /// straight to `outbound` while the handler runs.
    pub async fn handle(
        &self,
        message: InboundMessage,
        outbound: &UnboundedSender<OutboundFrame>,
    ) -> OutboundFrame {
        let request_id = message.request_id;
        let body = match message.body {
            Inbound::Panel(request) => {
                let progress = ChannelProgress::new(request_id, outbound.clone());
                OutboundBody::Panel(self.handle_panel(request, &progress).await)
            }
            Inbound::Legacy(request) => OutboundBody::Legacy(self.handle_legacy(request).await),
            Inbound::Invalid { family, reason } => {
                tracing::warn!(?family, "Rejected message: {}", reason);
                match family {
                    Family::Panel => OutboundBody::Panel(PanelReply::error(reason)),
                    Family::Legacy => OutboundBody::Legacy(LegacyReply::error(reason)),
                }
            }
        };
        OutboundFrame::new(request_id, body)
    }

    async fn handle_panel(&self, request: PanelRequest, progress: &dyn ProgressSink) -> PanelReply {
        let kind = panel_kind(&request);
        match self.run_panel(request, progress).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(request = kind, "Request failed: {}", err);
                PanelReply::error(err.to_string())
            }
        }
    }

    async fn run_panel(
        &self,
        request: PanelRequest,
        progress: &dyn ProgressSink,
    ) -> Result<PanelReply, SyncError> {
        match request {
            PanelRequest::GetInitialState => {
                let session = self.sync.initial_state().await?;
                let reply = PanelReply::success().with_authenticated(session.authenticated);
                Ok(match session.config {
                    Some(config) => reply.with_projects(config),
                    None => reply,
                })
            }
            PanelRequest::Login => {
                let config = self.sync.login().await?;
                Ok(PanelReply::success()
                    .with_authenticated(true)
                    .with_projects(config))
            }
            PanelRequest::Logout => {
                self.sync.logout().await;
                Ok(PanelReply::success()
                    .with_authenticated(false)
                    .with_message("Signed out."))
            }
            PanelRequest::Reset => {
                self.sync.reset().await?;
                Ok(PanelReply::success()
                    .with_authenticated(false)
                    .with_message("Config reset. You have been signed out."))
            }
            PanelRequest::SaveProject {
                project_id,
                name,
                create_new,
                drive_file_id,
                drive_url,
                page,
            } => {
                let accessor = match (create_new, page) {
                    (true, Some(page)) => Some(page_accessor(&project_id, page)?),
                    (true, None) => {
                        return Err(invalid("The editor page is required to create a new PDF."))
                    }
                    (false, _) => None,
                };
                let target = match &accessor {
                    Some(accessor) => LinkTarget::CreateFromPage(accessor),
                    None => LinkTarget::Existing(existing_file_id(drive_file_id, drive_url)?),
                };

                let outcome = self
                    .sync
                    .save_project(
                        SaveProject {
                            project_id,
                            name,
                            target,
                        },
                        progress,
                    )
                    .await?;
                Ok(PanelReply::success()
                    .with_message("Project saved.")
                    .with_projects(outcome.config))
            }
            PanelRequest::EditProject {
                project_id,
                new_name,
            } => {
                let config = self
                    .sync
                    .edit_project(&project_id, &new_name, progress)
                    .await?;
                Ok(PanelReply::success()
                    .with_message("Project renamed.")
                    .with_projects(config))
            }
            PanelRequest::DeleteProject { project_id } => {
                let outcome = self.sync.delete_project(&project_id, progress).await?;
                let message = if outcome.stale_link {
                    "The Drive file was already gone. Removed the link."
                } else {
                    "Project deleted."
                };
                Ok(PanelReply::success()
                    .with_message(message)
                    .with_projects(outcome.config))
            }
            PanelRequest::SyncProject { project_id, page } => {
                let accessor = page_accessor(&project_id, page)?;
                let config = self
                    .sync
                    .sync_project(&project_id, &accessor, progress)
                    .await?;
                Ok(PanelReply::success()
                    .with_message("PDF synced to Google Drive.")
                    .with_projects(config))
            }
        }
    }

    async fn handle_legacy(&self, request: LegacyRequest) -> LegacyReply {
        let kind = legacy_kind(&request);
        match self.run_legacy(request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(action = kind, "Request failed: {}", err);
                LegacyReply::error(err.to_string())
            }
        }
    }

    async fn run_legacy(&self, request: LegacyRequest) -> Result<LegacyReply, SyncError> {
        match request {
            LegacyRequest::GetConfig => {
                let config = self.sync.login().await?;
                Ok(LegacyReply::success().with_config(&config))
            }
            LegacyRequest::AddProject { .. } => {
                let fields = request.project_fields().unwrap_or_default();
                let project_id = fields
                    .overleaf_project_id
                    .ok_or_else(|| invalid("Overleaf project id is required."))?;
                let name = fields
                    .project_name
                    .ok_or_else(|| invalid("Project name is required."))?;
                let target = if fields.create_new {
                    LinkTarget::CreateEmpty
                } else {
                    LinkTarget::Existing(existing_file_id(fields.drive_file_id, None)?)
                };

                let outcome = self
                    .sync
                    .save_project(
                        SaveProject {
                            project_id,
                            name,
                            target,
                        },
                        &NoProgress,
                    )
                    .await?;

                let mut reply = LegacyReply::success().with_config(&outcome.config);
                if fields.create_new {
                    reply.new_file_id = Some(outcome.drive_file_id);
                }
                Ok(reply)
            }
            LegacyRequest::Upload {
                pdf_url,
                drive_file_id,
                new_file_name,
            } => {
                let drive_file_id = checked_file_id(&drive_file_id)?;
                self.sync
                    .upload(&pdf_url, &drive_file_id, new_file_name.as_deref())
                    .await?;
                Ok(LegacyReply::success())
            }
            LegacyRequest::ResetAuth => {
                self.sync.logout().await;
                Ok(LegacyReply::success())
            }
        }
    }
}

fn panel_kind(request: &PanelRequest) -> &'static str {
    match request {
        PanelRequest::GetInitialState => "get-initial-state",
        PanelRequest::Login => "login",
        PanelRequest::Logout => "logout",
        PanelRequest::Reset => "reset",
        PanelRequest::SaveProject { .. } => "save-project",
        PanelRequest::EditProject { .. } => "edit-project",
        PanelRequest::DeleteProject { .. } => "delete-project",
        PanelRequest::SyncProject { .. } => "sync-project",
    }
}

fn legacy_kind(request: &LegacyRequest) -> &'static str {
    match request {
        LegacyRequest::GetConfig => "get_config",
        LegacyRequest::AddProject { .. } => "add_project",
        LegacyRequest::Upload { .. } => "upload",
        LegacyRequest::ResetAuth => "reset_auth",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AccessToken;
    use crate::core::config::CONFIG_FILE_NAME;
    use crate::infra::artifact::StaticArtifactFetcher;
    use crate::infra::drive::in_memory::{DriveOp, InMemoryDrive};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct AlwaysSignedIn;

    #[async_trait]
    impl TokenProvider for AlwaysSignedIn {
        async fn acquire(&self, _interactive: bool) -> Result<AccessToken, SyncError> {
            Ok(AccessToken::new("token"))
        }
        async fn revoke(&self, _token: &AccessToken) {}
        async fn forget(&self) {}
    }

    type TestRouter = MessageRouter<AlwaysSignedIn, InMemoryDrive, StaticArtifactFetcher>;

    fn router(drive: &Arc<InMemoryDrive>) -> TestRouter {
        MessageRouter::new(SyncService::new(
            AlwaysSignedIn,
            Arc::clone(drive),
            StaticArtifactFetcher::new(b"%PDF-1.5".to_vec()),
        ))
    }

    /// Runs one message and returns (reply, broadcasts), both as JSON.
    async fn exchange(router: &TestRouter, message: Value) -> (Value, Vec<Value>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = router.handle(InboundMessage::from_value(message), &tx).await;
        drop(tx);

        let mut broadcasts = Vec::new();
        while let Some(frame) = rx.recv().await {
            broadcasts.push(serde_json::to_value(frame).unwrap());
        }
        (serde_json::to_value(reply).unwrap(), broadcasts)
    }

    #[tokio::test]
    async fn save_project_from_page_replies_with_mapping_and_broadcasts_stages() {
        let drive = Arc::new(InMemoryDrive::new());
        drive.seed_app_data_file(CONFIG_FILE_NAME, br#"{"projects": {}}"#);
        let router = router(&drive);

        let (reply, broadcasts) = exchange(
            &router,
            json!({
                "type": "save-project",
                "requestId": 11,
                "projectId": "p1",
                "name": "Resume",
                "createNew": true,
                "page": {
                    "url": "https://www.overleaf.com/project/p1",
                    "downloadUrl": "https://www.overleaf.com/download/project/p1/output.pdf"
                }
            }),
        )
        .await;

        assert_eq!(reply["requestId"], json!(11));
        assert_eq!(reply["status"], json!("success"));
        assert_eq!(reply["projects"]["p1"]["name"], json!("Resume"));
        let stages: Vec<&str> = broadcasts
            .iter()
            .map(|b| b["stage"].as_str().unwrap())
            .collect();
        assert_eq!(
            stages,
            vec![
                "authenticating",
                "reading-config",
                "transferring-artifact",
                "persisting-config",
                "done"
            ]
        );
        assert!(broadcasts.iter().all(|b| b["requestId"] == json!(11)));
    }

    #[tokio::test]
    async fn save_project_parses_drive_links() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, _) = exchange(
            &router,
            json!({
                "type": "save-project",
                "projectId": "p1",
                "name": "Thesis",
                "createNew": false,
                "driveUrl": "https://drive.google.com/file/d/1AbC_xyz/view?usp=sharing"
            }),
        )
        .await;

        assert_eq!(
            reply["projects"]["p1"],
            json!({"name": "Thesis", "driveFileId": "1AbC_xyz"})
        );
    }

    #[tokio::test]
    async fn bad_drive_link_is_an_error_reply() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, broadcasts) = exchange(
            &router,
            json!({
                "type": "save-project",
                "projectId": "p1",
                "name": "Thesis",
                "driveUrl": "https://example.com/some page"
            }),
        )
        .await;

        assert_eq!(
            reply,
            json!({"status": "error", "message": "Invalid or unrecognized Google Drive link format."})
        );
        assert!(broadcasts.is_empty());
        assert_eq!(drive.calls(DriveOp::Find), 0);
    }

    #[tokio::test]
    async fn sync_from_a_non_project_page_is_refused() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, _) = exchange(
            &router,
            json!({
                "type": "sync-project",
                "projectId": "p1",
                "page": {"url": "https://www.overleaf.com/dashboard"}
            }),
        )
        .await;

        assert_eq!(reply["status"], json!("error"));
        assert_eq!(drive.calls(DriveOp::Find), 0);
    }

    #[tokio::test]
    async fn sync_from_another_projects_editor_is_refused() {
        let drive = Arc::new(InMemoryDrive::new());
        let file_id = drive.seed_file("Resume.pdf", b"old resume");
        let config = format!(
            r#"{{"projects": {{"p1": {{"name": "Resume", "driveFileId": "{}"}}}}}}"#,
            file_id
        );
        drive.seed_app_data_file(CONFIG_FILE_NAME, config.as_bytes());
        let router = router(&drive);

        let (reply, _) = exchange(
            &router,
            json!({
                "type": "sync-project",
                "projectId": "p1",
                "page": {
                    "url": "https://www.overleaf.com/project/p2",
                    "downloadUrl": "https://www.overleaf.com/download/project/p2/output.pdf"
                }
            }),
        )
        .await;

        assert_eq!(reply["status"], json!("error"));
        assert_eq!(drive.calls(DriveOp::Update), 0);
        assert_eq!(drive.file(&file_id).unwrap().content, b"old resume".to_vec());
    }

    #[tokio::test]
    async fn create_from_another_projects_editor_is_refused() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, broadcasts) = exchange(
            &router,
            json!({
                "type": "save-project",
                "projectId": "p1",
                "name": "Resume",
                "createNew": true,
                "page": {
                    "url": "https://www.overleaf.com/project/p2",
                    "downloadUrl": "https://www.overleaf.com/download/project/p2/output.pdf"
                }
            }),
        )
        .await;

        assert_eq!(reply["status"], json!("error"));
        assert!(broadcasts.is_empty());
        assert_eq!(drive.calls(DriveOp::Find), 0);
        assert_eq!(drive.calls(DriveOp::Create), 0);
    }

    #[tokio::test]
    async fn delete_of_a_vanished_file_reports_the_removed_link() {
        let drive = Arc::new(InMemoryDrive::new());
        drive.seed_app_data_file(
            CONFIG_FILE_NAME,
            br#"{"projects": {"p1": {"name": "Resume", "driveFileId": "already-gone"}}}"#,
        );
        let router = router(&drive);

        let (reply, _) = exchange(
            &router,
            json!({"type": "delete-project", "requestId": 4, "projectId": "p1"}),
        )
        .await;

        assert_eq!(
            reply,
            json!({
                "requestId": 4,
                "status": "success",
                "message": "The Drive file was already gone. Removed the link.",
                "projects": {}
            })
        );
    }

    #[tokio::test]
    async fn file_ids_with_path_characters_never_reach_drive() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, _) = exchange(
            &router,
            json!({
                "type": "save-project",
                "projectId": "p1",
                "name": "Thesis",
                "driveFileId": "../about"
            }),
        )
        .await;
        assert_eq!(
            reply,
            json!({"status": "error", "message": "Invalid Google Drive file id."})
        );

        let (reply, _) = exchange(
            &router,
            json!({
                "action": "upload",
                "pdfUrl": "https://www.overleaf.com/download/project/p1/output.pdf",
                "driveFileId": "f1?uploadType=media"
            }),
        )
        .await;
        assert_eq!(
            reply,
            json!({"success": false, "error": "Invalid Google Drive file id."})
        );
        assert_eq!(drive.calls(DriveOp::Find), 0);
        assert_eq!(drive.calls(DriveOp::Update), 0);
    }

    #[tokio::test]
    async fn legacy_add_project_creates_an_empty_file() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, broadcasts) = exchange(
            &router,
            json!({
                "action": "add_project",
                "projectData": {"projectName": "Resume", "overleafProjectId": "p1", "createNew": true}
            }),
        )
        .await;

        assert_eq!(reply["success"], json!(true));
        let new_id = reply["newFileId"].as_str().unwrap().to_string();
        assert_eq!(
            reply["data"]["projects"],
            json!([{"projectName": "Resume", "overleafProjectId": "p1", "driveFileId": new_id}])
        );
        let file = drive.file(&new_id).unwrap();
        assert_eq!(file.name, "Resume.pdf");
        assert!(file.content.is_empty());
        assert!(broadcasts.is_empty());
    }

    #[tokio::test]
    async fn legacy_get_config_lists_projects() {
        let drive = Arc::new(InMemoryDrive::new());
        drive.seed_app_data_file(
            CONFIG_FILE_NAME,
            br#"{"projects": [{"projectName": "Old", "overleafProjectId": "p9", "driveFileId": "f9"}]}"#,
        );
        let router = router(&drive);

        let (reply, _) = exchange(&router, json!({"action": "get_config"})).await;

        assert_eq!(
            reply,
            json!({"success": true, "data": {"projects": [
                {"projectName": "Old", "overleafProjectId": "p9", "driveFileId": "f9"}
            ]}})
        );
    }

    #[tokio::test]
    async fn unknown_action_and_missing_fields_get_legacy_errors() {
        let drive = Arc::new(InMemoryDrive::new());
        let router = router(&drive);

        let (reply, _) = exchange(&router, json!({"action": "nope"})).await;
        assert_eq!(reply, json!({"success": false, "error": "Unknown action"}));

        let (reply, _) = exchange(&router, json!({"action": "upload", "driveFileId": "f1"})).await;
        assert_eq!(reply["success"], json!(false));
    }

    #[tokio::test]
    async fn initial_state_reports_projects() {
        let drive = Arc::new(InMemoryDrive::new());
        drive.seed_app_data_file(
            CONFIG_FILE_NAME,
            br#"{"projects": {"p1": {"name": "Resume", "driveFileId": "f1"}}}"#,
        );
        let router = router(&drive);

        let (reply, _) = exchange(&router, json!({"type": "get-initial-state"})).await;

        assert_eq!(
            reply,
            json!({
                "status": "success",
                "authenticated": true,
                "projects": {"p1": {"name": "Resume", "driveFileId": "f1"}}
            })
        );
    }
}
