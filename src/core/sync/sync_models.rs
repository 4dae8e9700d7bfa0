use crate::core::config::Config;
use crate::core::errors::SyncError;
use crate::core::transfer::DocumentPageAccessor;

/// Where a save/sync/edit/delete operation currently is.
///
/// `Idle → Authenticating → ReadingConfig → TransferringArtifact →
/// PersistingConfig → Done`, or `Failed` from anywhere. Nothing persisted is
/// touched before `PersistingConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    Authenticating,
    ReadingConfig,
    TransferringArtifact,
    PersistingConfig,
    Done,
    Failed(String),
}

impl SyncStage {
    /// Wire label used in `status-update` broadcasts.
    pub fn label(&self) -> &'static str {
        match self {
            SyncStage::Idle => "idle",
            SyncStage::Authenticating => "authenticating",
            SyncStage::ReadingConfig => "reading-config",
            SyncStage::TransferringArtifact => "transferring-artifact",
            SyncStage::PersistingConfig => "persisting-config",
            SyncStage::Done => "done",
            SyncStage::Failed(_) => "failed",
        }
    }

    /// Human-readable status line for the UI.
    pub fn message(&self) -> String {
        match self {
            SyncStage::Idle => "Ready.".to_string(),
            SyncStage::Authenticating => "Signing in to Google Drive...".to_string(),
            SyncStage::ReadingConfig => "Fetching config from Google Drive...".to_string(),
            SyncStage::TransferringArtifact => "Transferring PDF...".to_string(),
            SyncStage::PersistingConfig => "Saving config to Google Drive...".to_string(),
            SyncStage::Done => "Done.".to_string(),
            SyncStage::Failed(reason) => format!("Error: {}", reason),
        }
    }
}

/// Receives stage transitions, e.g. to broadcast progress to the UI.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: &SyncStage);
}

/// Sink for callers that do not display progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _stage: &SyncStage) {}
}

/// Walks one operation through the stage machine, reporting each step.
pub struct StageTracker<'a> {
    stage: SyncStage,
    sink: &'a dyn ProgressSink,
}

impl<'a> StageTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            stage: SyncStage::Idle,
            sink,
        }
    }

    pub fn advance(&mut self, stage: SyncStage) {
        tracing::debug!(from = self.stage.label(), to = stage.label(), "Stage transition");
        self.stage = stage;
        self.sink.report(&self.stage);
    }

    pub fn fail(&mut self, err: &SyncError) {
        self.advance(SyncStage::Failed(err.to_string()));
    }

    #[cfg(test)]
    pub fn stage(&self) -> &SyncStage {
        &self.stage
    }
}

/// Where the Drive file of a newly saved project comes from.
pub enum LinkTarget<'a> {
    /// Fetch the compiled PDF from the page and create a new file from it.
    CreateFromPage(&'a dyn DocumentPageAccessor),
    /// Create an empty PDF placeholder, filled by the first sync.
    CreateEmpty,
    /// Link a file the user already has.
    Existing(String),
}

pub struct SaveProject<'a> {
    pub project_id: String,
    pub name: String,
    pub target: LinkTarget<'a>,
}

/// Authentication state plus the project mapping when signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub authenticated: bool,
    pub config: Option<Config>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub config: Config,
    pub drive_file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub config: Config,
    /// The remote file was already gone; only the local link was removed.
    pub stale_link: bool,
}
