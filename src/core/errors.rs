use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================
// One error type for the whole sync workflow. The variants follow what the
// caller has to DO about a failure, not which component raised it:
// - Auth: drop the token and every cache, ask the user to sign in again
// - Api / Network / InvalidRequest: show the message, nothing else
// - NotFound: sometimes recovered locally (stale links on delete)
// - MalformedConfig: stop, never overwrite the remote file

/// Errors that can be raised by the sync workflow.
///
/// `Display` is the text shown in the UI, so provider messages are passed
/// through verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Missing, expired or rejected credential.
    #[error("{0}")]
    Auth(String),

    /// The storage API answered with a non-2xx status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// A remote object or a local project entry is absent.
    #[error("{0}")]
    NotFound(String),

    /// Transport failure, mostly while fetching the compiled artifact.
    #[error("{0}")]
    Network(String),

    /// The config file exists but is not a config we understand.
    #[error("Config file is malformed: {0}")]
    MalformedConfig(String),

    /// The request itself is unusable (empty name, bad link, wrong page).
    #[error("{0}")]
    InvalidRequest(String),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}
