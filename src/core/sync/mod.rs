pub mod sync_models;
pub mod sync_service;

pub use sync_models::{LinkTarget, NoProgress, ProgressSink, SaveProject, SyncStage};
pub use sync_service::SyncService;
