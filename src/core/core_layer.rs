// The core module contains all business logic.
// Each concern gets its own submodule; none of them know about HTTP or framing.

#[path = "errors.rs"]
pub mod errors;

#[path = "auth/token_provider.rs"]
pub mod auth;

#[path = "drive/drive_api.rs"]
pub mod drive;

#[path = "config/mod.rs"]
pub mod config;

#[path = "projects/project_repository.rs"]
pub mod projects;

#[path = "transfer/mod.rs"]
pub mod transfer;

#[path = "sync/mod.rs"]
pub mod sync;
