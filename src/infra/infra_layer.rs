// The infra module contains implementations of core traits.
// Each external system gets its own submodule.

#[path = "google_auth/mod.rs"]
pub mod google_auth;

#[path = "drive/mod.rs"]
pub mod drive;

#[path = "artifact/mod.rs"]
pub mod artifact;

#[path = "page/mod.rs"]
pub mod page;
