pub mod google_drive_client;
pub mod request_client;

#[cfg(test)]
pub mod in_memory;

pub use google_drive_client::{DriveEndpoints, GoogleDriveClient};
