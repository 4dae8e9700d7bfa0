// Entry point of the native messaging host.
//
// **Architecture Overview:**
// - `core/` = Business logic and the traits it needs (no HTTP, no framing)
// - `infra/` = Implementations of core traits (Google OAuth, Drive REST, HTTP)
// - `messaging/` = Adapter for the extension (wire protocol, router, stdio loop)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the stdio loop until the extension disconnects

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "messaging/messaging_layer.rs"]
mod messaging;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::core::sync::SyncService;
use crate::infra::artifact::HttpArtifactFetcher;
use crate::infra::drive::{DriveEndpoints, GoogleDriveClient};
use crate::infra::google_auth::{Credentials, GoogleTokenProvider, OAuthEndpoints};
use crate::messaging::MessageRouter;

const DEFAULT_LOG_FILTER: &str = "info";

/// stdout carries the protocol, so logs go to stderr.
fn init_logging() {
    let filter = std::env::var("OVERDRIVE_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();
    init_logging();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let credentials = Credentials::from_env()
        .await
        .context("Failed to load Google credentials")?;
    match &credentials {
        Some(credentials) => tracing::info!(kind = credentials.kind(), "Loaded Google credentials"),
        None => tracing::warn!(
            "No credentials configured (OVERDRIVE_CREDENTIALS). Sign-in will fail until one is set."
        ),
    }
    let tokens = GoogleTokenProvider::new(credentials, OAuthEndpoints::from_env());

    let drive = Arc::new(
        GoogleDriveClient::new(DriveEndpoints::from_env())
            .context("Failed to create Google Drive client")?,
    );
    let sync = SyncService::new(tokens, drive, HttpArtifactFetcher::new());
    let router = Arc::new(MessageRouter::new(sync));

    // ========================================================================
    // HOST LOOP
    // ========================================================================

    tracing::info!("Overdrive host started");
    messaging::serve(tokio::io::stdin(), tokio::io::stdout(), router)
        .await
        .context("Native messaging loop failed")?;
    tracing::info!("Overdrive host stopped");
    Ok(())
}
