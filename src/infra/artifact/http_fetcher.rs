use async_trait::async_trait;
use reqwest::Client;

use crate::core::errors::SyncError;
use crate::core::transfer::ArtifactFetcher;

/// Downloads compiled PDFs over plain HTTP(S).
pub struct HttpArtifactFetcher {
    client: Client,
}

impl HttpArtifactFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        tracing::debug!(url, "Fetching artifact");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("Failed to download PDF: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!(
                "Failed to download PDF ({}).",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("Failed to download PDF: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Returns the same bytes for every URL.
#[cfg(test)]
pub struct StaticArtifactFetcher {
    bytes: Vec<u8>,
}

#[cfg(test)]
impl StaticArtifactFetcher {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[cfg(test)]
#[async_trait]
impl ArtifactFetcher for StaticArtifactFetcher {
    async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, SyncError> {
        Ok(self.bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_the_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/project/p1/output.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.5".to_vec()))
            .mount(&server)
            .await;

        let bytes = HttpArtifactFetcher::new()
            .fetch_bytes(&format!("{}/download/project/p1/output.pdf", server.uri()))
            .await
            .unwrap();

        assert_eq!(bytes, b"%PDF-1.5");
    }

    #[tokio::test]
    async fn non_success_status_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = HttpArtifactFetcher::new()
            .fetch_bytes(&format!("{}/output.pdf", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Network(ref m) if m.contains("403")));
    }
}
