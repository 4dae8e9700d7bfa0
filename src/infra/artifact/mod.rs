pub mod http_fetcher;

pub use http_fetcher::HttpArtifactFetcher;

#[cfg(test)]
pub use http_fetcher::StaticArtifactFetcher;
