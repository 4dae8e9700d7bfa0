pub mod artifact_transfer;
pub mod links;

pub use artifact_transfer::{ArtifactFetcher, ArtifactTransfer, DocumentPageAccessor};
