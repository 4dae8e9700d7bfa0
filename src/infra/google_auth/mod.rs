pub mod credentials;
pub mod token_provider;

pub use credentials::Credentials;
pub use token_provider::{GoogleTokenProvider, OAuthEndpoints};
