pub mod config_models;
pub mod config_store;

pub use config_models::{Config, LegacyProject, Project, ProjectEntry, CONFIG_FILE_NAME};
pub use config_store::ConfigStore;
