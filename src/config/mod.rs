//! Configuration Management Module
//!
//! Coordinator tunables, the quick-command catalog and saved connection
//! profiles, persisted as one JSON file in the application data directory.

pub mod commands;
pub mod connections;
pub mod storage;
pub mod types;

pub use commands::{default_commands, CatalogError, CommandCatalog, SshCommand};
pub use connections::{ConnectionCatalog, SavedAuth, SavedConnection};
pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{ConfigFile, CoordinatorConfig, CONFIG_VERSION};
