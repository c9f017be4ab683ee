//! On-disk config
//!
//! One pretty-printed JSON file, `config.json`, under the platform data dir
//! (`~/.local/share/lovelyres` on Linux, `%APPDATA%\lovelyres` on Windows).
//! A file that fails to parse is moved aside and defaults are used instead.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use super::types::{ConfigFile, CONFIG_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

pub fn config_dir() -> Result<PathBuf, StorageError> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or(StorageError::NoConfigDir)?;
    Ok(base.join("lovelyres"))
}

pub fn config_file() -> Result<PathBuf, StorageError> {
    config_dir().map(|dir| dir.join("config.json"))
}

pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Storage at [`config_file`]
    pub fn new() -> Result<Self, StorageError> {
        config_file().map(Self::with_path)
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config. A missing file yields defaults, so does an unreadable
    /// one after it has been moved aside. A newer version is an error.
    pub async fn load(&self) -> Result<ConfigFile, StorageError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
            Err(e) => return Err(e.into()),
        };

        let file: ConfigFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!("Unreadable config {:?}: {}", self.path, e);
                self.set_aside().await;
                return Ok(ConfigFile::default());
            }
        };

        if file.version > CONFIG_VERSION {
            return Err(StorageError::VersionTooNew {
                found: file.version,
                supported: CONFIG_VERSION,
            });
        }
        Ok(file)
    }

    /// Write `config` to a sibling file, sync it, then rename over the target
    pub async fn save(&self, config: &ConfigFile) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_string_pretty(config)?;
        let partial = self.path.with_extension("json.partial");
        let mut out = fs::File::create(&partial).await?;
        out.write_all(json.as_bytes()).await?;
        out.sync_all().await?;
        drop(out);
        fs::rename(&partial, &self.path).await?;

        debug!("Config written to {:?}", self.path);
        Ok(())
    }

    /// Rename the current file to `config.corrupt-<timestamp>.json`
    async fn set_aside(&self) {
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let target = self.path.with_extension(format!("corrupt-{}.json", stamp));
        match fs::rename(&self.path, &target).await {
            Ok(()) => warn!("Moved unreadable config to {:?}, using defaults", target),
            Err(e) => error!("Could not move unreadable config aside: {}", e),
        }
    }
}
