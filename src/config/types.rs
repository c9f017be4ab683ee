//! Configuration file types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::commands::SshCommand;
use super::connections::SavedConnection;

/// Current on-disk config version
pub const CONFIG_VERSION: u32 = 1;

/// Tunables of the coordination core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Host connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Host disconnect timeout in seconds
    #[serde(default = "default_disconnect_timeout")]
    pub disconnect_timeout_secs: u64,

    /// `set_current_session` timeout in seconds
    #[serde(default = "default_switch_timeout")]
    pub switch_timeout_secs: u64,

    /// Per-module refresh timeout in seconds
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,

    /// Maximum concurrently registered sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Activation requests allowed to wait (or run) at once
    #[serde(default = "default_max_pending_switches")]
    pub max_pending_switches: usize,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_disconnect_timeout() -> u64 {
    10
}

fn default_switch_timeout() -> u64 {
    10
}

fn default_refresh_timeout() -> u64 {
    30
}

fn default_max_sessions() -> usize {
    20
}

fn default_max_pending_switches() -> usize {
    8
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            disconnect_timeout_secs: default_disconnect_timeout(),
            switch_timeout_secs: default_switch_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
            max_sessions: default_max_sessions(),
            max_pending_switches: default_max_pending_switches(),
        }
    }
}

impl CoordinatorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_secs(self.switch_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

/// Root of `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: u32,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// User-defined commands (defaults are not stored)
    #[serde(default)]
    pub commands: Vec<SshCommand>,

    /// Saved connection profiles (no secrets)
    #[serde(default)]
    pub connections: Vec<SavedConnection>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            coordinator: CoordinatorConfig::default(),
            commands: Vec::new(),
            connections: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ConfigFile =
            serde_json::from_str(r#"{"version":1,"coordinator":{"switchTimeoutSecs":3}}"#).unwrap();
        assert_eq!(config.coordinator.switch_timeout(), Duration::from_secs(3));
        assert_eq!(config.coordinator.max_sessions, 20);
        assert!(config.commands.is_empty());
        assert!(config.connections.is_empty());
    }
}
