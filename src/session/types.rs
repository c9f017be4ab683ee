//! Session Types and Data Structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication descriptor handed to the host on connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication
    Password { password: String },

    /// SSH key authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },

    /// SSH certificate authentication (OpenSSH certificates)
    Certificate {
        key_path: String,
        /// Path to certificate file (*-cert.pub)
        cert_path: String,
        passphrase: Option<String>,
    },

    /// SSH agent authentication
    Agent,
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }

    /// Short name of the method, safe to show in the UI
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::Password { .. } => "password",
            AuthMethod::Key { .. } => "key",
            AuthMethod::Certificate { .. } => "certificate",
            AuthMethod::Agent => "agent",
        }
    }

    /// Key path for key-based methods
    pub fn key_path(&self) -> Option<&str> {
        match self {
            AuthMethod::Key { key_path, .. } | AuthMethod::Certificate { key_path, .. } => {
                Some(key_path)
            }
            _ => None,
        }
    }
}

/// Where and how to connect. Immutable once a session is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Target hostname or IP
    pub host: String,
    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for authentication
    pub username: String,
    /// Authentication method
    pub auth: AuthMethod,
    /// Display name (auto-generated if not provided)
    #[serde(default)]
    pub name: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl ConnectionInfo {
    /// Create a new connection descriptor with password authentication
    pub fn with_password(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth: AuthMethod::password(password),
            name: None,
        }
    }

    /// Create a new connection descriptor with key authentication
    pub fn with_key(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        key_path: impl Into<String>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth: AuthMethod::key(key_path, passphrase),
            name: None,
        }
    }

    /// Get display name (or generate from host/user)
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.username, self.host))
    }
}

/// One registered session. Owned by `SessionRegistry`; consumers get clones.
///
/// Carries credentials, so it is not `Serialize`. Anything leaving the
/// process goes through `SessionInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    /// Unique session ID
    pub session_id: String,
    pub connection_info: ConnectionInfo,
    /// True for at most one entry in a registry
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Registry-wide monotonically increasing creation counter
    pub seq: u64,
}

/// Point-in-time view of the whole registry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Incremented on every registry mutation
    pub revision: u64,
    /// Entries in insertion order, without credentials
    pub sessions: Vec<SessionInfo>,
    pub active_session_id: Option<String>,
}

impl RegistrySnapshot {
    pub fn active(&self) -> Option<&SessionInfo> {
        self.sessions.iter().find(|e| e.is_active)
    }
}

/// Session info for serialization to the UI layer (no secrets)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: String,
    pub key_path: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionEntry> for SessionInfo {
    fn from(entry: &SessionEntry) -> Self {
        let info = &entry.connection_info;
        Self {
            id: entry.session_id.clone(),
            name: info.display_name(),
            host: info.host.clone(),
            port: info.port,
            username: info.username.clone(),
            auth_type: info.auth.kind().to_string(),
            key_path: info.auth.key_path().map(String::from),
            is_active: entry.is_active,
            created_at: entry.created_at,
        }
    }
}

/// Dependent data modules, declared in refresh priority order.
///
/// System info goes first because it confirms reachability for the dashboard;
/// later modules rely on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    SystemInfo,
    FileListing,
    Terminal,
    Containers,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 4] = [
        ModuleKind::SystemInfo,
        ModuleKind::FileListing,
        ModuleKind::Terminal,
        ModuleKind::Containers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::SystemInfo => "system_info",
            ModuleKind::FileListing => "file_listing",
            ModuleKind::Terminal => "terminal",
            ModuleKind::Containers => "containers",
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload returned by a module fetcher (host-defined JSON)
pub type ModuleData = serde_json::Value;
