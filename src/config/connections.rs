//! Saved connection profiles
//!
//! Profiles are stored in `config.json` next to the commands. Secrets are
//! never written: a profile only records which kind of credential it needs,
//! and the caller supplies the password or passphrase when connecting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::commands::CatalogError;
use crate::session::{AuthMethod, ConnectionInfo};

/// Credential kind of a saved connection (no secret material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SavedAuth {
    Password,
    Key {
        key_path: String,
        #[serde(default)]
        has_passphrase: bool,
    },
    Certificate {
        key_path: String,
        cert_path: String,
        #[serde(default)]
        has_passphrase: bool,
    },
    Agent,
}

impl From<&AuthMethod> for SavedAuth {
    fn from(auth: &AuthMethod) -> Self {
        match auth {
            AuthMethod::Password { .. } => SavedAuth::Password,
            AuthMethod::Key {
                key_path,
                passphrase,
            } => SavedAuth::Key {
                key_path: key_path.clone(),
                has_passphrase: passphrase.is_some(),
            },
            AuthMethod::Certificate {
                key_path,
                cert_path,
                passphrase,
            } => SavedAuth::Certificate {
                key_path: key_path.clone(),
                cert_path: cert_path.clone(),
                has_passphrase: passphrase.is_some(),
            },
            AuthMethod::Agent => SavedAuth::Agent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedConnection {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SavedAuth,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl SavedConnection {
    /// Profile for `info`, with its secrets dropped. The id is assigned on add.
    pub fn from_info(info: &ConnectionInfo) -> Self {
        Self {
            id: String::new(),
            name: info.display_name(),
            host: info.host.clone(),
            port: info.port,
            username: info.username.clone(),
            auth: SavedAuth::from(&info.auth),
            group: None,
            tags: Vec::new(),
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Connection descriptor, completing the credential with `secret`.
    ///
    /// Password profiles require `secret`; key and certificate profiles use
    /// it as the passphrase when they were saved with one.
    pub fn to_connection_info(&self, secret: Option<String>) -> Result<ConnectionInfo, CatalogError> {
        let auth = match &self.auth {
            SavedAuth::Password => AuthMethod::Password {
                password: secret.ok_or_else(|| CatalogError::MissingSecret(self.id.clone()))?,
            },
            SavedAuth::Key {
                key_path,
                has_passphrase,
            } => AuthMethod::Key {
                key_path: key_path.clone(),
                passphrase: passphrase_for(&self.id, *has_passphrase, secret)?,
            },
            SavedAuth::Certificate {
                key_path,
                cert_path,
                has_passphrase,
            } => AuthMethod::Certificate {
                key_path: key_path.clone(),
                cert_path: cert_path.clone(),
                passphrase: passphrase_for(&self.id, *has_passphrase, secret)?,
            },
            SavedAuth::Agent => AuthMethod::Agent,
        };

        Ok(ConnectionInfo {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            auth,
            name: Some(self.name.clone()),
        })
    }
}

fn passphrase_for(
    id: &str,
    has_passphrase: bool,
    secret: Option<String>,
) -> Result<Option<String>, CatalogError> {
    match (has_passphrase, secret) {
        (true, None) => Err(CatalogError::MissingSecret(id.to_string())),
        (true, secret) => Ok(secret),
        (false, _) => Ok(None),
    }
}

/// In-memory list of saved connections; persistence is handled by the owner
#[derive(Debug, Clone, Default)]
pub struct ConnectionCatalog {
    connections: Vec<SavedConnection>,
}

impl ConnectionCatalog {
    pub fn new(saved: Vec<SavedConnection>) -> Self {
        Self { connections: saved }
    }

    pub fn connections(&self) -> &[SavedConnection] {
        &self.connections
    }

    pub fn get(&self, connection_id: &str) -> Option<&SavedConnection> {
        self.connections.iter().find(|c| c.id == connection_id)
    }

    /// Add a profile under a freshly generated id
    pub fn add(&mut self, mut connection: SavedConnection) -> Result<String, CatalogError> {
        if connection.host.trim().is_empty() {
            return Err(CatalogError::EmptyHost);
        }
        connection.id = uuid::Uuid::new_v4().to_string();
        connection.created_at = Utc::now();
        connection.last_used_at = None;
        let id = connection.id.clone();
        self.connections.push(connection);
        Ok(id)
    }

    pub fn remove(&mut self, connection_id: &str) -> Result<(), CatalogError> {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != connection_id);
        if self.connections.len() < before {
            Ok(())
        } else {
            Err(CatalogError::NotFound(connection_id.to_string()))
        }
    }

    /// Stamp `last_used_at` after a successful connect
    pub fn mark_used(&mut self, connection_id: &str) -> Result<(), CatalogError> {
        let connection = self
            .connections
            .iter_mut()
            .find(|c| c.id == connection_id)
            .ok_or_else(|| CatalogError::NotFound(connection_id.to_string()))?;
        connection.last_used_at = Some(Utc::now());
        Ok(())
    }
}
