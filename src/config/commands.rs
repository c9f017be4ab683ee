//! Command catalog
//!
//! Quick commands shown next to the terminal: a fixed set of defaults plus
//! whatever the user added. Defaults have stable ids so saved favorites and
//! the merge on load keep working across restarts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCommand {
    pub id: String,
    pub name: String,
    pub command: String,
    pub description: String,
    pub category: String,
    pub favorite: bool,
}

impl SshCommand {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            command: command.into(),
            description: description.into(),
            category: category.into(),
            favorite: false,
        }
    }
}

/// Errors of the command and connection catalogs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog entry not found: {0}")]
    NotFound(String),

    #[error("Command must not be empty")]
    EmptyCommand,

    #[error("Host must not be empty")]
    EmptyHost,

    #[error("Saved connection {0} needs a password or passphrase")]
    MissingSecret(String),
}

fn default_command(
    id: &str,
    name: &str,
    command: &str,
    description: &str,
    category: &str,
    favorite: bool,
) -> SshCommand {
    SshCommand {
        id: id.to_string(),
        name: name.to_string(),
        command: command.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        favorite,
    }
}

/// Built-in commands
pub fn default_commands() -> Vec<SshCommand> {
    vec![
        default_command(
            "default-system-info",
            "System info",
            "uname -a && cat /etc/os-release",
            "Kernel and distribution details",
            "System",
            true,
        ),
        default_command(
            "default-uptime",
            "Uptime",
            "uptime && who",
            "Uptime and logged-in users",
            "System",
            false,
        ),
        default_command(
            "default-processes",
            "Process list",
            "ps aux --sort=-%cpu",
            "All processes sorted by CPU usage",
            "Processes",
            true,
        ),
        default_command(
            "default-network",
            "Network connections",
            "netstat -tulpn",
            "Listening sockets and owning processes",
            "Network",
            true,
        ),
        default_command(
            "default-auth-log",
            "Auth log",
            "cat /var/log/auth.log",
            "Full authentication log",
            "Logs",
            true,
        ),
        default_command(
            "default-disk-usage",
            "Disk usage",
            "df -h && du -sh /var/log/* | sort -hr",
            "Filesystem usage and log directory sizes",
            "Filesystem",
            true,
        ),
    ]
}

/// In-memory catalog; persistence is handled by the owner
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    commands: Vec<SshCommand>,
}

impl CommandCatalog {
    /// Catalog with the built-in commands only
    pub fn new() -> Self {
        Self {
            commands: default_commands(),
        }
    }

    /// Defaults merged with saved commands.
    ///
    /// A saved command with a default's id overrides it (e.g. a toggled
    /// favorite); everything else is appended in saved order.
    pub fn with_saved(saved: Vec<SshCommand>) -> Self {
        let mut catalog = Self::new();
        for cmd in saved {
            match catalog.commands.iter_mut().find(|c| c.id == cmd.id) {
                Some(existing) => *existing = cmd,
                None => catalog.commands.push(cmd),
            }
        }
        catalog
    }

    pub fn commands(&self) -> &[SshCommand] {
        &self.commands
    }

    /// Commands grouped by category (sorted by category name)
    pub fn by_category(&self) -> BTreeMap<String, Vec<SshCommand>> {
        let mut categories: BTreeMap<String, Vec<SshCommand>> = BTreeMap::new();
        for command in &self.commands {
            categories
                .entry(command.category.clone())
                .or_default()
                .push(command.clone());
        }
        categories
    }

    pub fn favorites(&self) -> Vec<SshCommand> {
        self.commands.iter().filter(|c| c.favorite).cloned().collect()
    }

    /// Add a user command; the id is always freshly generated
    pub fn add(&mut self, mut command: SshCommand) -> Result<String, CatalogError> {
        if command.command.trim().is_empty() {
            return Err(CatalogError::EmptyCommand);
        }
        command.id = uuid::Uuid::new_v4().to_string();
        let id = command.id.clone();
        self.commands.push(command);
        Ok(id)
    }

    pub fn remove(&mut self, command_id: &str) -> Result<(), CatalogError> {
        let before = self.commands.len();
        self.commands.retain(|c| c.id != command_id);
        if self.commands.len() < before {
            Ok(())
        } else {
            Err(CatalogError::NotFound(command_id.to_string()))
        }
    }

    /// Flip the favorite flag, returning the new value
    pub fn toggle_favorite(&mut self, command_id: &str) -> Result<bool, CatalogError> {
        let command = self
            .commands
            .iter_mut()
            .find(|c| c.id == command_id)
            .ok_or_else(|| CatalogError::NotFound(command_id.to_string()))?;
        command.favorite = !command.favorite;
        Ok(command.favorite)
    }

    /// Commands that differ from the built-ins, i.e. what needs saving
    pub fn to_saved(&self) -> Vec<SshCommand> {
        let defaults = default_commands();
        self.commands
            .iter()
            .filter(|c| !defaults.contains(c))
            .cloned()
            .collect()
    }
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::new()
    }
}
