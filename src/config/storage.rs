//! Server record storage
//!
//! Reads and writes the managed-server list.
//! Location: ~/.ovpnadmin/servers.json on macOS/Linux, %APPDATA%\OvpnAdmin on Windows

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::ssh::ServerRecord;

/// Current file format version
pub const SERVERS_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Servers file version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },

    #[error("No server named '{0}'")]
    UnknownServer(String),
}

/// On-disk layout of `servers.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersFile {
    pub version: u32,
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
}

impl Default for ServersFile {
    fn default() -> Self {
        Self {
            version: SERVERS_VERSION,
            servers: Vec::new(),
        }
    }
}

impl ServersFile {
    pub fn find(&self, name: &str) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Insert or replace the record with the same name
    pub fn upsert(&mut self, record: ServerRecord) {
        match self.servers.iter_mut().find(|s| s.name == record.name) {
            Some(existing) => *existing = record,
            None => self.servers.push(record),
        }
    }
}

pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("OvpnAdmin"));
        }
        dirs::home_dir()
            .map(|home| home.join(".ovpnadmin"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".ovpnadmin"))
            .ok_or(StorageError::NoConfigDir)
    }
}

pub fn servers_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("servers.json"))
}

pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Storage at the default location
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: servers_file()?,
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the server list. A missing file is an empty list; a corrupted one
    /// is backed up and treated as empty.
    pub async fn load(&self) -> Result<ServersFile, StorageError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ServersFile::default())
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        match serde_json::from_str::<ServersFile>(&contents) {
            Ok(file) if file.version > SERVERS_VERSION => Err(StorageError::VersionTooNew {
                found: file.version,
                supported: SERVERS_VERSION,
            }),
            Ok(file) => Ok(file),
            Err(e) => {
                tracing::warn!("Servers file corrupted: {}", e);
                match self.backup().await {
                    Ok(backup_path) => tracing::warn!(
                        "Corrupted servers file backed up to {:?}, starting empty",
                        backup_path
                    ),
                    Err(backup_err) => {
                        tracing::error!("Failed to back up servers file: {}", backup_err)
                    }
                }
                Ok(ServersFile::default())
            }
        }
    }

    /// Look up one server by display name
    pub async fn find(&self, name: &str) -> Result<ServerRecord, StorageError> {
        self.load()
            .await?
            .find(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownServer(name.to_string()))
    }

    /// Write via a temp file and rename
    pub async fn save(&self, file: &ServersFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;

        let mut out = fs::File::create(&temp_path).await?;
        out.write_all(json.as_bytes()).await?;
        out.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    pub async fn backup(&self) -> Result<PathBuf, StorageError> {
        let backup_path = self.path.with_extension(format!(
            "json.backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));

        if fs::metadata(&self.path).await.is_ok() {
            fs::copy(&self.path, &backup_path).await?;
        }
        Ok(backup_path)
    }
}
