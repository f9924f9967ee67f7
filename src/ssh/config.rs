//! Server record
//!
//! Connection parameters for one managed OpenVPN host. The record is owned by
//! the persistence layer; this crate only consumes it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One managed server as stored in `servers.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Display name, used to pick the server from the command line
    pub name: String,

    /// Remote host address; also the Session Pool key
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    pub auth: AuthMethod,

    /// Command that starts the management wrapper in the remote shell
    #[serde(default = "default_wrapper_command")]
    pub wrapper_command: String,

    /// Seconds between automatic `status` requests per open channel
    #[serde(default = "default_poll_interval")]
    pub status_poll_interval_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pinned host key (`SHA256:...`). Unset means accept any key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_fingerprint: Option<String>,
}

impl ServerRecord {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Authentication methods supported
#[derive(Debug, Clone, Serialize, Deserialize)]
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
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_wrapper_command() -> String {
    "ovpn-wrapper".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: default_port(),
            username: String::new(),
            auth: AuthMethod::Password {
                password: String::new(),
            },
            wrapper_command: default_wrapper_command(),
            status_poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
            host_key_fingerprint: None,
        }
    }
}
