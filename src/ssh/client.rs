//! SSH Client implementation using russh

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{PublicKey, PublicKeyBase64};
use russh::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::config::{AuthMethod, ServerRecord};
use super::error::SshError;
use super::handle_owner::{spawn_handle_owner_task, HandleController};

/// Connects and authenticates against one server record
pub struct SshClient {
    record: ServerRecord,
}

impl SshClient {
    pub fn new(record: ServerRecord) -> Self {
        Self { record }
    }

    /// Connect to the SSH server and hand the session to an owner task
    pub async fn connect(self) -> Result<HandleController, SshError> {
        let addr = format!("{}:{}", self.record.host, self.record.port);

        info!("Connecting to SSH server at {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::ConnectionFailed(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed("No address found".to_string()))?;

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(
            self.record.host.clone(),
            self.record.port,
            self.record.host_key_fingerprint.clone(),
        );

        let mut handle = tokio::time::timeout(
            self.record.timeout(),
            client::connect(Arc::new(ssh_config), socket_addr, handler),
        )
        .await
        .map_err(|_| SshError::Timeout("Connection timed out".to_string()))?
        .map_err(|e| match e {
            SshError::HostKeyRejected(msg) => SshError::HostKeyRejected(msg),
            other => SshError::ConnectionFailed(other.to_string()),
        })?;

        debug!("SSH handshake completed");

        let authenticated = match &self.record.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&self.record.username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                let key = russh::keys::load_secret_key(key_path, passphrase.as_deref())
                    .map_err(|e| SshError::KeyError(e.to_string()))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&self.record.username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", addr);

        Ok(spawn_handle_owner_task(handle, self.record.host.clone()))
    }
}

/// Compute the OpenSSH-style SHA256 fingerprint of a public key
pub fn fingerprint(key: &PublicKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.public_key_bytes());
    let hash = hasher.finalize();
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}

/// Client handler for russh callbacks
///
/// Verifies the server key against the pinned fingerprint of the server
/// record. Without a pin every key is accepted and logged.
pub struct ClientHandler {
    host: String,
    port: u16,
    pinned: Option<String>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, pinned: Option<String>) -> Self {
        Self { host, port, pinned }
    }

    fn verify(&self, actual: &str) -> Result<bool, SshError> {
        match &self.pinned {
            Some(expected) if expected == actual => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            Some(expected) => {
                warn!(
                    "HOST KEY MISMATCH for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected, actual
                );
                Err(SshError::HostKeyRejected(format!(
                    "key for {}:{} is {}, expected {}",
                    self.host, self.port, actual, expected
                )))
            }
            None => {
                warn!(
                    "No pinned host key for {}:{}, accepting {}",
                    self.host, self.port, actual
                );
                Ok(true)
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        self.verify(&fingerprint(server_public_key))
    }
}
