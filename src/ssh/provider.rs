//! Session Provider seam
//!
//! The control center never creates transports itself. It asks a provider for
//! an authenticated session and for a shell on that session, which lets tests
//! substitute in-memory streams.

use async_trait::async_trait;

use super::client::SshClient;
use super::config::ServerRecord;
use super::error::SshError;
use super::handle_owner::HandleController;
use super::shell::{open_shell, BoxedShell};

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Establish and authenticate a session to `record.host`
    async fn connect(&self, record: &ServerRecord) -> Result<HandleController, SshError>;

    /// Open an interactive shell on an established session
    async fn open_shell(&self, session: &HandleController) -> Result<BoxedShell, SshError>;
}

/// russh-backed provider
#[derive(Debug, Default, Clone, Copy)]
pub struct SshSessionProvider;

#[async_trait]
impl SessionProvider for SshSessionProvider {
    async fn connect(&self, record: &ServerRecord) -> Result<HandleController, SshError> {
        SshClient::new(record.clone()).connect().await
    }

    async fn open_shell(&self, session: &HandleController) -> Result<BoxedShell, SshError> {
        open_shell(session).await
    }
}
