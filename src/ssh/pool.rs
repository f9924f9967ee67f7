//! Session Pool
//!
//! Keyed registry of live SSH sessions, host string → `HandleController`.
//! Entries live until they are removed on disconnect or replaced on
//! reconnect; there is no idle eviction.
//!
//! The pool is owned by the application context and shared by `Arc`. Read
//! loops and the controller tasks of every open tab touch it concurrently,
//! so all access goes through `DashMap`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::config::ServerRecord;
use super::error::SshError;
use super::handle_owner::{HandleController, PingResult};
use super::provider::SessionProvider;

/// One pooled session
#[derive(Clone)]
pub struct PooledSession {
    pub controller: HandleController,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SessionPool {
    sessions: DashMap<String, PooledSession>,
    /// Serialises `get_or_connect` so two tabs for the same host never both dial
    connect_lock: tokio::sync::Mutex<()>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing (and returning) any previous entry
    pub fn add(&self, host: &str, controller: HandleController) -> Option<HandleController> {
        info!("Session pool: add {}", host);
        self.sessions
            .insert(
                host.to_string(),
                PooledSession {
                    controller,
                    connected_at: Utc::now(),
                },
            )
            .map(|old| old.controller)
    }

    pub fn remove(&self, host: &str) -> Option<HandleController> {
        let removed = self.sessions.remove(host).map(|(_, s)| s.controller);
        if removed.is_some() {
            info!("Session pool: remove {}", host);
        }
        removed
    }

    pub fn get(&self, host: &str) -> Option<HandleController> {
        self.sessions.get(host).map(|s| s.controller.clone())
    }

    pub fn connected_at(&self, host: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(host).map(|s| s.connected_at)
    }

    pub fn contains(&self, host: &str) -> bool {
        self.sessions.contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Reuse the pooled session for `record.host` if it still answers a
    /// keepalive, otherwise connect through `provider` and pool the result.
    pub async fn get_or_connect(
        &self,
        record: &ServerRecord,
        provider: &dyn SessionProvider,
    ) -> Result<HandleController, SshError> {
        let _guard = self.connect_lock.lock().await;

        if let Some(existing) = self.get(&record.host) {
            if existing.is_connected() && existing.ping().await != PingResult::IoError {
                debug!("Session pool: reusing session for {}", record.host);
                return Ok(existing);
            }
            warn!("Session pool: stale session for {}, reconnecting", record.host);
            self.remove(&record.host);
        }

        let controller = provider.connect(record).await?;
        self.add(&record.host, controller.clone());
        Ok(controller)
    }

    /// Remove and disconnect the session for `host`. Idempotent.
    pub async fn disconnect(&self, host: &str) {
        if let Some(controller) = self.remove(host) {
            controller.disconnect().await;
        } else {
            debug!("Session pool: {} already disconnected", host);
        }
    }
}
