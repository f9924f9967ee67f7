//! Application context
//!
//! Holds the process-wide Session Pool and the session provider. Created once
//! at startup and handed to every tab by `Arc`.

use std::sync::Arc;

use crate::ssh::{SessionPool, SessionProvider, SshSessionProvider};

pub struct AppContext {
    pub pool: SessionPool,
    pub provider: Arc<dyn SessionProvider>,
}

impl AppContext {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            pool: SessionPool::new(),
            provider,
        }
    }

    /// Context backed by real SSH sessions
    pub fn ssh() -> Self {
        Self::new(Arc::new(SshSessionProvider))
    }
}
