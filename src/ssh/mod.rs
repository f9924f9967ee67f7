//! SSH module - sessions that carry the management wrapper shell
//!
//! - Direct SSH connections via russh with optional host key pinning
//! - Single-owner handle task (`HandleController`)
//! - PTY shell channels exposed as byte streams
//! - Session Pool keyed by host

mod client;
mod config;
mod error;
mod handle_owner;
pub mod pool;
mod provider;
mod shell;

pub use client::{fingerprint, ClientHandler, SshClient};
pub use config::{AuthMethod, ServerRecord};
pub use error::SshError;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController, PingResult};
pub use pool::{PooledSession, SessionPool};
pub use provider::{SessionProvider, SshSessionProvider};
pub use shell::{open_shell, BoxedShell, ShellStream};
