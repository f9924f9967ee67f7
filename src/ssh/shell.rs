//! Wrapper shell channel
//!
//! The management wrapper runs inside an ordinary interactive shell. The
//! channel is converted into a byte stream so the communicator can frame it
//! into lines without knowing about russh.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::error::SshError;
use super::handle_owner::HandleController;

/// Terminal type announced in the PTY request
const TERM: &str = "vt100";

/// Wide enough that status table lines are never wrapped by the remote tty
const PTY_COLS: u32 = 512;
const PTY_ROWS: u32 = 24;

/// Duplex byte stream of a shell session
pub trait ShellStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ShellStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedShell = Box<dyn ShellStream>;

/// Open a PTY-backed shell channel on an established session
pub async fn open_shell(controller: &HandleController) -> Result<BoxedShell, SshError> {
    let channel = controller.open_session_channel().await?;

    debug!("Channel {} opened, requesting PTY", channel.id());

    channel
        .request_pty(false, TERM, PTY_COLS, PTY_ROWS, 0, 0, &[])
        .await
        .map_err(|e| SshError::ChannelError(format!("PTY request failed: {}", e)))?;

    channel
        .request_shell(false)
        .await
        .map_err(|e| SshError::ChannelError(format!("Shell request failed: {}", e)))?;

    info!("Wrapper shell started on channel {}", channel.id());

    Ok(Box::new(channel.into_stream()))
}
