//! Events emitted by a communicator

use std::fmt;

use crate::protocol::ProtocolEvent;

/// Transient status message for conditions that are handled locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Shell channel could not be opened or primed
    InitFailed(String),
    /// An instruction could not be written; it is not retried
    SendFailed { channel: String, error: String },
    /// Close-all gave up waiting for a channel
    CloseUnconfirmed { channel: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitFailed(error) => write!(f, "Could not start management session: {}", error),
            Self::SendFailed { channel, error } => {
                write!(f, "Command for channel {} was not sent: {}", channel, error)
            }
            Self::CloseUnconfirmed { channel } => {
                write!(f, "Channel {} did not confirm close", channel)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommunicatorEvent {
    Protocol(ProtocolEvent),
    Notice(Notice),
    /// The read loop ended. `requested` is set when the operator closed the
    /// session; otherwise the link was lost.
    Terminated { session_id: String, requested: bool },
}
