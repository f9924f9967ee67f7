//! Decoded protocol events
//!
//! At most one event is produced per input line; multi-line sequences
//! produce a single event when their terminator arrives.

use std::collections::BTreeMap;
use std::fmt;

use super::status::ClientStatus;

/// One management endpoint offered by the wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub number: String,
    pub service_type: String,
    pub name: String,
}

/// Status keyword in the second token of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ready,
    Wait,
    Ok,
    Fail,
}

impl ReplyStatus {
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token {
            "READY" => Some(Self::Ready),
            "WAIT" => Some(Self::Wait),
            "OK" => Some(Self::Ok),
            "FAIL" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Operator-initiated operation awaiting its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    OpenFailed,
    OpenTimeout,
    KillFailed,
    DuplicateInstance,
    /// `!NN!` line not matching any known pattern
    Generic,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OpenFailed => "channel could not be opened",
            Self::OpenTimeout => "timeout while opening channel",
            Self::KillFailed => "client not found",
            Self::DuplicateInstance => "another wrapper instance is already running",
            Self::Generic => "remote error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    ChannelsDiscovered {
        channels: BTreeMap<String, ChannelDescriptor>,
    },
    ClientListUpdated {
        channel: String,
        clients: Vec<ClientStatus>,
    },
    LogLine {
        channel: String,
        text: String,
    },
    VersionReported {
        channel: String,
        text: String,
    },
    /// Output of an operator-entered command
    CommandOutput {
        channel: String,
        text: String,
    },
    OperationAcknowledged {
        channel: String,
        operation: Option<OperationKind>,
        status: ReplyStatus,
    },
    /// A kill succeeded; a fresh status is due
    ClientsKilled {
        channel: String,
        text: String,
    },
    ErrorDetected {
        kind: ProtocolErrorKind,
        channel: String,
        username: Option<String>,
        text: String,
    },
    DebugMessage {
        text: String,
    },
    Closedown {
        channel: String,
        text: String,
    },
}
