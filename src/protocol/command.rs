//! Outbound instructions
//!
//! Every instruction travels as one line `<NN< text\n`, where `NN` is the
//! target channel code.

use std::fmt;

/// Command/control channel of the wrapper, implicitly open for the session
pub const CONTROL_CHANNEL: &str = "00";

/// Debug sink channel, never opened or closed by the operator
pub const DEBUG_CHANNEL: &str = "FF";

pub const LINE_TERMINATOR: &str = "\n";

/// Instruction understood by the wrapper or by the OpenVPN management
/// interface behind a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `open <n>` on the control channel
    Open(String),
    /// `close <n>` on the control channel
    Close(String),
    Status,
    LogOn,
    LogOff,
    Version,
    /// `kill <common name>`
    Kill(String),
    /// Operator-entered text, passed through untouched
    Raw(String),
}

impl Instruction {
    /// Whether the instruction is always addressed to the control channel
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Open(_) | Self::Close(_))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(channel) => write!(f, "open {}", channel),
            Self::Close(channel) => write!(f, "close {}", channel),
            Self::Status => f.write_str("status"),
            Self::LogOn => f.write_str("log on"),
            Self::LogOff => f.write_str("log off"),
            Self::Version => f.write_str("version"),
            Self::Kill(user) => write!(f, "kill {}", user),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// Frame an instruction for `channel`
pub fn format_line(channel: &str, instruction: &Instruction) -> String {
    format!("<{}< {}{}", channel, instruction, LINE_TERMINATOR)
}

/// Unframed line for the login shell itself (handshake primer, wrapper start)
pub fn shell_line(text: &str) -> String {
    format!("{}{}", text, LINE_TERMINATOR)
}
