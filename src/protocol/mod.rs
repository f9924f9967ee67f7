//! Wrapper line protocol
//!
//! Outbound: `<NN< instruction`. Inbound: `>NN>`, `_NN_`, `!NN!` and `.NN.`
//! lines, classified by `LineParser` into `ProtocolEvent`s.

pub mod command;
pub mod event;
pub mod parser;
pub mod patterns;
pub mod prefix;
pub mod status;

pub use command::{format_line, shell_line, Instruction, CONTROL_CHANNEL, DEBUG_CHANNEL};
pub use event::{
    ChannelDescriptor, OperationKind, ProtocolErrorKind, ProtocolEvent, ReplyStatus,
};
pub use parser::{LineContext, LineParser, PendingOperations};
pub use prefix::{classify, LinePrefix, PrefixKind};
pub use status::{ClientStatus, RoutingEntry, COLUMNS};
