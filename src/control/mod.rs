//! Control Center
//!
//! Per-server tab controller sitting between the operator and a
//! `Communicator`.

mod center;
mod context;
mod state;
mod view;

pub use center::{ControlCenter, ControlCenterHandle};
pub use context::AppContext;
pub use state::{ChannelControls, ChannelEntry, ChannelPhase, ChannelTable};
pub use view::{ControlCenterView, ReconnectPrompt};
