//! Management session over an SSH shell
//!
//! A `Communicator` drives one wrapper process: it writes framed
//! instructions, parses everything the wrapper prints and reports the
//! result as `CommunicatorEvent`s.

mod events;
mod framing;
mod wrapper;

pub use events::{CommunicatorEvent, Notice};
pub use wrapper::Communicator;
