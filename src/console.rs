//! Terminal front end
//!
//! A line-oriented stand-in for the graphical tab: `ConsoleView` prints what
//! the controller reports, `ConsolePrompt` answers reconnect questions from
//! the same stdin stream the operator types commands into.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::control::{ChannelControls, ControlCenterHandle, ControlCenterView, ReconnectPrompt};
use crate::protocol::{ChannelDescriptor, ClientStatus, COLUMNS};

pub const HELP: &str = "\
commands:
  open NN             open management channel NN
  close NN            close channel NN
  closeall            close every channel and quit
  status NN           request the client list of NN
  log NN on|off       start or stop the log stream of NN
  version NN          request the OpenVPN version behind NN
  kill NN NAME        disconnect the client with common name NAME
  send NN TEXT        pass TEXT to channel NN unchanged
  quit                same as closeall";

/// One operator command typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open(String),
    Close(String),
    CloseAll,
    Status(String),
    Log { channel: String, on: bool },
    Version(String),
    Kill { channel: String, username: String },
    Send { channel: String, text: String },
    Help,
}

impl ConsoleCommand {
    /// Parse one input line. `None` for blank or unrecognised input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim_start();
        let (channel, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let arg = arg.trim();
        let target = || (!channel.is_empty()).then(|| channel.to_string());

        match verb {
            "open" => target().map(Self::Open),
            "close" => target().map(Self::Close),
            "closeall" | "quit" | "exit" => Some(Self::CloseAll),
            "status" => target().map(Self::Status),
            "version" => target().map(Self::Version),
            "log" => {
                let on = match arg {
                    "on" => true,
                    "off" => false,
                    _ => return None,
                };
                target().map(|channel| Self::Log { channel, on })
            }
            "kill" if !arg.is_empty() => target().map(|channel| Self::Kill {
                channel,
                username: arg.to_string(),
            }),
            "send" if !arg.is_empty() => target().map(|channel| Self::Send {
                channel,
                text: arg.to_string(),
            }),
            "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }

    pub async fn apply(&self, handle: &ControlCenterHandle) {
        match self {
            Self::Open(channel) => handle.open_channel(channel).await,
            Self::Close(channel) => handle.close_channel(channel).await,
            Self::CloseAll => handle.close_all().await,
            Self::Status(channel) => handle.call_status(channel).await,
            Self::Log { channel, on: true } => handle.call_log(channel).await,
            Self::Log { channel, on: false } => handle.end_log(channel).await,
            Self::Version(channel) => handle.call_version(channel).await,
            Self::Kill { channel, username } => handle.kill_user(channel, username).await,
            Self::Send { channel, text } => handle.send_user_command(channel, text).await,
            Self::Help => println!("{}", HELP),
        }
    }
}

pub struct ConsoleView;

impl ControlCenterView for ConsoleView {
    fn status_message(&self, message: &str) {
        println!("* {}", message);
    }

    fn set_channel_controls(&self, channel: &str, controls: ChannelControls) {
        let state = if controls.disconnect_enabled {
            "open"
        } else if controls.connect_enabled {
            "closed"
        } else {
            "busy"
        };
        let log = if controls.logging { ", logging" } else { "" };
        println!("[{}] {}{}", channel, state, log);
    }

    fn set_connected(&self, connected: bool) {
        println!("* {}", if connected { "connected" } else { "disconnected" });
    }

    fn tab_closed(&self) {
        println!("* session closed");
    }

    fn channels_discovered(&self, channels: &BTreeMap<String, ChannelDescriptor>) {
        println!("available channels:");
        for descriptor in channels.values() {
            println!(
                "  {}  {:<6} {}",
                descriptor.number, descriptor.service_type, descriptor.name
            );
        }
    }

    fn client_list_updated(&self, channel: &str, clients: &[ClientStatus]) {
        println!("[{}] {} client(s)", channel, clients.len());
        if clients.is_empty() {
            return;
        }
        println!("  {}", COLUMNS.join(" | "));
        for client in clients {
            println!("  {}", client.to_row().join(" | "));
        }
    }

    fn log_line(&self, channel: &str, text: &str) {
        println!("[{}] {}", channel, text);
    }

    fn version_reported(&self, channel: &str, text: &str) {
        println!("[{}] {}", channel, text);
    }

    fn command_output(&self, channel: &str, text: &str) {
        println!("[{}] > {}", channel, text);
    }

    fn debug_message(&self, text: &str) {
        tracing::debug!("wrapper: {}", text);
    }
}

/// Reconnect prompt fed by the console input loop
#[derive(Default)]
pub struct ConsolePrompt {
    waiting: Mutex<Option<oneshot::Sender<bool>>>,
}

impl ConsolePrompt {
    /// Offer an input line to an open question. Returns true if consumed.
    pub fn answer(&self, line: &str) -> bool {
        let Some(reply) = self.waiting.lock().take() else {
            return false;
        };
        let yes = matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        let _ = reply.send(yes);
        true
    }
}

#[async_trait]
impl ReconnectPrompt for ConsolePrompt {
    async fn confirm_reconnect(&self, host: &str) -> bool {
        let (tx, rx) = oneshot::channel();
        *self.waiting.lock() = Some(tx);
        println!("Connection to {} lost. Reconnect? [y/N]", host);
        rx.await.unwrap_or(false)
    }
}
