//! Wrapper line parser
//!
//! Single pass, one line at a time. Multi-line replies (the channel listing
//! and the client status report) are collected per channel in a small state
//! machine and emitted as one event when their terminator line arrives:
//!
//! ```text
//!          CHANNELS:            one-token line
//!   Idle ─────────────▶ CollectingChannels ───────────────▶ Idle (ChannelsDiscovered)
//!
//!          OpenVPN CLIENT LIST     Virtual Address header        GLOBAL STATS
//!   Idle ───────────────────▶ Clients(Primary) ─────────▶ Clients(Routing) ─────▶ Idle (ClientListUpdated)
//! ```
//!
//! Replies for different channels may interleave on the one stream, so the
//! state is keyed by the channel code carried in each line.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use super::command::{CONTROL_CHANNEL, DEBUG_CHANNEL};
use super::event::{ChannelDescriptor, OperationKind, ProtocolErrorKind, ProtocolEvent, ReplyStatus};
use super::patterns::{classify_error, kill_failed_username, open_failure_channel};
use super::prefix::{LinePrefix, PrefixKind};
use super::status::{ClientStatus, RoutingEntry};

const CHANNELS_KEYWORD: &str = "CHANNELS:";
const CLIENT_LIST_BANNER: &str = "OpenVPN CLIENT LIST";
const UPDATED_MARKER: &str = "Updated,";
const CLIENT_LIST_HEADER: &str = "Common Name,Real Address";
const ROUTING_TABLE_MARKER: &str = "ROUTING TABLE";
const ROUTING_HEADER: &str = "Virtual Address,Common Name";
const GLOBAL_STATS_MARKER: &str = "GLOBAL STATS";
const LOG_MARKER: &str = ">LOG:";
const VERSION_MARKER: &str = "OpenVPN Version:";
const KILLED_MARKER: &str = "client(s) killed";

/// Open/close requests awaiting their `OK`/`FAIL`, owned by the communicator.
///
/// Only one of each kind is tracked; a second request overwrites the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingOperations {
    pub open: Option<String>,
    pub close: Option<String>,
}

impl PendingOperations {
    pub fn is_empty(&self) -> bool {
        self.open.is_none() && self.close.is_none()
    }
}

/// Communicator state the parser needs to interpret a line
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    pub pending: &'a PendingOperations,
    /// Channel in interactive command mode
    pub interactive: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientPhase {
    Primary,
    Routing,
}

#[derive(Debug, Default)]
enum SequenceState {
    #[default]
    Idle,
    CollectingChannels(BTreeMap<String, ChannelDescriptor>),
    CollectingClients {
        phase: ClientPhase,
        clients: Vec<ClientStatus>,
    },
}

#[derive(Debug, Default)]
pub struct LineParser {
    sequences: HashMap<String, SequenceState>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a multi-line reply is being collected on `channel`
    pub fn in_sequence(&self, channel: &str) -> bool {
        !matches!(
            self.sequences.get(channel),
            None | Some(SequenceState::Idle)
        )
    }

    /// Feed one line. Returns the event the line completes, if any.
    pub fn feed(&mut self, line: &str, ctx: LineContext<'_>) -> Option<ProtocolEvent> {
        let Some(prefix) = LinePrefix::parse(line) else {
            trace!("Dropping line with undefined prefix: {:?}", line);
            return None;
        };

        if prefix.kind == PrefixKind::Output {
            // tty echo of our own instruction
            return None;
        }

        let channel = prefix.channel;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if line.contains(LOG_MARKER) {
            return Some(ProtocolEvent::LogLine {
                text: payload(line).to_string(),
                channel,
            });
        }

        let is_reply = matches!(prefix.kind, PrefixKind::Input | PrefixKind::InputNoNewline);
        if is_reply && self.in_sequence(&channel) {
            return self.continue_sequence(channel, line, &tokens);
        }

        if let Some(status) = tokens.get(1).and_then(|t| ReplyStatus::from_keyword(t)) {
            return reply_status_event(channel, status, &tokens, ctx.pending);
        }

        if tokens.get(1) == Some(&CHANNELS_KEYWORD) && channel == CONTROL_CHANNEL {
            debug!("Channel listing started");
            self.sequences.insert(
                channel,
                SequenceState::CollectingChannels(BTreeMap::new()),
            );
            return None;
        }

        if line.contains(CLIENT_LIST_BANNER) {
            debug!("Client list started on channel {}", channel);
            self.sequences.insert(
                channel,
                SequenceState::CollectingClients {
                    phase: ClientPhase::Primary,
                    clients: Vec::new(),
                },
            );
            return None;
        }

        if line.contains(VERSION_MARKER) {
            return Some(ProtocolEvent::VersionReported {
                text: payload(line).to_string(),
                channel,
            });
        }

        if line.contains(KILLED_MARKER) {
            return Some(ProtocolEvent::ClientsKilled {
                text: payload(line).to_string(),
                channel,
            });
        }

        if let Some(kind) = classify_error(line) {
            return Some(error_event(kind, channel, line));
        }

        match prefix.kind {
            PrefixKind::Closedown => {
                return Some(ProtocolEvent::Closedown {
                    text: payload(line).to_string(),
                    channel,
                })
            }
            PrefixKind::Error => {
                return Some(ProtocolEvent::ErrorDetected {
                    kind: ProtocolErrorKind::Generic,
                    username: None,
                    text: payload(line).to_string(),
                    channel,
                })
            }
            _ => {}
        }

        if channel == DEBUG_CHANNEL {
            return Some(ProtocolEvent::DebugMessage {
                text: payload(line).to_string(),
            });
        }

        if ctx.interactive == Some(channel.as_str()) {
            return Some(ProtocolEvent::CommandOutput {
                text: payload(line).to_string(),
                channel,
            });
        }

        trace!("Unclassified line on channel {}: {:?}", channel, line);
        None
    }

    fn continue_sequence(
        &mut self,
        channel: String,
        line: &str,
        tokens: &[&str],
    ) -> Option<ProtocolEvent> {
        let state = self.sequences.entry(channel.clone()).or_default();

        match state {
            SequenceState::Idle => None,

            SequenceState::CollectingChannels(found) => match tokens.len() {
                0 | 1 => {
                    let channels = std::mem::take(found);
                    *state = SequenceState::Idle;
                    debug!("Channel listing complete: {} channel(s)", channels.len());
                    Some(ProtocolEvent::ChannelsDiscovered { channels })
                }
                2 => None,
                _ => {
                    let descriptor = channel_descriptor(tokens);
                    found.insert(descriptor.number.clone(), descriptor);
                    None
                }
            },

            SequenceState::CollectingClients { phase, clients } => {
                if line.contains(GLOBAL_STATS_MARKER) {
                    let clients = std::mem::take(clients);
                    *state = SequenceState::Idle;
                    debug!(
                        "Client list complete on channel {}: {} client(s)",
                        channel,
                        clients.len()
                    );
                    return Some(ProtocolEvent::ClientListUpdated { channel, clients });
                }

                if line.contains(CLIENT_LIST_BANNER) {
                    // a new report restarts the snapshot
                    clients.clear();
                    *phase = ClientPhase::Primary;
                    return None;
                }

                if line.contains(ROUTING_HEADER) {
                    *phase = ClientPhase::Routing;
                    return None;
                }

                if line.contains(UPDATED_MARKER)
                    || line.contains(CLIENT_LIST_HEADER)
                    || line.contains(ROUTING_TABLE_MARKER)
                {
                    return None;
                }

                match phase {
                    ClientPhase::Primary => match ClientStatus::from_client_line(line) {
                        Some(entry) => {
                            clients.retain(|c| c.common_name != entry.common_name);
                            clients.push(entry);
                        }
                        None => debug!("Malformed client line on {}: {:?}", channel, line),
                    },
                    ClientPhase::Routing => match RoutingEntry::from_routing_line(line) {
                        Some(route) => {
                            match clients.iter_mut().find(|c| c.common_name == route.common_name)
                            {
                                Some(entry) => entry.apply_routing(&route),
                                None => trace!(
                                    "Routing entry for unknown client {} dropped",
                                    route.common_name
                                ),
                            }
                        }
                        None => debug!("Malformed routing line on {}: {:?}", channel, line),
                    },
                }
                None
            }
        }
    }
}

/// Text after the prefix token
fn payload(line: &str) -> &str {
    let trimmed = line.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => trimmed[idx..].trim(),
        None => "",
    }
}

fn is_channel_number(token: &str) -> bool {
    token.len() == 2 && token.bytes().all(|b| b.is_ascii_digit())
}

/// `>00> <index> <number> <type> "<display name>"`
fn channel_descriptor(tokens: &[&str]) -> ChannelDescriptor {
    let name = tokens
        .get(4..)
        .unwrap_or_default()
        .join(" ")
        .trim_matches('"')
        .to_string();

    ChannelDescriptor {
        number: tokens.get(2).copied().unwrap_or_default().to_string(),
        service_type: tokens.get(3).copied().unwrap_or_default().to_string(),
        name,
    }
}

fn reply_status_event(
    channel: String,
    status: ReplyStatus,
    tokens: &[&str],
    pending: &PendingOperations,
) -> Option<ProtocolEvent> {
    match status {
        ReplyStatus::Wait => {
            let target = tokens.get(3).filter(|t| is_channel_number(t))?;
            Some(ProtocolEvent::OperationAcknowledged {
                channel: target.to_string(),
                operation: Some(OperationKind::Open),
                status,
            })
        }
        ReplyStatus::Ok | ReplyStatus::Fail if channel == CONTROL_CHANNEL => {
            let (channel, operation) = if let Some(open) = &pending.open {
                (open.clone(), Some(OperationKind::Open))
            } else if let Some(close) = &pending.close {
                (close.clone(), Some(OperationKind::Close))
            } else {
                (channel, None)
            };
            Some(ProtocolEvent::OperationAcknowledged {
                channel,
                operation,
                status,
            })
        }
        _ => Some(ProtocolEvent::OperationAcknowledged {
            channel,
            operation: None,
            status,
        }),
    }
}

fn error_event(kind: ProtocolErrorKind, channel: String, line: &str) -> ProtocolEvent {
    match kind {
        ProtocolErrorKind::OpenFailed | ProtocolErrorKind::OpenTimeout => {
            ProtocolEvent::ErrorDetected {
                kind,
                channel: open_failure_channel(line),
                username: None,
                text: payload(line).to_string(),
            }
        }
        ProtocolErrorKind::KillFailed => ProtocolEvent::ErrorDetected {
            kind,
            channel,
            username: kill_failed_username(line),
            text: payload(line).to_string(),
        },
        _ => ProtocolEvent::ErrorDetected {
            kind,
            channel,
            username: None,
            text: payload(line).to_string(),
        },
    }
}
