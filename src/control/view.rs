//! Presentation boundary
//!
//! The controller never touches concrete UI types. Whatever renders a tab
//! implements `ControlCenterView`; every call is made from the tab's single
//! controller task, in event order.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::protocol::{ChannelDescriptor, ClientStatus};

use super::state::ChannelControls;

pub trait ControlCenterView: Send + Sync {
    /// Transient status-bar message
    fn status_message(&self, message: &str);

    /// Connect/disconnect/log controls for one channel changed
    fn set_channel_controls(&self, channel: &str, controls: ChannelControls);

    /// Whether the wrapper session is up
    fn set_connected(&self, connected: bool);

    /// The tab and its session are gone
    fn tab_closed(&self);

    fn channels_discovered(&self, _channels: &BTreeMap<String, ChannelDescriptor>) {}

    /// Full snapshot of the clients on `channel`; replaces the previous one
    fn client_list_updated(&self, _channel: &str, _clients: &[ClientStatus]) {}

    fn log_line(&self, _channel: &str, _text: &str) {}

    fn version_reported(&self, _channel: &str, _text: &str) {}

    fn command_output(&self, _channel: &str, _text: &str) {}

    fn debug_message(&self, _text: &str) {}

    fn open_failed(&self, channel: &str) {
        self.status_message(&format!("Channel {} could not be opened", channel));
    }

    fn open_timeout(&self, channel: &str) {
        self.status_message(&format!("Timeout while opening channel {}", channel));
    }

    fn kill_failed(&self, channel: &str, username: &str) {
        self.status_message(&format!(
            "Channel {}: no client with common name '{}'",
            channel, username
        ));
    }

    fn duplicate_instance(&self, _text: &str) {
        self.status_message("Another wrapper instance is already running on this server");
    }
}

/// Asks the operator whether a lost session should be re-established
#[async_trait]
pub trait ReconnectPrompt: Send + Sync {
    async fn confirm_reconnect(&self, host: &str) -> bool;
}
