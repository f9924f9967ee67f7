//! Per-channel UI state

use std::collections::BTreeMap;

use crate::protocol::ChannelDescriptor;

/// Lifecycle of one management channel as the operator sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    #[default]
    Closed,
    /// Open requested, or the wrapper answered `WAIT`
    Opening,
    Open,
    Closing,
}

/// Enabled state of the per-channel controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelControls {
    pub connect_enabled: bool,
    pub disconnect_enabled: bool,
    pub logging: bool,
}

impl ChannelControls {
    pub fn for_phase(phase: ChannelPhase, logging: bool) -> Self {
        Self {
            connect_enabled: phase == ChannelPhase::Closed,
            disconnect_enabled: phase == ChannelPhase::Open,
            logging: logging && phase == ChannelPhase::Open,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelEntry {
    pub descriptor: Option<ChannelDescriptor>,
    pub phase: ChannelPhase,
    pub logging: bool,
}

impl ChannelEntry {
    pub fn controls(&self) -> ChannelControls {
        ChannelControls::for_phase(self.phase, self.logging)
    }
}

/// Channel table of one tab. Owned by the controller task.
#[derive(Debug, Default)]
pub struct ChannelTable {
    entries: BTreeMap<String, ChannelEntry>,
}

impl ChannelTable {
    pub fn get(&self, channel: &str) -> Option<&ChannelEntry> {
        self.entries.get(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&String, &ChannelEntry)> {
        self.entries.iter()
    }

    /// Merge a fresh listing. Known channels keep their phase.
    pub fn merge_listing(&mut self, channels: &BTreeMap<String, ChannelDescriptor>) {
        for (number, descriptor) in channels {
            self.entries.entry(number.clone()).or_default().descriptor = Some(descriptor.clone());
        }
    }

    /// Move `channel` to `phase`. Returns the new controls if they changed.
    pub fn transition(&mut self, channel: &str, phase: ChannelPhase) -> Option<ChannelControls> {
        let entry = self.entries.entry(channel.to_string()).or_default();
        let before = entry.controls();
        entry.phase = phase;
        if phase != ChannelPhase::Open {
            entry.logging = false;
        }
        let after = entry.controls();
        (before != after).then_some(after)
    }

    pub fn set_logging(&mut self, channel: &str, logging: bool) -> Option<ChannelControls> {
        let entry = self.entries.entry(channel.to_string()).or_default();
        let before = entry.controls();
        entry.logging = logging;
        let after = entry.controls();
        (before != after).then_some(after)
    }

    /// Mark every channel closed, returning those whose controls changed
    pub fn close_all(&mut self) -> Vec<(String, ChannelControls)> {
        let numbers: Vec<String> = self.entries.keys().cloned().collect();
        numbers
            .into_iter()
            .filter_map(|n| self.transition(&n, ChannelPhase::Closed).map(|c| (n, c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controls_per_phase() {
        let closed = ChannelControls::for_phase(ChannelPhase::Closed, false);
        assert!(closed.connect_enabled && !closed.disconnect_enabled);

        let opening = ChannelControls::for_phase(ChannelPhase::Opening, false);
        assert!(!opening.connect_enabled && !opening.disconnect_enabled);

        let open = ChannelControls::for_phase(ChannelPhase::Open, true);
        assert!(!open.connect_enabled && open.disconnect_enabled && open.logging);

        // logging only shows on open channels
        assert!(!ChannelControls::for_phase(ChannelPhase::Closing, true).logging);
    }

    #[test]
    fn test_transition_reports_changes_once() {
        let mut table = ChannelTable::default();
        assert!(table.transition("05", ChannelPhase::Opening).is_some());
        assert!(table.transition("05", ChannelPhase::Opening).is_none());
        assert!(table.transition("05", ChannelPhase::Open).is_some());
        assert!(table.transition("05", ChannelPhase::Open).is_none());
    }

    #[test]
    fn test_close_resets_logging() {
        let mut table = ChannelTable::default();
        table.transition("05", ChannelPhase::Open);
        table.set_logging("05", true);
        assert!(table.get("05").map(|e| e.logging).unwrap_or(false));

        let changed = table.close_all();
        assert_eq!(changed.len(), 1);
        assert!(!table.get("05").map(|e| e.logging).unwrap_or(true));
    }

    #[test]
    fn test_merge_listing_keeps_phase() {
        let mut table = ChannelTable::default();
        table.transition("02", ChannelPhase::Open);

        let mut listing = BTreeMap::new();
        for n in ["02", "03"] {
            listing.insert(
                n.to_string(),
                ChannelDescriptor {
                    number: n.to_string(),
                    service_type: "VPNM".into(),
                    name: format!("mgmt {}", n),
                },
            );
        }
        table.merge_listing(&listing);

        assert_eq!(table.get("02").map(|e| e.phase), Some(ChannelPhase::Open));
        assert_eq!(table.get("03").map(|e| e.phase), Some(ChannelPhase::Closed));
        assert_eq!(table.channels().count(), 2);
    }
}
