//! Client status model
//!
//! One connected VPN client as reported by a channel's `status` output. An
//! entry starts from the CLIENT LIST section and is completed by the ROUTING
//! TABLE section of the same report, matched on common name.

use chrono::NaiveDateTime;

/// Width of the `>NN> ` marker in front of status table lines
pub const DATA_PREFIX_LEN: usize = 5;

/// Timestamp layout used by the OpenVPN status report
const STATUS_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Column headers of `ClientStatus::to_row`
pub const COLUMNS: [&str; 7] = [
    "Common Name",
    "Real Address",
    "Virtual Address",
    "Bytes Received",
    "Bytes Sent",
    "Connected Since",
    "Last Ref",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub common_name: String,
    pub real_address: String,
    pub virtual_address: Option<String>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connected_since: String,
    pub last_ref: Option<String>,
}

/// One ROUTING TABLE row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub virtual_address: String,
    pub common_name: String,
    pub real_address: String,
    pub last_ref: String,
}

/// Drop the `>NN> ` marker, tolerating short or non-ASCII lines
pub fn strip_data_prefix(line: &str) -> &str {
    match line.char_indices().nth(DATA_PREFIX_LEN) {
        Some((idx, _)) => &line[idx..],
        None => "",
    }
}

impl ClientStatus {
    /// Build an entry from a CLIENT LIST line
    /// (`>NN> name,real address,bytes received,bytes sent,connected since`).
    pub fn from_client_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = strip_data_prefix(line).splitn(5, ',').collect();
        let &[common_name, real_address, received, sent, since] = fields.as_slice() else {
            return None;
        };
        if common_name.is_empty() {
            return None;
        }

        Some(Self {
            common_name: common_name.to_string(),
            real_address: real_address.to_string(),
            virtual_address: None,
            bytes_received: received.trim().parse().unwrap_or(0),
            bytes_sent: sent.trim().parse().unwrap_or(0),
            connected_since: since.trim().to_string(),
            last_ref: None,
        })
    }

    /// Fill in the routing columns
    pub fn apply_routing(&mut self, routing: &RoutingEntry) {
        self.virtual_address = Some(routing.virtual_address.clone());
        self.last_ref = Some(routing.last_ref.clone());
    }

    pub fn connected_since_time(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.connected_since, STATUS_TIME_FORMAT).ok()
    }

    pub fn last_ref_time(&self) -> Option<NaiveDateTime> {
        self.last_ref
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, STATUS_TIME_FORMAT).ok())
    }

    /// Fixed-order projection for table display, see `COLUMNS`
    pub fn to_row(&self) -> [String; 7] {
        [
            self.common_name.clone(),
            self.real_address.clone(),
            self.virtual_address.clone().unwrap_or_default(),
            self.bytes_received.to_string(),
            self.bytes_sent.to_string(),
            self.connected_since.clone(),
            self.last_ref.clone().unwrap_or_default(),
        ]
    }
}

impl RoutingEntry {
    /// Parse a ROUTING TABLE line
    /// (`>NN> virtual address,common name,real address,last ref`).
    pub fn from_routing_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = strip_data_prefix(line).splitn(4, ',').collect();
        let &[virtual_address, common_name, real_address, last_ref] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            virtual_address: virtual_address.to_string(),
            common_name: common_name.to_string(),
            real_address: real_address.to_string(),
            last_ref: last_ref.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_client_line() {
        let entry = ClientStatus::from_client_line(
            ">02> alice,203.0.113.9:49502,334948,1973012,Thu Jun 18 04:23:03 2009",
        )
        .unwrap();

        assert_eq!(entry.common_name, "alice");
        assert_eq!(entry.real_address, "203.0.113.9:49502");
        assert_eq!(entry.bytes_received, 334948);
        assert_eq!(entry.bytes_sent, 1973012);
        assert_eq!(entry.connected_since, "Thu Jun 18 04:23:03 2009");
        assert!(entry.virtual_address.is_none());

        let since = entry.connected_since_time().unwrap();
        assert_eq!((since.year(), since.month(), since.day()), (2009, 6, 18));
        assert_eq!(since.hour(), 4);
    }

    #[test]
    fn test_client_line_too_few_fields() {
        assert!(ClientStatus::from_client_line(">02> alice,203.0.113.9:1194").is_none());
        assert!(ClientStatus::from_client_line(">02>").is_none());
        assert!(ClientStatus::from_client_line("").is_none());
    }

    #[test]
    fn test_routing_merge_and_row() {
        let mut entry = ClientStatus::from_client_line(
            ">02> bob,198.51.100.4:1194,10,20,Thu Jun 18 04:23:03 2009",
        )
        .unwrap();
        let routing = RoutingEntry::from_routing_line(
            ">02> 10.8.0.6,bob,198.51.100.4:1194,Thu Jun 18 08:12:09 2009",
        )
        .unwrap();
        assert_eq!(routing.common_name, "bob");

        entry.apply_routing(&routing);
        assert_eq!(entry.virtual_address.as_deref(), Some("10.8.0.6"));
        assert!(entry.last_ref_time().is_some());

        let row = entry.to_row();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "bob");
        assert_eq!(row[2], "10.8.0.6");
        assert_eq!(row[3], "10");
        assert_eq!(row[6], "Thu Jun 18 08:12:09 2009");
    }

    #[test]
    fn test_unparsable_counters_default_to_zero() {
        let entry =
            ClientStatus::from_client_line(">02> carol,192.0.2.1:1194,n/a,,sometime").unwrap();
        assert_eq!(entry.bytes_received, 0);
        assert_eq!(entry.bytes_sent, 0);
        assert!(entry.connected_since_time().is_none());
    }

    #[test]
    fn test_strip_prefix_short_line() {
        assert_eq!(strip_data_prefix(">02>"), "");
        assert_eq!(strip_data_prefix(">02> x"), "x");
    }
}
