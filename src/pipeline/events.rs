//! Dashboard wire messages.
//!
//! Two message types share the socket:
//!
//! ```text
//! {"type":"state_update","state":{"lanes":[...],"timing_config":{"cycle_delay":0.3}}}
//! {"type":"log","log_type":"sort","name":"Loai 2","count":4,"timestamp":"14:02:11"}
//! ```

use serde::Serialize;

use super::state::LaneBoard;

/// A discrete occurrence worth showing in the dashboard feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "log_type", rename_all = "snake_case")]
pub enum SorterEvent {
    /// Free-text progress note
    Info { message: String },
    /// A lane code was accepted and its lane armed
    Qr { data: String },
    /// A payload that matches no lane and is not the reject code
    UnknownQr { data: String },
    /// The reject code was scanned
    QrNg { data: String },
    /// A cycle finished; `count` is the lane's new total
    Sort { name: String, count: u64 },
    /// A lane sensor changed; `status` is true while an item is present
    Sensor { name: String, status: bool },
}

impl SorterEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::Qr { .. } => "qr",
            Self::UnknownQr { .. } => "unknown_qr",
            Self::QrNg { .. } => "qr_ng",
            Self::Sort { .. } => "sort",
            Self::Sensor { .. } => "sensor",
        }
    }
}

impl std::fmt::Display for SorterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info { message } => write!(f, "{message}"),
            Self::Qr { data } => write!(f, "QR accepted: {data}"),
            Self::UnknownQr { data } => write!(f, "Unknown QR: {data}"),
            Self::QrNg { data } => write!(f, "Rejected product: {data}"),
            Self::Sort { name, count } => write!(f, "{name} sorted (total {count})"),
            Self::Sensor { name, status } => {
                write!(f, "{name} sensor {}", if *status { "active" } else { "clear" })
            }
        }
    }
}

/// An event stamped with wall-clock time.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub event: SorterEvent,
    /// Local time, `HH:MM:SS`
    pub timestamp: String,
}

impl LogEntry {
    pub fn now(event: SorterEvent) -> Self {
        Self {
            event,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

/// Everything pushed to a dashboard client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    StateUpdate { state: &'a LaneBoard },
    Log(&'a LogEntry),
}

impl OutboundMessage<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_event_wire_format() {
        let entry = LogEntry {
            event: SorterEvent::Sort {
                name: "Loai 2".to_string(),
                count: 4,
            },
            timestamp: "14:02:11".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&OutboundMessage::Log(&entry).to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "log");
        assert_eq!(json["log_type"], "sort");
        assert_eq!(json["name"], "Loai 2");
        assert_eq!(json["count"], 4);
        assert_eq!(json["timestamp"], "14:02:11");
    }

    #[test]
    fn test_kinds_match_wire_tags() {
        let events = [
            SorterEvent::info("x"),
            SorterEvent::Qr { data: "LOAI1".into() },
            SorterEvent::UnknownQr { data: "XYZ".into() },
            SorterEvent::QrNg { data: "NG".into() },
            SorterEvent::Sort { name: "a".into(), count: 1 },
            SorterEvent::Sensor { name: "a".into(), status: true },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["log_type"], event.kind());
        }
    }

    #[test]
    fn test_state_update_wire_format() {
        let board = LaneBoard::new(["A", "B", "C"], 0.5);
        let json: serde_json::Value = serde_json::from_str(
            &OutboundMessage::StateUpdate { state: &board }.to_json().unwrap(),
        )
        .unwrap();

        assert_eq!(json["type"], "state_update");
        assert_eq!(json["state"]["lanes"][2]["name"], "C");
        assert_eq!(json["state"]["timing_config"]["cycle_delay"], 0.5);
    }

    #[test]
    fn test_log_entry_timestamp_format() {
        let entry = LogEntry::now(SorterEvent::info("hello"));
        assert_eq!(entry.timestamp.len(), 8);
        assert_eq!(entry.timestamp.matches(':').count(), 2);
    }
}
