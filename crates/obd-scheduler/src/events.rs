//! Events published to the presentation layer

use obd_protocol::{Snapshot, TroubleCode};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Notification from the link to its collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LinkEvent {
    /// Connect attempt finished or the link went away
    ConnectionStatusChanged { success: bool, message: String },
    /// One completed poll cycle
    SnapshotProduced(Snapshot),
    /// Result of an on-demand trouble-code read
    TroubleCodesProduced(Vec<TroubleCode>),
}

pub type EventSender = mpsc::UnboundedSender<LinkEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Publish an event; a closed receiver only means nobody is listening
pub(crate) fn emit(events: &EventSender, event: LinkEvent) {
    if events.send(event).is_err() {
        debug!("Event receiver closed, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let status = LinkEvent::ConnectionStatusChanged {
            success: true,
            message: "Reset: ELM327 v1.5".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["event"], "connection_status_changed");
        assert_eq!(json["data"]["success"], true);

        let codes = LinkEvent::TroubleCodesProduced(vec![TroubleCode::new("P0133")]);
        let json = serde_json::to_value(&codes).unwrap();
        assert_eq!(json["event"], "trouble_codes_produced");
        assert_eq!(json["data"][0]["code"], "P0133");
    }

    #[test]
    fn test_emit_without_listener() {
        let (tx, rx) = event_channel();
        drop(rx);
        emit(&tx, LinkEvent::TroubleCodesProduced(Vec::new()));
    }
}
