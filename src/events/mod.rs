//! Real-time session lifecycle events

mod broadcaster;

pub use broadcaster::{ChannelObserver, EventBroadcaster, Observer, ObserverError};

use serde::Serialize;

use crate::session::Session;

/// Events pushed to every connected observer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionCreated { session: Session },
    RecordingStarted { session_id: String },
    RecordingStopped { session_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = SessionEvent::RecordingStarted {
            session_id: "S1_baseline_1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "recording_started", "session_id": "S1_baseline_1"})
        );
    }
}
