//! Port for structured conversation transcripts.
//!
//! `tracing` carries human-readable diagnostics; this port captures the
//! machine-readable record of what happened to a conversation (turns
//! started, completed, cancelled, failed, transport switches), one event
//! per record.

use serde_json::{Value, json};
use tandem_domain::{ChatId, TransportMode};

/// A structured transcript event: a type tag plus a JSON payload.
pub struct ConversationEvent {
    pub event_type: &'static str,
    pub payload: Value,
}

impl ConversationEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    pub fn turn_started(chat_id: &ChatId, mode: TransportMode) -> Self {
        Self::new(
            "turn_started",
            json!({ "chat_id": chat_id.as_str(), "mode": mode.to_string() }),
        )
    }

    pub fn turn_completed(chat_id: &ChatId, mode: TransportMode, bytes: usize) -> Self {
        Self::new(
            "turn_completed",
            json!({ "chat_id": chat_id.as_str(), "mode": mode.to_string(), "bytes": bytes }),
        )
    }

    pub fn turn_cancelled(chat_id: &ChatId, mode: TransportMode, bytes: usize) -> Self {
        Self::new(
            "turn_cancelled",
            json!({ "chat_id": chat_id.as_str(), "mode": mode.to_string(), "bytes": bytes }),
        )
    }

    pub fn turn_failed(chat_id: &ChatId, mode: TransportMode, message: &str) -> Self {
        Self::new(
            "turn_failed",
            json!({ "chat_id": chat_id.as_str(), "mode": mode.to_string(), "error": message }),
        )
    }

    pub fn mode_switched(from: TransportMode, to: TransportMode, carried_messages: usize) -> Self {
        Self::new(
            "mode_switched",
            json!({
                "from": from.to_string(),
                "to": to.to_string(),
                "carried_messages": carried_messages,
            }),
        )
    }
}

/// Sink for transcript events.
///
/// `log` is synchronous and infallible on purpose: transcripts must never
/// disturb a turn in flight, so write failures are swallowed by the
/// implementation.
pub trait ConversationLogger: Send + Sync {
    fn log(&self, event: ConversationEvent);
}

/// No-op sink for tests and for runs without a transcript file.
pub struct NoConversationLogger;

impl ConversationLogger for NoConversationLogger {
    fn log(&self, _event: ConversationEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_events_carry_chat_identity() {
        let id = ChatId::for_mode("demo", TransportMode::Local);
        let event = ConversationEvent::turn_completed(&id, TransportMode::Local, 42);
        assert_eq!(event.event_type, "turn_completed");
        assert_eq!(event.payload["chat_id"], "demo-local");
        assert_eq!(event.payload["mode"], "local");
        assert_eq!(event.payload["bytes"], 42);
    }

    #[test]
    fn mode_switch_records_both_sides() {
        let event = ConversationEvent::mode_switched(TransportMode::Local, TransportMode::Remote, 3);
        assert_eq!(event.payload["from"], "local");
        assert_eq!(event.payload["to"], "remote");
        assert_eq!(event.payload["carried_messages"], 3);
    }
}
