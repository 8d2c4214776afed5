//! Chat message entities.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for message ids.
static MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> String {
    format!("msg-{}", MESSAGE_ID.fetch_add(1, Ordering::SeqCst))
}

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One content part of a message.
///
/// Only the `Text` variant is processed by the transports; image and audio
/// parts are carried opaquely for collaborators further up the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { data: String },
    Audio { data: String },
}

/// A message in a conversation (Entity)
///
/// Immutable once appended to a conversation; a conversation is an ordered
/// `Vec<Message>` whose insertion order is turn order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// Creates a message with a generated id and a single text part.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: next_message_id(),
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Creates a message with an explicit id (used when replaying stored
    /// conversations, and in tests).
    pub fn with_id(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Concatenated text content of all text parts, in order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let ContentPart::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// True if the message carries any non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.text().trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_text_parts_only() {
        let message = Message {
            id: "m1".to_string(),
            role: Role::User,
            parts: vec![
                ContentPart::Text {
                    text: "Hello".to_string(),
                },
                ContentPart::Image {
                    data: "base64".to_string(),
                },
                ContentPart::Text {
                    text: " world".to_string(),
                },
            ],
        };
        assert_eq!(message.text(), "Hello world");
    }

    #[test]
    fn has_text_rejects_whitespace_only() {
        assert!(!Message::user("   \n\t").has_text());
        assert!(Message::user("hi").has_text());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = Message::user("a");
        let b = Message::user("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(Role::Assistant).unwrap();
        assert_eq!(json, "assistant");
    }

    #[test]
    fn content_part_is_type_tagged() {
        let json = serde_json::to_value(ContentPart::Text {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }
}
