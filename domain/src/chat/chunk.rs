//! The uniform streaming chunk protocol.
//!
//! [`Chunk`] is the wire contract between any transport and the chat
//! consumer. For a single turn the chunks of a text id are totally ordered:
//! one `text-start`, zero or more `text-delta`, exactly one `text-end`, then
//! exactly one `finish`. A failed turn replaces the remainder of that
//! sequence with a single `error`, after a best-effort `text-end` if a
//! `text-start` had already been emitted. A cancelled turn ends after the
//! best-effort `text-end` with neither `finish` nor `error`.

use serde::{Deserialize, Serialize};

/// One unit of the streaming output protocol.
///
/// Serialized with a `type` tag using the kebab-case wire names
/// (`text-start`, `text-delta`, `text-end`, `finish`, `error`), shared
/// verbatim with the remote endpoint's newline-delimited JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Chunk {
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    Finish { id: String },
    Error { message: String },
}

impl Chunk {
    /// The text-part id this chunk belongs to, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Chunk::TextStart { id }
            | Chunk::TextDelta { id, .. }
            | Chunk::TextEnd { id }
            | Chunk::Finish { id } => Some(id),
            Chunk::Error { .. } => None,
        }
    }

    /// True if no further chunks may follow this one within a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Finish { .. } | Chunk::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_are_kebab_case() {
        let start = serde_json::to_value(Chunk::TextStart {
            id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(start["type"], "text-start");

        let delta = serde_json::to_value(Chunk::TextDelta {
            id: "t1".to_string(),
            delta: "Hello".to_string(),
        })
        .unwrap();
        assert_eq!(delta["type"], "text-delta");
        assert_eq!(delta["delta"], "Hello");

        let end = serde_json::to_value(Chunk::TextEnd {
            id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(end["type"], "text-end");

        let finish = serde_json::to_value(Chunk::Finish {
            id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(finish["type"], "finish");

        let error = serde_json::to_value(Chunk::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(error["type"], "error");
    }

    #[test]
    fn deserializes_from_wire_form() {
        let chunk: Chunk =
            serde_json::from_str(r#"{"type":"text-delta","id":"t9","delta":" world"}"#).unwrap();
        assert_eq!(
            chunk,
            Chunk::TextDelta {
                id: "t9".to_string(),
                delta: " world".to_string(),
            }
        );
    }

    #[test]
    fn terminal_chunks() {
        assert!(
            Chunk::Finish {
                id: "t1".to_string()
            }
            .is_terminal()
        );
        assert!(
            Chunk::Error {
                message: "x".to_string()
            }
            .is_terminal()
        );
        assert!(
            !Chunk::TextEnd {
                id: "t1".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn error_has_no_part_id() {
        assert_eq!(
            Chunk::Error {
                message: "x".to_string()
            }
            .id(),
            None
        );
        assert_eq!(
            Chunk::TextStart {
                id: "t2".to_string()
            }
            .id(),
            Some("t2")
        );
    }
}
