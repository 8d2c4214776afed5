//! JSONL transcript writer.
//!
//! One JSON object per line, each stamped with the event tag and a UTC
//! timestamp. Appends to the file so restarts extend the transcript.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tandem_application::ports::conversation_logger::{ConversationEvent, ConversationLogger};

/// Transcript sink backed by an append-only JSONL file.
pub struct JsonlTranscript {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlTranscript {
    /// Open (or create) the transcript file, creating parent directories
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationLogger for JsonlTranscript {
    fn log(&self, event: ConversationEvent) {
        let at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let record = match event.payload {
            serde_json::Value::Object(mut map) => {
                map.insert(
                    "event".to_string(),
                    serde_json::Value::String(event.event_type.to_string()),
                );
                map.insert("at".to_string(), serde_json::Value::String(at));
                serde_json::Value::Object(map)
            }
            other => serde_json::json!({
                "event": event.event_type,
                "at": at,
                "data": other,
            }),
        };

        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        // Write failures are swallowed: transcripts never disturb a turn.
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

impl Drop for JsonlTranscript {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tandem_domain::{ChatId, TransportMode};

    #[test]
    fn writes_one_stamped_record_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        let transcript = JsonlTranscript::open(&path).unwrap();

        let id = ChatId::for_mode("demo", TransportMode::Local);
        transcript.log(ConversationEvent::turn_started(&id, TransportMode::Local));
        transcript.log(ConversationEvent::turn_completed(
            &id,
            TransportMode::Local,
            11,
        ));
        drop(transcript);

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("event").is_some());
            assert!(value.get("at").is_some());
        }

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "turn_completed");
        assert_eq!(second["chat_id"], "demo-local");
        assert_eq!(second["bytes"], 11);
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        let id = ChatId::for_mode("demo", TransportMode::Remote);

        {
            let transcript = JsonlTranscript::open(&path).unwrap();
            transcript.log(ConversationEvent::turn_started(&id, TransportMode::Remote));
        }
        {
            let transcript = JsonlTranscript::open(&path).unwrap();
            transcript.log(ConversationEvent::turn_cancelled(
                &id,
                TransportMode::Remote,
                0,
            ));
        }

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content.trim().lines().count(), 2);
    }

    #[test]
    fn non_object_payloads_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.jsonl");
        let transcript = JsonlTranscript::open(&path).unwrap();

        transcript.log(ConversationEvent::new(
            "note",
            serde_json::json!("just a string"),
        ));
        drop(transcript);

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["event"], "note");
        assert_eq!(value["data"], "just a string");
    }
}
