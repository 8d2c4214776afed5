//! JSON-RPC protocol types for model-runner communication.
//!
//! The runner speaks JSON-RPC 2.0, one message per line:
//!
//! - **Requests**: client → runner (`runtime.availability`,
//!   `session.create`, `session.append`, `session.prompt`,
//!   `session.cancel`, `session.destroy`)
//! - **Responses**: runner → client (result or error)
//! - **Notifications**: runner → client (`session.event` carrying
//!   `output.delta` / `session.idle` / `session.error`, and
//!   `model.download_progress` during session creation)

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tandem_domain::{Availability, Modality, Role};

/// Global request ID counter for JSON-RPC requests.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generates a unique request ID.
fn next_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with an auto-generated ID.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_id(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Notification from the runner (session.event, model.download_progress)
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
}

/// Parameters of a `session.event` notification. The event body stays
/// untyped here; its `type` field decides how the session pump reads it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEventParams {
    pub session_id: String,
    pub event: serde_json::Value,
}

/// Availability check parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityParams {
    pub expected_inputs: Vec<Modality>,
    pub expected_outputs: Vec<Modality>,
}

/// Availability check result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResult {
    pub status: Availability,
}

/// Session creation parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    pub expected_inputs: Vec<Modality>,
    pub expected_outputs: Vec<Modality>,
}

/// Session creation result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResult {
    pub session_id: String,
}

/// Parameters for session.append (fold context without prompting)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendParams {
    pub session_id: String,
    pub role: Role,
    pub content: String,
}

/// Parameters for session.prompt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptParams {
    pub session_id: String,
    pub content: String,
}

/// Parameters for session.cancel / session.destroy
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRefParams {
    pub session_id: String,
}

/// Download progress notification parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgressParams {
    pub percent: u8,
}

/// Classification of an incoming JSON-RPC message.
///
/// The runner never sends us requests, so a frame is either a response to
/// something we sent (has `id`) or a notification (has `method`, no `id`).
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    Response,
    Notification,
}

/// Classify a JSON-RPC frame by inspecting its `id` and `method` fields.
///
/// Pure function, called once per frame in the router's reader loop.
pub fn classify_message(json: &serde_json::Value) -> MessageKind {
    let has_id = json.get("id").and_then(|v| v.as_u64()).is_some();
    let has_method = json.get("method").and_then(|v| v.as_str()).is_some();

    if has_id && !has_method {
        MessageKind::Response
    } else {
        MessageKind::Notification
    }
}

/// Extract the text content of a `session.event` payload, if any.
///
/// Events carry `{ "type": "...", "content": "..." }`; error events carry
/// `message` instead.
pub fn event_content(event: &serde_json::Value) -> Option<&str> {
    event.get("content").and_then(|c| c.as_str())
}

/// Extract the error message of a `session.error` event.
pub fn event_error_message(event: &serde_json::Value) -> String {
    event
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown session error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_response() {
        let json = serde_json::json!({"id": 1, "result": {}});
        assert_eq!(classify_message(&json), MessageKind::Response);
    }

    #[test]
    fn classify_notification() {
        let json = serde_json::json!({"method": "session.event", "params": {}});
        assert_eq!(classify_message(&json), MessageKind::Notification);
    }

    #[test]
    fn classify_no_id_no_method() {
        // Neither id nor method: treated as a notification and ignored later
        let json = serde_json::json!({"data": "something"});
        assert_eq!(classify_message(&json), MessageKind::Notification);
    }

    #[test]
    fn create_session_params_omit_unset_sampling() {
        let params = CreateSessionParams {
            system_prompt: None,
            temperature: None,
            top_k: Some(40),
            expected_inputs: vec![Modality::Text],
            expected_outputs: vec![Modality::Text],
        };

        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("systemPrompt").is_none());
        assert!(json.get("temperature").is_none());
        assert_eq!(json["topK"], 40);
        assert_eq!(json["expectedInputs"][0], "text");
    }

    #[test]
    fn append_params_serialize_role_lowercase() {
        let params = AppendParams {
            session_id: "sess-1".to_string(),
            role: Role::System,
            content: "Be terse.".to_string(),
        };

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["sessionId"], "sess-1");
        assert_eq!(json["role"], "system");
    }

    #[test]
    fn availability_result_deserializes() {
        let result: AvailabilityResult =
            serde_json::from_value(serde_json::json!({"status": "downloadable"})).unwrap();
        assert_eq!(result.status, Availability::Downloadable);
    }

    #[test]
    fn event_content_extraction() {
        let event = serde_json::json!({"type": "output.delta", "content": "Hel"});
        assert_eq!(event_content(&event), Some("Hel"));

        let idle = serde_json::json!({"type": "session.idle"});
        assert_eq!(event_content(&idle), None);
    }

    #[test]
    fn event_error_message_falls_back() {
        let event = serde_json::json!({"type": "session.error"});
        assert_eq!(event_error_message(&event), "unknown session error");

        let event = serde_json::json!({"type": "session.error", "message": "oom"});
        assert_eq!(event_error_message(&event), "oom");
    }

    #[test]
    fn request_ids_are_unique() {
        let a = JsonRpcRequest::new("session.prompt", None);
        let b = JsonRpcRequest::new("session.prompt", None);
        assert_ne!(a.id, b.id);
    }
}
