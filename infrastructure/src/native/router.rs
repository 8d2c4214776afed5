//! Stdio demultiplexer for the model-runner process.
//!
//! The runner is one subprocess shared by every session, so a single
//! background reader task owns its stdout exclusively and routes each
//! incoming frame: responses are correlated to pending requests by id,
//! `session.event` notifications go to the per-session channel, and
//! `model.download_progress` notifications go to the download watcher
//! installed during session creation.

use crate::native::error::{NativeError, Result};
use crate::native::protocol::{
    DownloadProgressParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageKind,
    SessionEventParams, classify_message,
};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Timeout for ordinary requests. `session.create` opts out: a model
/// download can run for minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Routing state shared with the background reader task.
struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
    sessions: RwLock<HashMap<String, mpsc::UnboundedSender<serde_json::Value>>>,
    download_watch: Mutex<Option<mpsc::UnboundedSender<u8>>>,
}

/// Receiver half of one session's event channel.
pub struct SessionEvents {
    receiver: mpsc::UnboundedReceiver<serde_json::Value>,
}

impl SessionEvents {
    /// Next event for this session; `None` once the runner is gone or the
    /// session was deregistered.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        self.receiver.recv().await
    }

    /// Non-blocking read, used to discard events left over from an
    /// aborted turn before the next prompt is issued.
    pub fn try_recv(&mut self) -> Option<serde_json::Value> {
        self.receiver.try_recv().ok()
    }
}

/// Owns the runner subprocess and its stdio framing.
pub struct StdioRouter {
    shared: Arc<Shared>,
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    reader: JoinHandle<()>,
}

impl StdioRouter {
    /// Spawn the runner and start the background reader task.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Arc<Self>> {
        debug!(command, "spawning model runner");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| NativeError::UnexpectedResponse("runner stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| NativeError::UnexpectedResponse("runner stdout unavailable".into()))?;

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            download_watch: Mutex::new(None),
        });
        let reader = tokio::spawn(read_loop(BufReader::new(stdout), Arc::clone(&shared)));

        Ok(Arc::new(Self {
            shared,
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            reader,
        }))
    }

    /// Send a request and await its response with the default timeout.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse> {
        self.request_with_timeout(method, params, Some(REQUEST_TIMEOUT))
            .await
    }

    /// Send a request and await its response. `None` disables the timeout
    /// (used by `session.create`, which may sit behind a model download).
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(method, params);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(request.id, tx);

        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.shared.pending.lock().await.remove(&request.id);
                warn!("write to model runner failed: {}", e);
                return Err(NativeError::TransportClosed);
            }
            if stdin.flush().await.is_err() {
                self.shared.pending.lock().await.remove(&request.id);
                return Err(NativeError::TransportClosed);
            }
        }
        trace!(method, id = request.id, "request sent");

        let response = match timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(result) => result,
                Err(_) => {
                    self.shared.pending.lock().await.remove(&request.id);
                    return Err(NativeError::Timeout);
                }
            },
            None => rx.await,
        };
        response.map_err(|_| NativeError::TransportClosed)
    }

    /// Open the event channel for a session id. Events arriving before the
    /// first read are buffered.
    pub async fn register_session(&self, session_id: &str) -> SessionEvents {
        let (tx, receiver) = mpsc::unbounded_channel();
        self.shared
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), tx);
        SessionEvents { receiver }
    }

    pub async fn deregister_session(&self, session_id: &str) {
        self.shared.sessions.write().await.remove(session_id);
    }

    /// Install a download-progress watcher, replacing any previous one.
    pub async fn watch_downloads(&self) -> mpsc::UnboundedReceiver<u8> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.download_watch.lock().await = Some(tx);
        rx
    }

    pub async fn clear_download_watch(&self) {
        *self.shared.download_watch.lock().await = None;
    }

    /// Stop the reader task and kill the runner process.
    pub async fn shutdown(&self) {
        self.reader.abort();
        let mut child = self.child.lock().await;
        if let Err(e) = child.start_kill() {
            debug!("model runner already gone: {}", e);
        }
    }
}

/// Background reader: one frame per line until the runner exits.
async fn read_loop(reader: BufReader<ChildStdout>, shared: Arc<Shared>) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                dispatch(&shared, &line).await;
            }
            Ok(None) => {
                debug!("model runner closed stdout");
                break;
            }
            Err(e) => {
                warn!("error reading from model runner: {}", e);
                break;
            }
        }
    }

    // Drop all routing state so every waiter observes the closed transport.
    shared.pending.lock().await.clear();
    shared.sessions.write().await.clear();
    *shared.download_watch.lock().await = None;
}

/// Route one frame to its destination.
async fn dispatch(shared: &Shared, line: &str) {
    let json: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("discarding unparseable frame from runner: {}", e);
            return;
        }
    };

    match classify_message(&json) {
        MessageKind::Response => {
            let Some(id) = json.get("id").and_then(|v| v.as_u64()) else {
                return;
            };
            let response: JsonRpcResponse = match serde_json::from_value(json) {
                Ok(r) => r,
                Err(e) => {
                    warn!("malformed response frame: {}", e);
                    return;
                }
            };
            if let Some(tx) = shared.pending.lock().await.remove(&id) {
                let _ = tx.send(response);
            } else {
                debug!("response for unknown request id {}", id);
            }
        }
        MessageKind::Notification => {
            let notification: JsonRpcNotification = match serde_json::from_value(json) {
                Ok(n) => n,
                Err(e) => {
                    warn!("malformed notification frame: {}", e);
                    return;
                }
            };
            let params = notification.params.unwrap_or(serde_json::Value::Null);
            match notification.method.as_str() {
                "session.event" => {
                    let parsed: SessionEventParams = match serde_json::from_value(params) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("malformed session.event: {}", e);
                            return;
                        }
                    };
                    let sessions = shared.sessions.read().await;
                    if let Some(tx) = sessions.get(&parsed.session_id) {
                        let _ = tx.send(parsed.event);
                    } else {
                        trace!("event for unregistered session '{}'", parsed.session_id);
                    }
                }
                "model.download_progress" => {
                    let parsed: DownloadProgressParams = match serde_json::from_value(params) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("malformed download progress: {}", e);
                            return;
                        }
                    };
                    if let Some(tx) = shared.download_watch.lock().await.as_ref() {
                        let _ = tx.send(parsed.percent.min(100));
                    }
                }
                other => trace!("unhandled notification '{}'", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_shared() -> Shared {
        Shared {
            pending: Mutex::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            download_watch: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn response_frames_resolve_pending_requests() {
        let shared = empty_shared();
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().await.insert(7, tx);

        dispatch(&shared, r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#).await;

        let response = rx.await.unwrap();
        assert_eq!(response.id, Some(7));
        assert_eq!(response.result.unwrap()["ok"], true);
        assert!(shared.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn session_events_route_by_session_id() {
        let shared = empty_shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        shared
            .sessions
            .write()
            .await
            .insert("sess-1".to_string(), tx);

        dispatch(
            &shared,
            r#"{"jsonrpc":"2.0","method":"session.event","params":{"sessionId":"sess-1","event":{"type":"output.delta","content":"Hi"}}}"#,
        )
        .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event["type"], "output.delta");
        assert_eq!(event["content"], "Hi");
    }

    #[tokio::test]
    async fn events_for_unknown_sessions_are_dropped() {
        let shared = empty_shared();
        // Must not panic or block.
        dispatch(
            &shared,
            r#"{"jsonrpc":"2.0","method":"session.event","params":{"sessionId":"ghost","event":{"type":"session.idle"}}}"#,
        )
        .await;
    }

    #[tokio::test]
    async fn download_progress_reaches_the_watcher() {
        let shared = empty_shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        *shared.download_watch.lock().await = Some(tx);

        dispatch(
            &shared,
            r#"{"jsonrpc":"2.0","method":"model.download_progress","params":{"percent":42}}"#,
        )
        .await;

        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn download_progress_is_clamped_to_100() {
        let shared = empty_shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        *shared.download_watch.lock().await = Some(tx);

        dispatch(
            &shared,
            r#"{"jsonrpc":"2.0","method":"model.download_progress","params":{"percent":250}}"#,
        )
        .await;

        assert_eq!(rx.recv().await, Some(100));
    }

    #[tokio::test]
    async fn unparseable_frames_are_discarded() {
        let shared = empty_shared();
        dispatch(&shared, "this is not json").await;
    }
}
