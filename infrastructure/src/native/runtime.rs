//! [`NativeRuntime`]: the capability traits implemented over the runner.
//!
//! The probe half never creates sessions and never triggers a download;
//! the runtime half creates [`NativeSession`]s and forwards download
//! progress to the caller's callback while creation is in flight.

use crate::native::error::{NativeError, Result as NativeResult};
use crate::native::protocol::{
    AppendParams, AvailabilityParams, AvailabilityResult, CreateSessionParams,
    CreateSessionResult, PromptParams, SessionRefParams, event_content, event_error_message,
};
use crate::native::router::{SessionEvents, StdioRouter};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tandem_application::ports::generative::{
    DownloadProgress, GenerativeRuntime, GenerativeSession, RuntimeError, RuntimeProbe,
    SessionOptions, TokenEvent, TokenStream,
};
use tandem_domain::{Availability, CapabilityProfile, Message};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};

/// Buffered native output units per turn before the pump applies
/// backpressure to the runner channel.
const TOKEN_BUFFER: usize = 32;

/// Lazily-spawned binding to the model runner.
///
/// The subprocess is shared by every session created through this runtime
/// and is only spawned on first use; `is_supported` stays a pure
/// environment check.
pub struct NativeRuntime {
    command: String,
    args: Vec<String>,
    router: Mutex<Option<Arc<StdioRouter>>>,
}

impl NativeRuntime {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            router: Mutex::new(None),
        }
    }

    /// The shared router, spawning the runner on first use.
    async fn router(&self) -> NativeResult<Arc<StdioRouter>> {
        let mut slot = self.router.lock().await;
        if let Some(router) = slot.as_ref() {
            return Ok(Arc::clone(router));
        }
        let router = StdioRouter::spawn(&self.command, &self.args).await?;
        *slot = Some(Arc::clone(&router));
        Ok(router)
    }

    /// Kill the runner process (end of program).
    pub async fn shutdown(&self) {
        if let Some(router) = self.router.lock().await.take() {
            router.shutdown().await;
        }
    }

    async fn availability_request(&self, params: AvailabilityParams) -> NativeResult<Availability> {
        let router = self.router().await?;
        let response = router
            .request("runtime.availability", Some(serde_json::to_value(&params)?))
            .await?;
        if let Some(error) = response.error {
            return Err(NativeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = response
            .result
            .ok_or_else(|| NativeError::UnexpectedResponse("availability result missing".into()))?;
        let parsed: AvailabilityResult = serde_json::from_value(result)?;
        Ok(parsed.status)
    }
}

#[async_trait]
impl RuntimeProbe for NativeRuntime {
    fn is_supported(&self) -> bool {
        which::which(&self.command).is_ok()
    }

    async fn check_availability(&self, profile: &CapabilityProfile) -> Availability {
        if !self.is_supported() {
            return Availability::Unavailable;
        }
        let params = AvailabilityParams {
            expected_inputs: profile.expected_inputs.clone(),
            expected_outputs: profile.expected_outputs.clone(),
        };
        // An inability to determine availability is unavailability.
        match self.availability_request(params).await {
            Ok(status) => status,
            Err(e) => {
                warn!("availability probe failed: {}", e);
                Availability::Unavailable
            }
        }
    }
}

#[async_trait]
impl GenerativeRuntime for NativeRuntime {
    async fn create_session(
        &self,
        options: &SessionOptions,
        on_download: Option<DownloadProgress>,
    ) -> Result<Box<dyn GenerativeSession>, RuntimeError> {
        let router = self
            .router()
            .await
            .map_err(|e| RuntimeError::SessionCreation(e.to_string()))?;

        // Forward download progress while creation is in flight.
        let forwarder = match on_download {
            Some(callback) => {
                let mut progress = router.watch_downloads().await;
                Some(tokio::spawn(async move {
                    while let Some(percent) = progress.recv().await {
                        callback(percent);
                    }
                }))
            }
            None => None,
        };

        let params = CreateSessionParams {
            system_prompt: options.system_prompt.clone(),
            temperature: options.temperature,
            top_k: options.top_k,
            expected_inputs: options.profile.expected_inputs.clone(),
            expected_outputs: options.profile.expected_outputs.clone(),
        };
        let encoded = serde_json::to_value(&params)
            .map_err(|e| RuntimeError::SessionCreation(e.to_string()))?;

        // No timeout: a first-use download can take minutes.
        let response = router
            .request_with_timeout("session.create", Some(encoded), None)
            .await;

        router.clear_download_watch().await;
        if let Some(task) = forwarder {
            task.abort();
        }

        let response = response.map_err(|e| RuntimeError::SessionCreation(e.to_string()))?;
        if let Some(error) = response.error {
            return Err(RuntimeError::SessionCreation(error.message));
        }
        let result = response
            .result
            .ok_or_else(|| RuntimeError::SessionCreation("missing session.create result".into()))?;
        let created: CreateSessionResult =
            serde_json::from_value(result).map_err(|e| RuntimeError::SessionCreation(e.to_string()))?;

        let events = router.register_session(&created.session_id).await;
        info!(session = %created.session_id, "on-device session created");

        Ok(Box::new(NativeSession {
            router,
            session_id: created.session_id,
            events: Arc::new(Mutex::new(events)),
        }))
    }
}

/// One live runner-hosted session.
pub struct NativeSession {
    router: Arc<StdioRouter>,
    session_id: String,
    events: Arc<Mutex<SessionEvents>>,
}

impl NativeSession {
    /// Send a request that only acknowledges (empty result).
    async fn ack<P: Serialize + Sync>(&self, method: &str, params: &P) -> NativeResult<()> {
        let value = serde_json::to_value(params)?;
        let response = self.router.request(method, Some(value)).await?;
        if let Some(error) = response.error {
            return Err(NativeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(())
    }

    fn session_ref(&self) -> SessionRefParams {
        SessionRefParams {
            session_id: self.session_id.clone(),
        }
    }
}

#[async_trait]
impl GenerativeSession for NativeSession {
    async fn append(&self, message: &Message) -> Result<(), RuntimeError> {
        let params = AppendParams {
            session_id: self.session_id.clone(),
            role: message.role,
            content: message.text(),
        };
        self.ack("session.append", &params)
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))
    }

    async fn prompt(&self, text: &str) -> Result<TokenStream, RuntimeError> {
        // A turn aborted between prompt and streaming can leave its events
        // behind; they must not be read as output of this turn.
        {
            let mut events = self.events.lock().await;
            let mut stale = 0;
            while events.try_recv().is_some() {
                stale += 1;
            }
            if stale > 0 {
                debug!(stale, "discarded events from an aborted turn");
            }
        }

        let params = PromptParams {
            session_id: self.session_id.clone(),
            content: text.to_string(),
        };
        self.ack("session.prompt", &params)
            .await
            .map_err(|e| RuntimeError::Generation(e.to_string()))?;

        let events = Arc::clone(&self.events);
        let (tx, rx) = mpsc::channel(TOKEN_BUFFER);
        tokio::spawn(async move {
            // Exclusive for the turn; one turn runs at a time by contract.
            let mut events = events.lock().await;
            loop {
                let event = tokio::select! {
                    // Consumer gone: stop pumping and release the channel.
                    _ = tx.closed() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else {
                    let _ = tx
                        .send(TokenEvent::Error("model runner disconnected".to_string()))
                        .await;
                    break;
                };
                let kind = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
                match kind {
                    "output.delta" => {
                        if let Some(content) = event_content(&event)
                            && !content.is_empty()
                            && tx.send(TokenEvent::Token(content.to_string())).await.is_err()
                        {
                            break;
                        }
                    }
                    "session.idle" => {
                        let _ = tx.send(TokenEvent::Done).await;
                        break;
                    }
                    "session.error" => {
                        let _ = tx.send(TokenEvent::Error(event_error_message(&event))).await;
                        break;
                    }
                    other => trace!("unhandled session event '{}'", other),
                }
            }
        });

        Ok(TokenStream::new(rx))
    }

    async fn cancel_turn(&self) {
        if let Err(e) = self.ack("session.cancel", &self.session_ref()).await {
            debug!("session.cancel failed: {}", e);
        }
    }

    async fn destroy(&self) {
        self.router.deregister_session(&self.session_id).await;
        if let Err(e) = self.ack("session.destroy", &self.session_ref()).await {
            debug!("session.destroy failed: {}", e);
        }
    }
}
