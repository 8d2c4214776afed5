//! On-device generative runtime port
//!
//! Narrow capability interface over the feature-detected native runtime:
//! a probe that never creates sessions, a runtime that creates them, and
//! the session itself. All call sites depend on these traits, never on the
//! raw runner binding.

use async_trait::async_trait;
use std::sync::Arc;
use tandem_domain::{Availability, CapabilityProfile, Message};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by the runtime binding.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("runtime transport failed: {0}")]
    Transport(String),

    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

/// Options supplied once at session creation and never re-sent.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// System instructions priming the session.
    pub system_prompt: Option<String>,
    /// Sampling temperature; runtime default when `None`.
    pub temperature: Option<f32>,
    /// Top-K sampling cutoff; runtime default when `None`.
    pub top_k: Option<u32>,
    /// Declared input/output modalities.
    pub profile: CapabilityProfile,
}

/// Callback invoked with 0–100 while the model downloads.
pub type DownloadProgress = Arc<dyn Fn(u8) + Send + Sync>;

/// One unit of native incremental output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// An incremental text unit from the model.
    Token(String),
    /// Natural end of the turn's output.
    Done,
    /// The runtime failed mid-generation.
    Error(String),
}

/// Receiver half of one turn's native output.
pub struct TokenStream {
    receiver: mpsc::Receiver<TokenEvent>,
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<TokenEvent>) -> Self {
        Self { receiver }
    }

    /// Next native output unit; `None` when the producer is gone.
    pub async fn recv(&mut self) -> Option<TokenEvent> {
        self.receiver.recv().await
    }
}

/// Static capability check. Must be safely callable before any session
/// exists and must never itself trigger a model download.
#[async_trait]
pub trait RuntimeProbe: Send + Sync {
    /// Pure environment introspection: does a runtime exist at all?
    fn is_supported(&self) -> bool;

    /// Availability for a profile. A probe failure is reported as
    /// [`Availability::Unavailable`], never propagated.
    async fn check_availability(&self, profile: &CapabilityProfile) -> Availability;
}

/// Creates on-device sessions.
#[async_trait]
pub trait GenerativeRuntime: RuntimeProbe {
    /// Create a session with the given options. `on_download` is invoked
    /// with 0–100 if the model has to be fetched first.
    async fn create_session(
        &self,
        options: &SessionOptions,
        on_download: Option<DownloadProgress>,
    ) -> Result<Box<dyn GenerativeSession>, RuntimeError>;
}

/// A live on-device conversation session. Retains every appended message
/// and every emitted reply in its internal context.
#[async_trait]
pub trait GenerativeSession: Send + Sync {
    /// Fold one prior conversation message into the session context
    /// without prompting a reply.
    async fn append(&self, message: &Message) -> Result<(), RuntimeError>;

    /// Issue a prompt; incremental output arrives on the returned stream.
    async fn prompt(&self, text: &str) -> Result<TokenStream, RuntimeError>;

    /// Best-effort abort of an in-flight generation. Leaves the session
    /// alive; the prompt and any emitted output stay in context.
    async fn cancel_turn(&self);

    /// Idempotent teardown.
    async fn destroy(&self);
}
