//! Chat transport port
//!
//! Defines the capability any transport, on-device or remote, exposes to
//! the conversation layer: send a conversation, get back one ordered stream
//! of [`Chunk`]s.

use async_trait::async_trait;
use tandem_domain::{ChatId, Chunk, Message, TransportMode};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Failure taxonomy of a transport.
///
/// Everything except `Aborted` that happens after the stream has been
/// handed out is delivered as a single `error` chunk through the normal
/// protocol rather than raised; these variants surface only for failures
/// before a stream exists (preconditions, connection setup) and when a
/// consumer converts an `error` chunk back into a typed error.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("on-device runtime is not supported in this environment")]
    Unsupported,

    #[error("on-device runtime is unavailable")]
    Unavailable,

    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("turn aborted")]
    Aborted,
}

/// Handle for receiving the chunk stream of one turn.
///
/// Dropping the handle mid-turn detaches the consumer: the producer treats
/// further deliveries as best-effort and stops generating promptly.
#[derive(Debug)]
pub struct ChunkStream {
    receiver: mpsc::Receiver<Chunk>,
}

impl ChunkStream {
    pub fn new(receiver: mpsc::Receiver<Chunk>) -> Self {
        Self { receiver }
    }

    /// Receive the next chunk; `None` once the turn's stream is closed.
    pub async fn recv(&mut self) -> Option<Chunk> {
        self.receiver.recv().await
    }

    /// Drain the stream and collect the assistant text.
    ///
    /// Returns the accumulated deltas on `finish` or on a silently closed
    /// stream (cancellation); an `error` chunk becomes
    /// [`TransportError::Generation`].
    pub async fn collect_text(mut self) -> Result<String, TransportError> {
        let mut text = String::new();
        while let Some(chunk) = self.receiver.recv().await {
            match chunk {
                Chunk::TextDelta { delta, .. } => text.push_str(&delta),
                Chunk::Finish { .. } => return Ok(text),
                Chunk::Error { message } => return Err(TransportError::Generation(message)),
                Chunk::TextStart { .. } | Chunk::TextEnd { .. } => {}
            }
        }
        // Closed without finish: a cancelled turn. Return what was streamed.
        Ok(text)
    }
}

/// A transport bound to exactly one conversation identity.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// The conversation identity this transport is bound to.
    fn chat_id(&self) -> &ChatId;

    /// Which mode this transport implements.
    fn mode(&self) -> TransportMode;

    /// Run one turn: the newest message is the prompt, earlier messages are
    /// context. Chunks for the turn arrive on the returned stream; `cancel`
    /// aborts the turn without destroying the transport.
    async fn send_messages(
        &self,
        conversation: &[Message],
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TransportError>;

    /// Re-attach to a detached stream for `chat_id`, if the transport
    /// supports it. On-device sessions do not; the local transport always
    /// returns `None`.
    async fn reconnect_to_stream(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<ChunkStream>, TransportError>;

    /// Tear down the transport: session destroyed or connection released.
    /// Idempotent.
    async fn destroy(&self);
}

/// Builds the concrete transport for a mode.
///
/// Lets the selector construct and replace transports without depending on
/// the infrastructure layer.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        mode: TransportMode,
        chat_id: ChatId,
    ) -> Result<Box<dyn ChatTransport>, TransportError>;
}
