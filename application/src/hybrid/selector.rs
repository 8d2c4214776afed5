//! Hybrid transport selector.
//!
//! [`HybridChat`] exposes one logical conversation while owning two
//! possible concrete transports. It decides local vs remote (gated by the
//! capability probe), gives each mode its own conversation identity, and
//! preserves the visible message list byte-for-byte across a live switch.

use crate::ports::chat_transport::{ChatTransport, TransportError, TransportFactory};
use crate::ports::conversation_logger::{ConversationEvent, ConversationLogger};
use crate::ports::generative::RuntimeProbe;
use crate::hybrid::store::ChatStore;
use std::sync::Arc;
use tandem_domain::{Availability, CapabilityProfile, ChatId, Chunk, Message, TransportMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Conversation-level status. Transport switches are only allowed while
/// `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    /// No turn in flight.
    Ready,
    /// A turn has been submitted; no output yet.
    Submitted,
    /// Output chunks are arriving.
    Streaming,
}

/// What one turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Accumulated assistant text (possibly partial if cancelled).
    pub text: String,
    /// Error message delivered through the protocol, if the turn failed.
    pub error: Option<String>,
    /// True when the stream closed without `finish` or `error`.
    pub cancelled: bool,
}

/// The conversation-facing façade over the local and remote transports.
pub struct HybridChat {
    id_prefix: String,
    profile: CapabilityProfile,
    probe: Arc<dyn RuntimeProbe>,
    factory: Arc<dyn TransportFactory>,
    logger: Arc<dyn ConversationLogger>,
    transport: Box<dyn ChatTransport>,
    store: ChatStore,
    mode: TransportMode,
    status: ChatStatus,
}

impl HybridChat {
    /// Create the selector in `requested` mode. Local mode silently falls
    /// back to remote when the probe reports the runtime unsupported or
    /// unavailable.
    pub async fn new(
        id_prefix: impl Into<String>,
        requested: TransportMode,
        profile: CapabilityProfile,
        probe: Arc<dyn RuntimeProbe>,
        factory: Arc<dyn TransportFactory>,
        logger: Arc<dyn ConversationLogger>,
    ) -> Result<Self, TransportError> {
        let id_prefix = id_prefix.into();
        let mode = resolve_mode(probe.as_ref(), &profile, requested).await;
        let chat_id = ChatId::for_mode(&id_prefix, mode);
        let transport = factory.create(mode, chat_id).await?;

        Ok(Self {
            id_prefix,
            profile,
            probe,
            factory,
            logger,
            transport,
            store: ChatStore::new(),
            mode,
            status: ChatStatus::Ready,
        })
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn chat_id(&self) -> &ChatId {
        self.transport.chat_id()
    }

    /// The visible message list of the active conversation.
    pub fn visible(&self) -> &[Message] {
        self.store.visible(self.transport.chat_id())
    }

    /// Switch transports. Rejected while a turn is in flight; the visible
    /// conversation is identical before and after a successful switch.
    ///
    /// Returns the mode actually selected (a local request may resolve to
    /// remote through capability gating).
    pub async fn set_mode(&mut self, requested: TransportMode) -> Result<TransportMode, TransportError> {
        if self.status != ChatStatus::Ready {
            return Err(TransportError::Precondition(
                "cannot switch transports while a turn is in flight".to_string(),
            ));
        }

        let resolved = resolve_mode(self.probe.as_ref(), &self.profile, requested).await;
        if resolved == self.mode {
            return Ok(self.mode);
        }

        // Capture the visible history before the new transport exists.
        let captured = self.visible().to_vec();

        let chat_id = ChatId::for_mode(&self.id_prefix, resolved);
        let transport = self.factory.create(resolved, chat_id.clone()).await?;

        // The old transport is superseded: session torn down, connection
        // released.
        self.transport.destroy().await;

        self.logger.log(ConversationEvent::mode_switched(
            self.mode,
            resolved,
            captured.len(),
        ));
        info!(from = %self.mode, to = %resolved, "switching transport");

        self.store.replace(&chat_id, captured);
        self.transport = transport;
        self.mode = resolved;
        Ok(resolved)
    }

    /// Run one turn: append the user message, stream the reply, append the
    /// assistant message. `on_chunk` sees every chunk as it arrives.
    pub async fn ask_streaming(
        &mut self,
        text: &str,
        cancel: CancellationToken,
        mut on_chunk: impl FnMut(&Chunk),
    ) -> Result<TurnOutcome, TransportError> {
        if self.status != ChatStatus::Ready {
            return Err(TransportError::Precondition(
                "a turn is already in flight".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(TransportError::Precondition("empty prompt".to_string()));
        }

        let chat_id = self.transport.chat_id().clone();
        self.store.push(&chat_id, Message::user(text));
        let conversation = self.store.visible(&chat_id).to_vec();

        self.status = ChatStatus::Submitted;
        self.logger
            .log(ConversationEvent::turn_started(&chat_id, self.mode));

        let mut stream = match self.transport.send_messages(&conversation, cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                self.status = ChatStatus::Ready;
                self.logger
                    .log(ConversationEvent::turn_failed(&chat_id, self.mode, &e.to_string()));
                return Err(e);
            }
        };

        let mut reply = String::new();
        let mut error = None;
        let mut finished = false;

        while let Some(chunk) = stream.recv().await {
            if self.status == ChatStatus::Submitted {
                self.status = ChatStatus::Streaming;
            }
            on_chunk(&chunk);
            match &chunk {
                Chunk::TextDelta { delta, .. } => reply.push_str(delta),
                Chunk::Finish { .. } => finished = true,
                Chunk::Error { message } => error = Some(message.clone()),
                Chunk::TextStart { .. } | Chunk::TextEnd { .. } => {}
            }
            if chunk.is_terminal() {
                break;
            }
        }

        let cancelled = !finished && error.is_none();
        if !reply.is_empty() {
            self.store.push(&chat_id, Message::assistant(reply.clone()));
        }
        self.status = ChatStatus::Ready;

        let event = match &error {
            Some(message) => ConversationEvent::turn_failed(&chat_id, self.mode, message),
            None if cancelled => {
                ConversationEvent::turn_cancelled(&chat_id, self.mode, reply.len())
            }
            None => ConversationEvent::turn_completed(&chat_id, self.mode, reply.len()),
        };
        self.logger.log(event);
        debug!(chat = %chat_id, bytes = reply.len(), cancelled, "turn ended");

        Ok(TurnOutcome {
            text: reply,
            error,
            cancelled,
        })
    }

    /// Tear down the active transport (end of program).
    pub async fn shutdown(&mut self) {
        self.transport.destroy().await;
    }
}

/// Capability gating: a local request resolves to remote when the runtime
/// is unsupported or unavailable.
async fn resolve_mode(
    probe: &dyn RuntimeProbe,
    profile: &CapabilityProfile,
    requested: TransportMode,
) -> TransportMode {
    if requested == TransportMode::Remote {
        return TransportMode::Remote;
    }
    if !probe.is_supported() {
        info!("on-device runtime not supported here; falling back to remote");
        return TransportMode::Remote;
    }
    match probe.check_availability(profile).await {
        Availability::Unavailable => {
            info!("on-device runtime unavailable; falling back to remote");
            TransportMode::Remote
        }
        Availability::Available | Availability::Downloadable => TransportMode::Local,
    }
}
