//! Streaming protocol translator: drives one prompt/response turn against
//! the on-device session and converts its raw incremental output into the
//! uniform chunk protocol.
//!
//! Each turn is an explicit state machine
//! (`idle → synchronizing-context → prompting → streaming-output →
//! finished | cancelled | errored`) run by one spawned task that holds the
//! session state's owned lock for the whole turn; a second concurrent turn
//! is a caller error, rejected up front rather than queued.

use crate::local::session::SessionManager;
use crate::local::sync::sync_context;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tandem_application::ports::chat_transport::{ChatTransport, ChunkStream, TransportError};
use tandem_application::ports::generative::{
    DownloadProgress, GenerativeRuntime, RuntimeError, SessionOptions, TokenEvent,
};
use tandem_domain::{ChatId, Chunk, Message, Role, TransportMode};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Chunks buffered toward the consumer before the translator awaits.
const CHUNK_BUFFER: usize = 32;

/// Global counter for generated text-part ids.
static PART_ID: AtomicU64 = AtomicU64::new(1);

fn next_part_id() -> String {
    format!("txt-{}", PART_ID.fetch_add(1, Ordering::SeqCst))
}

/// Named states of the per-turn machine, for trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Idle,
    SynchronizingContext,
    Prompting,
    StreamingOutput,
    Finished,
    Cancelled,
    Errored,
}

/// Chat transport backed by one on-device session.
pub struct LocalChatTransport {
    chat_id: ChatId,
    lifetime: CancellationToken,
    state: Arc<Mutex<SessionManager>>,
}

impl LocalChatTransport {
    pub fn new(
        chat_id: ChatId,
        runtime: Arc<dyn GenerativeRuntime>,
        options: SessionOptions,
        on_download: Option<DownloadProgress>,
    ) -> Self {
        let lifetime = CancellationToken::new();
        let manager = SessionManager::new(runtime, options, on_download, lifetime.clone());
        Self {
            chat_id,
            lifetime,
            state: Arc::new(Mutex::new(manager)),
        }
    }
}

#[async_trait]
impl ChatTransport for LocalChatTransport {
    fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Local
    }

    async fn send_messages(
        &self,
        conversation: &[Message],
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TransportError> {
        // Fail fast before touching the session.
        let Some(newest) = conversation.last() else {
            return Err(TransportError::Precondition(
                "conversation is empty".to_string(),
            ));
        };
        if newest.role != Role::User {
            return Err(TransportError::Precondition(
                "newest message must have role user".to_string(),
            ));
        }
        let prompt = newest.text();
        if prompt.trim().is_empty() {
            return Err(TransportError::Precondition(
                "newest user message has no text".to_string(),
            ));
        }

        // One turn at a time; a concurrent turn is the caller's error.
        let guard = Arc::clone(&self.state).try_lock_owned().map_err(|_| {
            TransportError::Precondition("a turn is already in flight".to_string())
        })?;

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(run_turn(
            guard,
            conversation.to_vec(),
            prompt,
            cancel,
            self.lifetime.clone(),
            tx,
        ));
        Ok(ChunkStream::new(rx))
    }

    async fn reconnect_to_stream(
        &self,
        _chat_id: &ChatId,
    ) -> Result<Option<ChunkStream>, TransportError> {
        // On-device sessions cannot re-attach a detached stream.
        Ok(None)
    }

    async fn destroy(&self) {
        // Cancelling the lifetime aborts any in-flight turn, which then
        // releases the state lock.
        self.lifetime.cancel();
        let mut manager = self.state.lock().await;
        manager.destroy().await;
    }
}

/// One prompt/response turn. Every failure is caught here and re-emitted
/// as a single `error` chunk; nothing escapes as an unhandled error.
async fn run_turn(
    mut manager: OwnedMutexGuard<SessionManager>,
    conversation: Vec<Message>,
    prompt: String,
    cancel: CancellationToken,
    lifetime: CancellationToken,
    tx: mpsc::Sender<Chunk>,
) {
    let part_id = next_part_id();
    let phase = TurnPhase::Idle;
    trace!(?phase, part = %part_id, messages = conversation.len(), "turn starting");

    let phase = TurnPhase::SynchronizingContext;
    trace!(?phase, "folding unprocessed context");
    let synced = tokio::select! {
        _ = cancel.cancelled() => None,
        _ = lifetime.cancelled() => None,
        result = async {
            manager.ensure_session(&conversation).await?;
            sync_context(&mut manager, &conversation).await?;
            Ok::<(), RuntimeError>(())
        } => Some(result),
    };
    match synced {
        None => {
            let phase = TurnPhase::Cancelled;
            debug!(?phase, "turn aborted during context sync");
            return;
        }
        Some(Err(e)) => {
            let phase = TurnPhase::Errored;
            warn!(?phase, error = %e, "context sync failed");
            let _ = tx.send(Chunk::Error {
                message: e.to_string(),
            })
            .await;
            return;
        }
        Some(Ok(())) => {}
    }

    let phase = TurnPhase::Prompting;
    trace!(?phase, "issuing prompt");
    let prompted = tokio::select! {
        _ = cancel.cancelled() => None,
        _ = lifetime.cancelled() => None,
        result = manager.prompt(&prompt) => Some(result),
    };
    let mut tokens = match prompted {
        None => {
            // The prompt may already have reached the runner; stop any
            // generation it started.
            manager.cancel_turn().await;
            let phase = TurnPhase::Cancelled;
            debug!(?phase, "turn aborted before streaming began");
            return;
        }
        Some(Err(e)) => {
            let phase = TurnPhase::Errored;
            warn!(?phase, error = %e, "prompt failed");
            let _ = tx.send(Chunk::Error {
                message: e.to_string(),
            })
            .await;
            return;
        }
        Some(Ok(stream)) => stream,
    };

    // From here the prompt is part of the session context: any exit short
    // of completion still counts it, so the next turn neither re-sends nor
    // skips it.
    let phase = TurnPhase::StreamingOutput;
    trace!(?phase, "consuming native output");
    let mut started = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                manager.cancel_turn().await;
                if started {
                    let _ = tx.send(Chunk::TextEnd { id: part_id.clone() }).await;
                }
                manager.advance_processed(conversation.len());
                let phase = TurnPhase::Cancelled;
                debug!(?phase, "turn cancelled mid-stream");
                return;
            }
            _ = lifetime.cancelled() => {
                // Session teardown aborts the generation itself.
                if started {
                    let _ = tx.send(Chunk::TextEnd { id: part_id.clone() }).await;
                }
                manager.advance_processed(conversation.len());
                let phase = TurnPhase::Cancelled;
                debug!(?phase, "turn aborted by session teardown");
                return;
            }
            event = tokens.recv() => match event {
                Some(TokenEvent::Token(token)) => {
                    if !started {
                        started = true;
                        if tx.send(Chunk::TextStart { id: part_id.clone() }).await.is_err() {
                            detach(&mut manager, conversation.len()).await;
                            return;
                        }
                    }
                    if tx.send(Chunk::TextDelta { id: part_id.clone(), delta: token }).await.is_err() {
                        detach(&mut manager, conversation.len()).await;
                        return;
                    }
                }
                Some(TokenEvent::Done) => {
                    // The prompt and the reply are now implicit session
                    // context. Recorded before the terminal deliveries, so
                    // a closed sink cannot lose the completed turn.
                    manager.advance_processed(conversation.len() + 1);
                    if started {
                        let _ = tx.send(Chunk::TextEnd { id: part_id.clone() }).await;
                    }
                    let _ = tx.send(Chunk::Finish { id: part_id.clone() }).await;
                    let phase = TurnPhase::Finished;
                    debug!(?phase, processed = manager.processed(), "turn finished");
                    return;
                }
                Some(TokenEvent::Error(message)) => {
                    if started {
                        let _ = tx.send(Chunk::TextEnd { id: part_id.clone() }).await;
                    }
                    let _ = tx.send(Chunk::Error { message }).await;
                    let phase = TurnPhase::Errored;
                    warn!(?phase, "generation failed mid-stream");
                    return;
                }
                None => {
                    if started {
                        let _ = tx.send(Chunk::TextEnd { id: part_id.clone() }).await;
                    }
                    let _ = tx.send(Chunk::Error {
                        message: "native output ended unexpectedly".to_string(),
                    })
                    .await;
                    let phase = TurnPhase::Errored;
                    warn!(?phase, "native stream closed without a terminal event");
                    return;
                }
            }
        }
    }
}

/// The consumer closed the chunk sink: stop pulling tokens promptly and
/// abort the generation so no work is wasted. Not a generation failure.
async fn detach(manager: &mut OwnedMutexGuard<SessionManager>, conversation_len: usize) {
    manager.cancel_turn().await;
    manager.advance_processed(conversation_len);
    let phase = TurnPhase::Cancelled;
    debug!(?phase, "chunk sink closed; generation stopped");
}
