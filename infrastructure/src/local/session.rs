//! Session lifecycle and the processed-message counter.
//!
//! Session creation is expensive (it can trigger a multi-gigabyte model
//! download) and the session carries every prior turn, so it is created
//! lazily exactly once and never silently recreated mid-conversation.

use std::sync::Arc;
use tandem_application::ports::generative::{
    DownloadProgress, GenerativeRuntime, GenerativeSession, RuntimeError, SessionOptions,
    TokenStream,
};
use tandem_domain::{Availability, Message, Role};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Owns one on-device session and the count of conversation messages
/// already folded into its context.
///
/// `processed` only increases. Every increment corresponds to a message
/// the session has incorporated: by creation-time system priming, by an
/// explicit append, or by being the prompt of a completed turn.
pub struct SessionManager {
    runtime: Arc<dyn GenerativeRuntime>,
    options: SessionOptions,
    on_download: Option<DownloadProgress>,
    lifetime: CancellationToken,
    session: Option<Box<dyn GenerativeSession>>,
    processed: usize,
    destroyed: bool,
}

impl SessionManager {
    pub fn new(
        runtime: Arc<dyn GenerativeRuntime>,
        options: SessionOptions,
        on_download: Option<DownloadProgress>,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            options,
            on_download,
            lifetime,
            session: None,
            processed: 0,
            destroyed: false,
        }
    }

    /// Create the session if none exists yet; otherwise a no-op.
    ///
    /// System instructions are taken from the configured options plus the
    /// conversation's leading system messages. That whole leading prefix is
    /// consumed by creation-time priming, so `processed` starts past it and
    /// the synchronizer never re-sends it.
    pub async fn ensure_session(&mut self, conversation: &[Message]) -> Result<(), RuntimeError> {
        if self.destroyed {
            return Err(RuntimeError::SessionCreation(
                "session manager already destroyed".to_string(),
            ));
        }
        if self.session.is_some() {
            return Ok(());
        }

        match self
            .runtime
            .check_availability(&self.options.profile)
            .await
        {
            Availability::Unavailable => {
                return Err(RuntimeError::SessionCreation(
                    "on-device runtime unavailable".to_string(),
                ));
            }
            status => debug!(?status, "creating on-device session"),
        }

        let mut options = self.options.clone();
        let mut system_text = options.system_prompt.clone().unwrap_or_default();
        let mut primed = 0;
        for message in conversation {
            if message.role != Role::System {
                break;
            }
            if message.has_text() {
                if !system_text.is_empty() {
                    system_text.push('\n');
                }
                system_text.push_str(message.text().trim());
            }
            primed += 1;
        }
        if !system_text.is_empty() {
            options.system_prompt = Some(system_text);
        }

        let session = self
            .runtime
            .create_session(&options, self.on_download.clone())
            .await?;
        self.session = Some(session);
        self.processed = primed;
        info!(primed, "session ready");
        Ok(())
    }

    /// How many leading conversation messages the session has incorporated.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Raise the processed count. The counter is monotone; a lower value is
    /// ignored.
    pub fn advance_processed(&mut self, to: usize) {
        debug_assert!(to >= self.processed, "processed count must be monotone");
        if to > self.processed {
            self.processed = to;
        }
    }

    /// Fold one message into the session context and count it.
    pub async fn append(&mut self, message: &Message) -> Result<(), RuntimeError> {
        let Some(session) = self.session.as_ref() else {
            return Err(RuntimeError::Transport("no live session".to_string()));
        };
        session.append(message).await?;
        self.processed += 1;
        Ok(())
    }

    /// Issue a streaming prompt against the live session.
    pub async fn prompt(&self, text: &str) -> Result<TokenStream, RuntimeError> {
        let Some(session) = self.session.as_ref() else {
            return Err(RuntimeError::Transport("no live session".to_string()));
        };
        session.prompt(text).await
    }

    /// Best-effort abort of the in-flight generation; the session survives.
    pub async fn cancel_turn(&self) {
        if let Some(session) = self.session.as_ref() {
            session.cancel_turn().await;
        }
    }

    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    /// Release the session and abort its governing token. Idempotent; safe
    /// on a never-created session.
    pub async fn destroy(&mut self) {
        self.lifetime.cancel();
        if let Some(session) = self.session.take() {
            session.destroy().await;
        }
        self.destroyed = true;
    }
}
