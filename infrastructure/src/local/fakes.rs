//! Scripted fake runtime for transport tests.
//!
//! Serves a queue of [`FakeTurn`]s (tokens plus how the turn ends) and
//! records every interaction so tests can assert on append/prompt/cancel
//! counts and on backpressure behaviour.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tandem_application::ports::generative::{
    DownloadProgress, GenerativeRuntime, GenerativeSession, RuntimeError, RuntimeProbe,
    SessionOptions, TokenEvent, TokenStream,
};
use tandem_domain::{Availability, CapabilityProfile, Message, Role};
use tokio::sync::mpsc;

/// How a scripted turn ends.
#[derive(Debug, Clone)]
pub enum FakeEnd {
    /// Natural completion.
    Done,
    /// Runtime failure mid-generation.
    Error(String),
    /// Never completes; the turn must be aborted from outside.
    Stall,
}

/// One scripted prompt/response turn.
#[derive(Debug, Clone)]
pub struct FakeTurn {
    pub tokens: Vec<String>,
    pub end: FakeEnd,
}

impl FakeTurn {
    pub fn done(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            end: FakeEnd::Done,
        }
    }

    pub fn error(tokens: &[&str], message: &str) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            end: FakeEnd::Error(message.to_string()),
        }
    }

    pub fn stall(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            end: FakeEnd::Stall,
        }
    }
}

/// Everything the fake observed.
#[derive(Debug, Default, Clone)]
pub struct FakeLog {
    pub creates: usize,
    pub create_system_prompts: Vec<Option<String>>,
    pub appends: Vec<(Role, String)>,
    pub prompts: Vec<String>,
    pub cancels: usize,
    pub destroys: usize,
    /// Tokens actually handed to a consumer (backpressure-sensitive).
    pub sent_tokens: usize,
}

struct FakeInner {
    supported: AtomicBool,
    availability: Mutex<Availability>,
    fail_create: AtomicBool,
    fail_append: AtomicBool,
    fail_prompt: AtomicBool,
    turns: Mutex<VecDeque<FakeTurn>>,
    log: Mutex<FakeLog>,
}

pub struct FakeRuntime {
    inner: Arc<FakeInner>,
}

impl FakeRuntime {
    pub fn with_turns(turns: Vec<FakeTurn>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(FakeInner {
                supported: AtomicBool::new(true),
                availability: Mutex::new(Availability::Available),
                fail_create: AtomicBool::new(false),
                fail_append: AtomicBool::new(false),
                fail_prompt: AtomicBool::new(false),
                turns: Mutex::new(turns.into()),
                log: Mutex::new(FakeLog::default()),
            }),
        })
    }

    pub fn set_availability(&self, availability: Availability) {
        *self.inner.availability.lock().unwrap() = availability;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.inner.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_append(&self, fail: bool) {
        self.inner.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_prompt(&self, fail: bool) {
        self.inner.fail_prompt.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> FakeLog {
        self.inner.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuntimeProbe for FakeRuntime {
    fn is_supported(&self) -> bool {
        self.inner.supported.load(Ordering::SeqCst)
    }

    async fn check_availability(&self, _profile: &CapabilityProfile) -> Availability {
        *self.inner.availability.lock().unwrap()
    }
}

#[async_trait]
impl GenerativeRuntime for FakeRuntime {
    async fn create_session(
        &self,
        options: &SessionOptions,
        on_download: Option<DownloadProgress>,
    ) -> Result<Box<dyn GenerativeSession>, RuntimeError> {
        if self.inner.fail_create.load(Ordering::SeqCst) {
            return Err(RuntimeError::SessionCreation(
                "fake refused to create a session".to_string(),
            ));
        }
        {
            let mut log = self.inner.log.lock().unwrap();
            log.creates += 1;
            log.create_system_prompts
                .push(options.system_prompt.clone());
        }
        if let Some(callback) = on_download {
            callback(50);
            callback(100);
        }
        Ok(Box::new(FakeSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeSession {
    inner: Arc<FakeInner>,
}

#[async_trait]
impl GenerativeSession for FakeSession {
    async fn append(&self, message: &Message) -> Result<(), RuntimeError> {
        if self.inner.fail_append.load(Ordering::SeqCst) {
            return Err(RuntimeError::Transport("fake append failure".to_string()));
        }
        self.inner
            .log
            .lock()
            .unwrap()
            .appends
            .push((message.role, message.text()));
        Ok(())
    }

    async fn prompt(&self, text: &str) -> Result<TokenStream, RuntimeError> {
        if self.inner.fail_prompt.load(Ordering::SeqCst) {
            return Err(RuntimeError::Generation("fake prompt failure".to_string()));
        }
        self.inner.log.lock().unwrap().prompts.push(text.to_string());

        let turn = self
            .inner
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeTurn::done(&[]));

        // Capacity 1 so a detached consumer stops the feed almost
        // immediately, like a real token source under backpressure.
        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            for token in turn.tokens {
                if tx.send(TokenEvent::Token(token)).await.is_err() {
                    return;
                }
                inner.log.lock().unwrap().sent_tokens += 1;
            }
            match turn.end {
                FakeEnd::Done => {
                    let _ = tx.send(TokenEvent::Done).await;
                }
                FakeEnd::Error(message) => {
                    let _ = tx.send(TokenEvent::Error(message)).await;
                }
                FakeEnd::Stall => {
                    // Hold the channel open until the consumer goes away.
                    tx.closed().await;
                }
            }
        });
        Ok(TokenStream::new(rx))
    }

    async fn cancel_turn(&self) {
        self.inner.log.lock().unwrap().cancels += 1;
    }

    async fn destroy(&self) {
        self.inner.log.lock().unwrap().destroys += 1;
    }
}
