//! In-memory chat-state store.

use std::collections::HashMap;
use tandem_domain::{ChatId, Message};

/// Visible message lists keyed by conversation identity.
///
/// Because a [`ChatId`] embeds the transport mode, local and remote
/// histories can never be conflated here.
#[derive(Default)]
pub struct ChatStore {
    chats: HashMap<ChatId, Vec<Message>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The visible message list for a conversation; empty if unknown.
    pub fn visible(&self, id: &ChatId) -> &[Message] {
        self.chats.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append a message to a conversation.
    pub fn push(&mut self, id: &ChatId, message: Message) {
        self.chats.entry(id.clone()).or_default().push(message);
    }

    /// Replace a conversation's visible list wholesale (used when a mode
    /// switch re-injects the captured history under a new identity).
    pub fn replace(&mut self, id: &ChatId, messages: Vec<Message>) {
        self.chats.insert(id.clone(), messages);
    }
}
