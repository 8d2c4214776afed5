//! Domain layer for tandem
//!
//! This crate contains the entities and value objects shared by every
//! transport: chat messages, the uniform streaming chunk protocol, and the
//! capability vocabulary of the on-device generative runtime. It has no
//! dependencies on IO, async runtimes, or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Chunk protocol
//!
//! Every transport (the on-device session and the remote HTTP endpoint)
//! delivers model output as the same ordered stream of [`Chunk`]s:
//! `text-start`, `text-delta`..., `text-end`, `finish` (or `error`). The
//! consumer never needs to know which transport produced a turn.
//!
//! ## Conversation identity
//!
//! Each transport mode owns its own [`ChatId`], so local and remote
//! histories are never conflated by the chat-state store.

pub mod chat;
pub mod runtime;

// Re-export commonly used types
pub use chat::chunk::Chunk;
pub use chat::entities::{ContentPart, Message, Role};
pub use chat::value_objects::{ChatId, TransportMode};
pub use runtime::{Availability, CapabilityProfile, Modality};
