//! Application layer for tandem
//!
//! Ports (traits) through which the conversation-facing use case talks to
//! concrete transports and to the on-device generative runtime, plus the
//! [`HybridChat`] selector that owns the local/remote decision.
//!
//! Implementations of the ports live in the infrastructure layer and are
//! injected by the binary.

pub mod hybrid;
pub mod ports;

// Re-export commonly used types
pub use hybrid::selector::{ChatStatus, HybridChat, TurnOutcome};
pub use hybrid::store::ChatStore;
pub use ports::chat_transport::{ChatTransport, ChunkStream, TransportError, TransportFactory};
pub use ports::conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger};
pub use ports::generative::{
    DownloadProgress, GenerativeRuntime, GenerativeSession, RuntimeError, RuntimeProbe,
    SessionOptions, TokenEvent, TokenStream,
};
