//! Ports: interfaces between the application layer and the outside world.

pub mod chat_transport;
pub mod conversation_logger;
pub mod generative;
