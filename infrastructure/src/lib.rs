//! Infrastructure layer for tandem
//!
//! Adapters behind the application ports: the JSON-RPC binding to the
//! on-device model runner, the local and remote chat transports, the
//! transport factory, configuration loading, and the JSONL transcript
//! writer.

pub mod config;
pub mod factory;
pub mod local;
pub mod logging;
pub mod native;
pub mod remote;

// Re-export main entry points
pub use config::{ConfigLoader, FileConfig};
pub use factory::ConfiguredTransportFactory;
pub use local::transport::LocalChatTransport;
pub use logging::jsonl::JsonlTranscript;
pub use native::runtime::NativeRuntime;
pub use remote::transport::RemoteChatTransport;
