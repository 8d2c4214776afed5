//! Binding to the on-device model runner.
//!
//! The runner is a subprocess speaking line-delimited JSON-RPC 2.0 over
//! stdio. [`router::StdioRouter`] owns the process and demultiplexes its
//! output; [`runtime::NativeRuntime`] implements the application-layer
//! capability traits on top of it.

pub mod error;
pub mod protocol;
pub mod router;
pub mod runtime;
