//! The remote chat transport: a conventional HTTP streaming client whose
//! response body already speaks the chunk protocol.

pub mod transport;
