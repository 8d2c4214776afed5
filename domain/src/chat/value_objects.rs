//! Conversation identity and transport mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which concrete transport a conversation runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// On-device generative session hosted by the local model runner.
    Local,
    /// Conventional remote HTTP streaming endpoint.
    Remote,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Local => write!(f, "local"),
            TransportMode::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(TransportMode::Local),
            "remote" => Ok(TransportMode::Remote),
            other => Err(format!("unknown transport mode: {other}")),
        }
    }
}

/// Identity of one conversation in the chat-state store.
///
/// Each transport mode gets its own id (`{prefix}-{mode}`), so local and
/// remote histories never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The per-mode identity for a conversation prefix.
    pub fn for_mode(prefix: &str, mode: TransportMode) -> Self {
        Self(format!("{prefix}-{mode}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
