//! Capability vocabulary of the on-device generative runtime.
//!
//! These value objects describe what a runtime can do without touching it:
//! the modalities a session is expected to handle and the three-way
//! availability answer of the capability probe. Creating sessions and
//! streaming output are port concerns, not domain concerns.

use serde::{Deserialize, Serialize};

/// An input or output modality a session may be asked to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

/// Expected input/output modalities of a session, declared up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProfile {
    pub expected_inputs: Vec<Modality>,
    pub expected_outputs: Vec<Modality>,
}

impl CapabilityProfile {
    /// Text in, text out: the profile of the chat transport.
    pub fn text_only() -> Self {
        Self {
            expected_inputs: vec![Modality::Text],
            expected_outputs: vec![Modality::Text],
        }
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::text_only()
    }
}

/// Answer of the capability probe for a given profile.
///
/// `Unavailable` is also the answer when the probe itself fails: an
/// inability to determine availability is treated as unavailability, never
/// as a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Ready to use right now.
    Available,
    /// Usable after a model download.
    Downloadable,
    /// Not usable; hides or disables the local mode.
    Unavailable,
}

impl Availability {
    /// True when a session could be created (possibly after a download).
    pub fn is_usable(&self) -> bool {
        !matches!(self, Availability::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_profile_serializes_camel_case() {
        let json = serde_json::to_value(CapabilityProfile::text_only()).unwrap();
        assert_eq!(json["expectedInputs"][0], "text");
        assert_eq!(json["expectedOutputs"][0], "text");
    }

    #[test]
    fn downloadable_is_usable() {
        assert!(Availability::Available.is_usable());
        assert!(Availability::Downloadable.is_usable());
        assert!(!Availability::Unavailable.is_usable());
    }

    #[test]
    fn availability_parses_from_wire_form() {
        let status: Availability = serde_json::from_str("\"downloadable\"").unwrap();
        assert_eq!(status, Availability::Downloadable);
    }
}
