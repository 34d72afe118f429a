//! Shared types for the Arbor trust layer.
//!
//! Everything that crosses a crate or wire boundary lives here: peer
//! identifiers, the handshake and A2A message envelopes, and the closed
//! protocol enums. This crate performs no I/O and holds no state.

#![deny(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod envelope;
pub mod handshake;
pub mod serde_hex;

pub use envelope::{
    A2aRequest, A2aResponse, AttestationData, PaymentDecision, PaymentStatus, PriceQuote,
    RequestType, ResponseStatus,
};
pub use handshake::{
    Challenge, ChallengeResponse, SessionAck, PROTOCOL_A2A, PROTOCOL_HANDSHAKE,
    PROTOCOL_HANDSHAKE_SIGNED,
};

/// Decentralized identifier naming a peer agent.
///
/// DIDs are self-certifying strings; Arbor treats them as opaque keys and
/// never parses their method-specific part.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerDid(pub String);

impl PeerDid {
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerDid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Why a session was invalidated.
///
/// Closed set: adding a variant is a deliberate protocol decision, not a
/// string convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    Logout,
    ReputationDrop,
    RepeatedFailures,
    ManualRevoke,
    SecurityEvent,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidationReason::Logout => "logout",
            InvalidationReason::ReputationDrop => "reputation_drop",
            InvalidationReason::RepeatedFailures => "repeated_failures",
            InvalidationReason::ManualRevoke => "manual_revoke",
            InvalidationReason::SecurityEvent => "security_event",
        };
        f.write_str(s)
    }
}
