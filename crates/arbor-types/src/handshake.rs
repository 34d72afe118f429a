//! Handshake wire messages.
//!
//! The handshake is a unary exchange over one bidirectional stream:
//! challenge, challenge response, session ack. Every message is a single
//! newline-free JSON document; byte fields travel as hex strings.

use serde::{Deserialize, Serialize};

use crate::serde_hex;

/// Unsigned-challenge handshake (v1.0).
pub const PROTOCOL_HANDSHAKE: &str = "/arbor/handshake/1.0.0";
/// Signed-challenge handshake (v1.1).
pub const PROTOCOL_HANDSHAKE_SIGNED: &str = "/arbor/handshake/1.1.0";
/// Authenticated request/response exchange.
pub const PROTOCOL_A2A: &str = "/arbor/a2a/1.0.0";

/// Opening message of a handshake, sent by the initiator.
///
/// When `signature` is present it covers
/// `nonce || big_endian_u64(timestamp) || utf8(sender_did)` hashed with
/// SHA-256 (protocol v1.1). A challenge without a signature is v1.0.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    /// 32 random bytes binding this challenge to one handshake attempt.
    #[serde(with = "serde_hex")]
    pub nonce: Vec<u8>,
    /// Unix seconds at the initiator when the challenge was built.
    pub timestamp: i64,
    /// DID the initiator claims for itself.
    #[serde(rename = "senderDID")]
    pub sender_did: String,
    /// Compressed public key matching `signature`, when signed.
    #[serde(
        rename = "publicKey",
        with = "serde_hex::opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_key: Option<Vec<u8>>,
    /// Recoverable signature over the challenge digest, when signed.
    #[serde(
        with = "serde_hex::opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<Vec<u8>>,
}

/// Responder's proof of identity, echoing the challenge nonce.
///
/// Exactly one proof mechanism must be present: a recoverable signature
/// over the hashed nonce, or a ZK proof for the configured scheme.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// The challenge nonce, echoed back verbatim.
    #[serde(with = "serde_hex")]
    pub nonce: Vec<u8>,
    #[serde(
        with = "serde_hex::opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<Vec<u8>>,
    #[serde(
        rename = "zkProof",
        with = "serde_hex::opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub zk_proof: Option<Vec<u8>>,
    /// DID the responder claims for itself.
    pub did: String,
    /// Responder's compressed public key.
    #[serde(rename = "publicKey", with = "serde_hex")]
    pub public_key: Vec<u8>,
}

impl Challenge {
    /// The stream protocol this challenge was issued under: signed
    /// challenges travel on the v1.1 protocol, unsigned on v1.0.
    pub fn protocol_id(&self) -> &'static str {
        if self.signature.is_some() {
            PROTOCOL_HANDSHAKE_SIGNED
        } else {
            PROTOCOL_HANDSHAKE
        }
    }
}

impl ChallengeResponse {
    /// True when the response carries a ZK proof rather than a signature.
    pub fn has_zk_proof(&self) -> bool {
        self.zk_proof.is_some()
    }
}

/// Final handshake message: the initiator shares the minted session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionAck {
    /// Session token the responder must present on later streams.
    pub token: String,
    /// Unix seconds when the session expires.
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_wire_field_names() {
        let challenge = Challenge {
            nonce: vec![7u8; 32],
            timestamp: 1_700_000_000,
            sender_did: "did:arbor:init".to_string(),
            public_key: None,
            signature: None,
        };
        let json = serde_json::to_value(&challenge).unwrap();
        assert!(json.get("senderDID").is_some());
        assert!(json.get("publicKey").is_none());
        assert_eq!(json["nonce"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn protocol_id_tracks_signature_presence() {
        let mut challenge = Challenge {
            nonce: vec![7u8; 32],
            timestamp: 1_700_000_000,
            sender_did: "did:arbor:init".to_string(),
            public_key: None,
            signature: None,
        };
        assert_eq!(challenge.protocol_id(), PROTOCOL_HANDSHAKE);
        challenge.signature = Some(vec![0u8; 65]);
        assert_eq!(challenge.protocol_id(), PROTOCOL_HANDSHAKE_SIGNED);
    }

    #[test]
    fn response_proof_detection() {
        let response = ChallengeResponse {
            nonce: vec![1u8; 32],
            signature: None,
            zk_proof: Some(vec![2, 3]),
            did: "did:arbor:resp".to_string(),
            public_key: vec![2u8; 33],
        };
        assert!(response.has_zk_proof());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("zkProof").is_some());
    }

    #[test]
    fn ack_roundtrip() {
        let ack = SessionAck {
            token: "abcd".to_string(),
            expires_at: 42,
        };
        let json = serde_json::to_string(&ack).unwrap();
        let parsed: SessionAck = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.token, "abcd");
        assert_eq!(parsed.expires_at, 42);
        assert!(json.contains("expiresAt"));
    }
}
