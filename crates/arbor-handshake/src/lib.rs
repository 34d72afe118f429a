//! Challenge-response handshake between agent peers.
//!
//! A handshake authenticates a remote peer and mints a session. Two
//! protocol versions share one code path: v1.1 signs the challenge with
//! the local wallet; v1.0 sends it unsigned when no wallet is available.
//! Every verification failure aborts the attempt; no partial session is
//! persisted, and retry means a fresh stream with a fresh nonce.

#![deny(unsafe_code)]

use arbor_crypto::CryptoError;
use arbor_session::SessionError;
use arbor_types::PeerDid;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod codec;
pub mod handshaker;

pub use codec::{read_document, write_document, MAX_DOCUMENT_BYTES};
pub use handshaker::{HandshakeConfig, Handshaker, MAX_CHALLENGE_AGE_SECS, MAX_CLOCK_SKEW_SECS};

/// Owner approval gate, shared by the handshake (no tool context) and the
/// request dispatcher (with tool context).
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(
        &self,
        peer_did: &PeerDid,
        remote_addr: &str,
        tool_name: Option<&str>,
        params: Option<&Map<String, Value>>,
    ) -> bool;
}

/// Handshake failures. All are fatal to the current attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("could not decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("wire document exceeds size cap ({0} bytes)")]
    DocumentTooLarge(usize),

    #[error("stream closed mid-exchange")]
    StreamClosed,

    #[error("handshake timed out")]
    Timeout,

    #[error("challenge timestamp too old ({age_secs}s)")]
    StaleChallenge { age_secs: i64 },

    #[error("challenge timestamp in the future ({skew_secs}s)")]
    FutureChallenge { skew_secs: i64 },

    #[error("nonce rejected: malformed or already seen")]
    NonceRejected,

    #[error("unsigned challenge refused: signatures required")]
    UnsignedChallenge,

    #[error("signed challenge missing its public key")]
    MissingPublicKey,

    #[error("owner denied the connection")]
    ApprovalDenied,

    #[error("nonce in response does not match challenge")]
    NonceMismatch,

    #[error("no proof or signature")]
    NoProof,

    #[error("zero-knowledge proof rejected")]
    ProofRejected,

    #[error("no ZK verifier configured for proof-bearing response")]
    NoVerifier,

    #[error("cannot respond: no wallet configured")]
    NoWallet,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
