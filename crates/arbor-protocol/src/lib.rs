//! A2A request dispatch for authenticated peers.
//!
//! Every request arrives with a session token minted during the
//! handshake. The dispatcher resolves the peer, routes by request type,
//! and always answers with a structured response; authorization denials
//! are data, not errors, and nothing thrown inside a tool executor
//! escapes to the stream.

#![deny(unsafe_code)]

use arbor_handshake::HandshakeError;
use arbor_types::{PaymentDecision, PeerDid};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod handler;

pub use handler::ProtocolHandler;

/// Executes a tool on behalf of a remote peer.
///
/// Two instances may be configured: a default executor and a sandboxed
/// one. The dispatcher prefers the sandboxed executor for every
/// remote-originated call when both are present.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        params: Map<String, Value>,
    ) -> anyhow::Result<Map<String, Value>>;
}

/// Supplies the local agent's capability descriptor.
pub trait CardProvider: Send + Sync {
    fn card(&self) -> Map<String, Value>;
}

/// Decides whether an invocation requires payment.
#[async_trait]
pub trait PaymentGate: Send + Sync {
    async fn check(
        &self,
        peer_did: &PeerDid,
        tool_name: &str,
        payload: Option<&Map<String, Value>>,
    ) -> anyhow::Result<PaymentDecision>;
}

/// Stream-level dispatch failures. Request-level problems never surface
/// here; they become `denied` or `error` responses instead.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] HandshakeError),
}
