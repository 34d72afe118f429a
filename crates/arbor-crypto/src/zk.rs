//! Zero-knowledge proof strategy seams.
//!
//! The handshake treats proving as a capability that may be absent. The
//! disabled scheme makes "absent" an explicit implementation instead of a
//! scattering of `Option` checks; the handshake falls back to the
//! signature path when proving fails.

use crate::CryptoError;

/// Produces a proof over a handshake challenge.
pub trait ZkProver: Send + Sync {
    fn prove(&self, challenge: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Verifies a proof against the challenge and the peer's claimed key.
pub trait ZkVerifier: Send + Sync {
    fn verify(
        &self,
        proof: &[u8],
        challenge: &[u8],
        public_key: &[u8],
    ) -> Result<bool, CryptoError>;
}

/// The "no ZK scheme configured" strategy.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZkDisabled;

impl ZkProver for ZkDisabled {
    fn prove(&self, _challenge: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::ProofUnavailable)
    }
}

impl ZkVerifier for ZkDisabled {
    fn verify(
        &self,
        _proof: &[u8],
        _challenge: &[u8],
        _public_key: &[u8],
    ) -> Result<bool, CryptoError> {
        Err(CryptoError::ProofUnavailable)
    }
}
