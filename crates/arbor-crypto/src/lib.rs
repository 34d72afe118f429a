//! Cryptographic primitives for the Arbor handshake.
//!
//! Signature scheme is recoverable ECDSA over secp256k1: 65-byte
//! signatures (64 signature bytes plus a recovery byte), 33-byte
//! compressed public keys, SHA-256 digests. Verification recovers the
//! signer's key from the signature and compares it byte-for-byte against
//! the claimed key. Session tokens are keyed BLAKE3 hashes bound to the
//! peer DID.

#![deny(unsafe_code)]

use thiserror::Error;

pub mod digest;
pub mod signature;
pub mod token;
pub mod wallet;
pub mod zk;

pub use digest::{challenge_digest, nonce_digest, sha256};
pub use signature::{verify_recoverable, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
pub use token::SessionTokenMinter;
pub use wallet::{LocalWallet, Wallet};
pub use zk::{ZkDisabled, ZkProver, ZkVerifier};

/// Length of a handshake nonce in bytes.
pub const NONCE_LENGTH: usize = 32;

/// Errors from signature, token, and proof operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid signature length: got {0} bytes, want {SIGNATURE_LENGTH}")]
    SignatureLength(usize),

    #[error("invalid public key length: got {0} bytes, want {PUBLIC_KEY_LENGTH}")]
    PublicKeyLength(usize),

    #[error("public key mismatch: recovered key does not match claimed key")]
    PublicKeyMismatch,

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("zero-knowledge proving is not available")]
    ProofUnavailable,

    #[error("zero-knowledge proof rejected")]
    ProofRejected,
}

/// Constant-time byte-slice equality.
///
/// Length is compared first; unequal lengths return immediately, which is
/// fine for nonces whose length is public.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Generate a fresh 32-byte handshake nonce.
pub fn generate_nonce() -> [u8; NONCE_LENGTH] {
    use rand::RngCore;
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"diff"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
