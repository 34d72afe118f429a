//! Fixed digests signed during the handshake.

use sha2::{Digest, Sha256};

/// Digest covered by a signed challenge (protocol v1.1):
/// `SHA-256(nonce || big_endian_u64(timestamp) || utf8(sender_did))`.
pub fn challenge_digest(nonce: &[u8], timestamp: i64, sender_did: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update((timestamp as u64).to_be_bytes());
    hasher.update(sender_did.as_bytes());
    hasher.finalize().into()
}

/// Digest covered by a challenge-response signature: `SHA-256(nonce)`.
pub fn nonce_digest(nonce: &[u8]) -> [u8; 32] {
    sha256(nonce)
}

/// Plain SHA-256, used for attestation public inputs.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
