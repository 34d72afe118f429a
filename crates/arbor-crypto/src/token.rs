//! Session token minting.

use rand::RngCore;

/// Mints session tokens keyed by a process-lifetime secret.
///
/// A token is `BLAKE3_keyed(secret, random_32 || peer_did)` rendered as
/// hex. Keying binds the token to this process; mixing in the peer DID
/// binds it to one peer identity, so a stolen token cannot validate
/// against another peer's store entry.
pub struct SessionTokenMinter {
    key: [u8; 32],
}

impl SessionTokenMinter {
    /// Create a minter with a fresh random key. Tokens from previous
    /// process lifetimes stop validating, which is intended.
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Mint a token for a peer.
    pub fn mint(&self, peer_did: &str) -> String {
        let mut material = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut material);

        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(&material);
        hasher.update(peer_did.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl Default for SessionTokenMinter {
    fn default() -> Self {
        Self::new()
    }
}
