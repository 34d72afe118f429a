//! Wallet seam and the local in-process implementation.

use k256::ecdsa::SigningKey;

use crate::{CryptoError, PUBLIC_KEY_LENGTH};

/// Signing capability consumed by the handshake.
///
/// Key management stays behind this trait; the handshake only ever asks
/// for a signature over a 32-byte digest and the compressed public key.
pub trait Wallet: Send + Sync {
    /// Sign a digest, returning a 65-byte recoverable signature.
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError>;

    /// Compressed public key (33 bytes).
    fn public_key(&self) -> Vec<u8>;
}

/// Wallet backed by an in-process secp256k1 key.
pub struct LocalWallet {
    key: SigningKey,
}

impl LocalWallet {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Load from a 32-byte secret scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key =
            SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }
}

impl Wallet for LocalWallet {
    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recovery_id.to_byte());
        Ok(out)
    }

    fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_is_compressed() {
        let wallet = LocalWallet::generate();
        assert_eq!(wallet.public_key().len(), PUBLIC_KEY_LENGTH);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(LocalWallet::from_bytes(&[0u8; 5]).is_err());
    }

    #[test]
    fn from_bytes_roundtrips_key() {
        let wallet = LocalWallet::generate();
        let secret = wallet.key.to_bytes();
        let restored = LocalWallet::from_bytes(&secret).unwrap();
        assert_eq!(wallet.public_key(), restored.public_key());
    }
}
