//! Recoverable ECDSA verification.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::CryptoError;

/// Wire signature length: 64 signature bytes plus one recovery byte.
pub const SIGNATURE_LENGTH: usize = 65;

/// Compressed secp256k1 public key length.
pub const PUBLIC_KEY_LENGTH: usize = 33;

/// Verify a recoverable signature over a 32-byte digest.
///
/// Recovers the signer's public key from the signature and requires its
/// compressed encoding to byte-equal `claimed_key`. A wrong-length
/// signature, an unparseable signature, and a recovered-key mismatch are
/// distinct errors so callers can log the failure mode.
pub fn verify_recoverable(
    digest: &[u8; 32],
    signature: &[u8],
    claimed_key: &[u8],
) -> Result<(), CryptoError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::SignatureLength(signature.len()));
    }
    if claimed_key.len() != PUBLIC_KEY_LENGTH {
        return Err(CryptoError::PublicKeyLength(claimed_key.len()));
    }

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::SignatureInvalid(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(signature[64])
        .ok_or_else(|| CryptoError::SignatureInvalid("bad recovery byte".to_string()))?;

    let recovered = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| CryptoError::SignatureInvalid(e.to_string()))?;

    let recovered_compressed = recovered.to_encoded_point(true);
    if recovered_compressed.as_bytes() != claimed_key {
        return Err(CryptoError::PublicKeyMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{LocalWallet, Wallet};
    use crate::{nonce_digest, CryptoError};

    #[test]
    fn sign_and_verify_roundtrip() {
        let wallet = LocalWallet::generate();
        let digest = nonce_digest(&[5u8; 32]);
        let sig = wallet.sign(&digest).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LENGTH);
        verify_recoverable(&digest, &sig, &wallet.public_key()).unwrap();
    }

    #[test]
    fn wrong_public_key_is_a_mismatch() {
        let wallet = LocalWallet::generate();
        let other = LocalWallet::generate();
        let digest = nonce_digest(&[5u8; 32]);
        let sig = wallet.sign(&digest).unwrap();
        let err = verify_recoverable(&digest, &sig, &other.public_key()).unwrap_err();
        assert!(matches!(err, CryptoError::PublicKeyMismatch));
    }

    #[test]
    fn wrong_length_signature_rejected() {
        let wallet = LocalWallet::generate();
        let digest = nonce_digest(&[5u8; 32]);
        let err = verify_recoverable(&digest, &[0u8; 64], &wallet.public_key()).unwrap_err();
        assert!(matches!(err, CryptoError::SignatureLength(64)));
    }

    #[test]
    fn flipped_byte_fails_verification() {
        let wallet = LocalWallet::generate();
        let digest = nonce_digest(&[5u8; 32]);
        let mut sig = wallet.sign(&digest).unwrap();
        sig[10] ^= 0xff;
        assert!(verify_recoverable(&digest, &sig, &wallet.public_key()).is_err());
    }
}
