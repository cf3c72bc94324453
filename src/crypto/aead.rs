use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use zeroize::Zeroizing;

use super::keys::{DataKey, TOKEN};
use super::random::RandomSource;
use super::{KEY_LEN, NONCE_LEN};
use crate::error::CryptoError;

/// Output of one AES-256-GCM encryption: ciphertext with appended tag, plus
/// the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Encrypt plaintext under a fresh random nonce
pub(crate) fn seal_with<R: RandomSource>(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    rng: &R,
) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce: [u8; NONCE_LEN] = rng.array()?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(Sealed { ciphertext, nonce })
}

/// Decrypt and authenticate. `None` on any tag or nonce problem.
pub(crate) fn open_with(
    key: &[u8; KEY_LEN],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Option<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_LEN {
        return None;
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .ok()
        .map(Zeroizing::new)
}

/// Encrypt user data under a data key.
pub fn seal<K: DataKey, R: RandomSource>(
    key: &K,
    plaintext: &[u8],
    rng: &R,
) -> Result<Sealed, CryptoError> {
    seal_with(key.data_bytes(TOKEN), plaintext, rng)
}

/// Decrypt user data under a data key.
pub fn open<K: DataKey>(
    key: &K,
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    open_with(key.data_bytes(TOKEN), nonce, ciphertext).ok_or(CryptoError::DecryptionFailed)
}
