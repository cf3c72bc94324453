//! Key wrapping: AES-256-GCM with a key's raw bytes as the plaintext.
//!
//! Output: `ciphertext = key (32) || tag (16)`, nonce (12) kept alongside.

use tracing::debug;
use zeroize::Zeroizing;

use super::aead::{open_with, seal_with};
use super::keys::{TOKEN, WrappableKey, WrappingKey};
use super::random::RandomSource;
use super::{KEY_LEN, NONCE_LEN};
use crate::error::CryptoError;

/// A key sealed under another key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Wrap `target` under `under`, drawing a fresh nonce.
pub fn wrap<K, W, R>(target: &K, under: &W, rng: &R) -> Result<WrappedKey, CryptoError>
where
    K: WrappableKey,
    W: WrappingKey,
    R: RandomSource,
{
    let sealed = seal_with(under.wrapping_bytes(TOKEN), target.raw_bytes(TOKEN), rng)?;
    debug!(kind = K::KIND, "wrapped key");

    Ok(WrappedKey {
        ciphertext: sealed.ciphertext,
        nonce: sealed.nonce,
    })
}

/// Unwrap into a key of type `K`, which fixes the usages the key gets.
///
/// Fails closed with [`CryptoError::UnwrapFailed`]: wrong wrapping key,
/// altered ciphertext, altered nonce and a wrong key length all look alike.
pub fn unwrap<K, W>(ciphertext: &[u8], nonce: &[u8], under: &W) -> Result<K, CryptoError>
where
    K: WrappableKey,
    W: WrappingKey,
{
    let plaintext =
        open_with(under.wrapping_bytes(TOKEN), nonce, ciphertext).ok_or(CryptoError::UnwrapFailed)?;

    if plaintext.len() != KEY_LEN {
        return Err(CryptoError::UnwrapFailed);
    }

    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    bytes.copy_from_slice(&plaintext);

    Ok(K::from_raw(bytes, TOKEN))
}

impl WrappedKey {
    /// Unwrap this envelope under `under`.
    pub fn unwrap<K, W>(&self, under: &W) -> Result<K, CryptoError>
    where
        K: WrappableKey,
        W: WrappingKey,
    {
        unwrap(&self.ciphertext, &self.nonce, under)
    }
}
