//! Key types of the hierarchy.
//!
//! Each key carries its allowed usages in its type:
//!
//! | type          | wraps keys | can be wrapped | encrypts data |
//! |---------------|------------|----------------|---------------|
//! | `MasterKey`   | yes        | yes            | yes           |
//! | `NoteKey`     | no         | yes            | yes           |
//! | `PasswordKek` | yes        | no             | no            |
//! | `DeviceKek`   | yes        | no             | no            |
//!
//! None of them hand out their raw bytes outside the crate. The traits below
//! are sealed and their byte accessors take a token only this crate can build.

use std::fmt;

use zeroize::Zeroizing;

use super::KEY_LEN;
use super::random::RandomSource;
use crate::error::CryptoError;

mod sealed {
    pub trait Sealed {}

    /// Proof that a call comes from inside the crate.
    #[derive(Clone, Copy)]
    pub struct Token(());

    pub(crate) const TOKEN: Token = Token(());
}

use sealed::Token;
pub(crate) use sealed::TOKEN;

/// Operations a key is permitted to take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Encrypt,
    Decrypt,
    WrapKey,
    UnwrapKey,
}

/// A key that may wrap and unwrap other keys.
pub trait WrappingKey: sealed::Sealed {
    #[doc(hidden)]
    fn wrapping_bytes(&self, _: Token) -> &[u8; KEY_LEN];
}

/// A key whose raw bytes may travel inside a wrap ciphertext.
pub trait WrappableKey: sealed::Sealed + Sized {
    /// Human readable kind, used in log events.
    const KIND: &'static str;
    /// Usages granted to a key of this type when it is unwrapped.
    const USAGES: &'static [KeyUsage];

    #[doc(hidden)]
    fn raw_bytes(&self, _: Token) -> &[u8; KEY_LEN];

    #[doc(hidden)]
    fn from_raw(bytes: Zeroizing<[u8; KEY_LEN]>, _: Token) -> Self;
}

/// A key that may encrypt and decrypt user data.
pub trait DataKey: sealed::Sealed {
    #[doc(hidden)]
    fn data_bytes(&self, _: Token) -> &[u8; KEY_LEN];
}

fn random_key<R: RandomSource>(rng: &R) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    rng.fill(&mut bytes[..])?;
    Ok(bytes)
}

fn bytes_eq(a: &[u8; KEY_LEN], b: &[u8; KEY_LEN]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

macro_rules! redacted_debug {
    ($ty:ident) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

/// Root key of an account. Zeroized on drop.
#[derive(Clone)]
pub struct MasterKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl MasterKey {
    /// Generates a fresh master key.
    pub fn generate<R: RandomSource>(rng: &R) -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: random_key(rng)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        bytes_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for MasterKey {}

impl sealed::Sealed for MasterKey {}

impl WrappingKey for MasterKey {
    fn wrapping_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl WrappableKey for MasterKey {
    const KIND: &'static str = "master key";
    const USAGES: &'static [KeyUsage] = &[
        KeyUsage::Encrypt,
        KeyUsage::Decrypt,
        KeyUsage::WrapKey,
        KeyUsage::UnwrapKey,
    ];

    fn raw_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    fn from_raw(bytes: Zeroizing<[u8; KEY_LEN]>, _: Token) -> Self {
        Self { bytes }
    }
}

impl DataKey for MasterKey {
    fn data_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

redacted_debug!(MasterKey);

/// Per-note content key. Zeroized on drop.
#[derive(Clone)]
pub struct NoteKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl NoteKey {
    /// Generates a fresh note key.
    pub fn generate<R: RandomSource>(rng: &R) -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: random_key(rng)?,
        })
    }
}

impl PartialEq for NoteKey {
    fn eq(&self, other: &Self) -> bool {
        bytes_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for NoteKey {}

impl sealed::Sealed for NoteKey {}

impl WrappableKey for NoteKey {
    const KIND: &'static str = "note key";
    const USAGES: &'static [KeyUsage] = &[KeyUsage::Encrypt, KeyUsage::Decrypt];

    fn raw_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    fn from_raw(bytes: Zeroizing<[u8; KEY_LEN]>, _: Token) -> Self {
        Self { bytes }
    }
}

impl DataKey for NoteKey {
    fn data_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

redacted_debug!(NoteKey);

/// Key-encryption key derived from the account password.
///
/// Only ever produced by [`crate::crypto::derive_kek`].
pub struct PasswordKek {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl PasswordKek {
    pub const USAGES: &'static [KeyUsage] = &[KeyUsage::WrapKey, KeyUsage::UnwrapKey];

    pub(crate) fn from_derived(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self { bytes }
    }
}

impl sealed::Sealed for PasswordKek {}

impl WrappingKey for PasswordKek {
    fn wrapping_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

redacted_debug!(PasswordKek);

/// Non-exportable per-device key-encryption key.
///
/// An opaque handle: it can wrap and unwrap, and the crate's own key stores
/// can persist it, but its bytes are never readable from outside the crate.
#[derive(Clone)]
pub struct DeviceKek {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl DeviceKek {
    pub const USAGES: &'static [KeyUsage] = &[KeyUsage::WrapKey, KeyUsage::UnwrapKey];

    /// Generates a fresh device key.
    pub fn generate<R: RandomSource>(rng: &R) -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: random_key(rng)?,
        })
    }

    pub(crate) fn persisted_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub(crate) fn from_persisted(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self { bytes }
    }
}

impl sealed::Sealed for DeviceKek {}

impl WrappingKey for DeviceKek {
    fn wrapping_bytes(&self, _: Token) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

redacted_debug!(DeviceKek);
