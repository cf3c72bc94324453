//! Cryptographic primitives for the key hierarchy.
//!
//! Provides randomness, key types, password key derivation, AES-256-GCM
//! encryption and key wrapping.

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod random;
pub mod wrap;

pub use aead::{Sealed, open, seal};
pub use kdf::{KdfParams, derive_kek, generate_salt};
pub use keys::{DataKey, DeviceKek, KeyUsage, MasterKey, NoteKey, PasswordKek, WrappableKey, WrappingKey};
pub use random::{OsRandom, RandomSource, SeededRandom};
pub use wrap::{WrappedKey, unwrap, wrap};

/// Length of the KDF salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the AES-GCM nonce (12 bytes).
pub const NONCE_LEN: usize = 12;
/// Length of every symmetric key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the AES-GCM authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;
/// Wire name of the wrapping algorithm.
pub const WRAP_ALGORITHM: &str = "AES-GCM";
