use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::PasswordKek;
use super::random::RandomSource;
use super::{KEY_LEN, SALT_LEN};
use crate::error::CryptoError;

pub const KDF_NAME: &str = "PBKDF2";
pub const KDF_HASH: &str = "SHA-256";
/// Lowest iteration count accepted, both for new and stored parameters.
pub const MIN_ITERATIONS: u32 = 300_000;

/// Password KDF parameters, stored next to the wrapped master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    name: String,
    hash: String,
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            name: KDF_NAME.to_string(),
            hash: KDF_HASH.to_string(),
            iterations: MIN_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32) -> Result<Self, CryptoError> {
        let params = Self {
            iterations,
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.name != KDF_NAME {
            return Err(CryptoError::UnsupportedKdf(format!(
                "algorithm '{}'",
                self.name
            )));
        }
        if self.hash != KDF_HASH {
            return Err(CryptoError::UnsupportedKdf(format!("hash '{}'", self.hash)));
        }
        if self.iterations < MIN_ITERATIONS {
            return Err(CryptoError::UnsupportedKdf(format!(
                "{} iterations, need at least {MIN_ITERATIONS}",
                self.iterations
            )));
        }
        Ok(())
    }
}

/// Generate a fresh KDF salt
pub fn generate_salt<R: RandomSource>(rng: &R) -> Result<[u8; SALT_LEN], CryptoError> {
    rng.array()
}

/// Derive the password key-encryption key.
///
/// Deterministic in `(password, salt, params)`. A wrong password silently
/// yields a different key; the mismatch only shows when unwrapping.
pub fn derive_kek(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<PasswordKek, CryptoError> {
    params.validate()?;
    if salt.is_empty() {
        return Err(CryptoError::Derivation("empty salt".to_string()));
    }

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key[..]);

    Ok(PasswordKek::from_derived(key))
}
