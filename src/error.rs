use thiserror::Error;

/// Errors raised by the key hierarchy and note encryption.
///
/// Password flows report [`CryptoError::InvalidCredentials`], note flows
/// report [`CryptoError::DecryptionFailed`]. Neither ever carries partial
/// key material or plaintext.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("OS random generator unavailable")]
    RandomUnavailable,

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("unsupported KDF parameters: {0}")]
    UnsupportedKdf(String),

    #[error("unsupported wrap algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("unwrap failed")]
    UnwrapFailed,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("decryption failed: wrong master key or corrupted data")]
    DecryptionFailed,

    #[error("device key missing; interactive login required")]
    DeviceKeyMissing,

    #[error("device key does not match the stored master key; interactive login required")]
    DeviceKeyMismatch,

    #[error("device key pair could not be persisted; interactive login required")]
    PartialPersistence(#[source] StoreError),

    #[error("session is locked; log in first")]
    Locked,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid base64 in '{field}'")]
    Encoding {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised by a [`crate::LocalKeyStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("local key store I/O failed")]
    Io(#[from] std::io::Error),

    #[error("local key store is corrupted: {0}")]
    Corrupted(String),

    #[error("record '{0}' could not be written")]
    WriteRejected(String),
}
