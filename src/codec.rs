//! Byte ⇄ transport text conversion.
//!
//! All wire fields use standard, padded Base64 (the same alphabet browsers
//! produce with `btoa`).

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::CryptoError;

/// Encodes raw bytes as standard Base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a Base64 field. `field` names the wire field in the error.
pub fn decode(field: &'static str, text: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(text)
        .map_err(|source| CryptoError::Encoding { field, source })
}

/// Decodes a Base64 field that must hold exactly `N` bytes.
pub fn decode_array<const N: usize>(
    field: &'static str,
    text: &str,
) -> Result<[u8; N], CryptoError> {
    let bytes = decode(field, text)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        field,
        expected: N,
        actual,
    })
}
