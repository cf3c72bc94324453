//! Wire shapes exchanged with the server.
//!
//! JSON with camelCase field names and Base64 binary fields. These structs are
//! the only schema; field names must stay bit-exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::{KdfParams, NONCE_LEN, SALT_LEN, WRAP_ALGORITHM, WrappedKey};
use crate::error::CryptoError;

/// Server-side copy of the wrapped master key, sent with the registration
/// request and returned on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationEnvelope {
    pub wrapped_master_key: String,
    pub kek_salt: String,
    pub kdf: KdfParams,
    pub wrap_algorithm: String,
    #[serde(rename = "wrapIV")]
    pub wrap_iv: String,
}

impl RegistrationEnvelope {
    pub(crate) fn new(wrapped: &WrappedKey, salt: &[u8; SALT_LEN], kdf: KdfParams) -> Self {
        Self {
            wrapped_master_key: codec::encode(&wrapped.ciphertext),
            kek_salt: codec::encode(salt),
            kdf,
            wrap_algorithm: WRAP_ALGORITHM.to_string(),
            wrap_iv: codec::encode(&wrapped.nonce),
        }
    }

    /// Checks algorithm and KDF parameters, then decodes the binary fields.
    pub(crate) fn decode(&self) -> Result<(WrappedKey, [u8; SALT_LEN]), CryptoError> {
        if self.wrap_algorithm != WRAP_ALGORITHM {
            return Err(CryptoError::UnsupportedAlgorithm(self.wrap_algorithm.clone()));
        }
        self.kdf.validate()?;

        let salt = codec::decode_array::<SALT_LEN>("kekSalt", &self.kek_salt)?;
        let wrapped = WrappedKey {
            ciphertext: codec::decode("wrappedMasterKey", &self.wrapped_master_key)?,
            nonce: codec::decode_array::<NONCE_LEN>("wrapIV", &self.wrap_iv)?,
        };
        Ok((wrapped, salt))
    }
}

/// A note key wrapped under the master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteKeyEnvelope {
    pub wrapped_note_key: String,
    #[serde(rename = "noteKeyIV")]
    pub note_key_iv: String,
}

impl From<&WrappedKey> for NoteKeyEnvelope {
    fn from(wrapped: &WrappedKey) -> Self {
        Self {
            wrapped_note_key: codec::encode(&wrapped.ciphertext),
            note_key_iv: codec::encode(&wrapped.nonce),
        }
    }
}

impl NoteKeyEnvelope {
    pub(crate) fn decode(&self) -> Result<WrappedKey, CryptoError> {
        Ok(WrappedKey {
            ciphertext: codec::decode("wrappedNoteKey", &self.wrapped_note_key)?,
            nonce: codec::decode_array::<NONCE_LEN>("noteKeyIV", &self.note_key_iv)?,
        })
    }
}

/// Body of a note create or update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(rename = "titleIV")]
    pub title_iv: String,
    pub content: String,
    #[serde(rename = "contentIV")]
    pub content_iv: String,
    pub note_key: NoteKeyEnvelope,
}

/// A note as stored by the server: the payload plus its server metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    #[serde(rename = "titleIV")]
    pub title_iv: String,
    pub content: String,
    #[serde(rename = "contentIV")]
    pub content_iv: String,
    pub note_key: NoteKeyEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<EncryptedNote> for NotePayload {
    fn from(note: EncryptedNote) -> Self {
        Self {
            id: note.id,
            title: note.title,
            title_iv: note.title_iv,
            content: note.content,
            content_iv: note.content_iv,
            note_key: note.note_key,
        }
    }
}

impl From<NotePayload> for EncryptedNote {
    fn from(payload: NotePayload) -> Self {
        Self {
            id: payload.id,
            title: payload.title,
            title_iv: payload.title_iv,
            content: payload.content,
            content_iv: payload.content_iv,
            note_key: payload.note_key,
            created_at: None,
        }
    }
}
