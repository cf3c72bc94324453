//! Per-note encryption: a fresh note key wrapped under the master key, title
//! and content sealed under the note key with independent nonces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec;
use crate::crypto::{self, MasterKey, NONCE_LEN, NoteKey, RandomSource, Sealed, wrap};
use crate::envelope::{EncryptedNote, NoteKeyEnvelope, NotePayload};
use crate::error::CryptoError;

/// A decrypted note. Lives in client memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            created_at: None,
        }
    }
}

/// Title-only view of a note, for list rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
}

/// Encrypts a new note under a freshly generated note key.
pub fn new_note<R: RandomSource>(
    title: &str,
    content: &str,
    master: &MasterKey,
    rng: &R,
) -> Result<NotePayload, CryptoError> {
    let note_key = NoteKey::generate(rng)?;
    let wrapped = wrap(&note_key, master, rng)?;

    let (title, content) = seal_fields(&note_key, title, content, rng)?;
    Ok(NotePayload {
        id: None,
        title: codec::encode(&title.ciphertext),
        title_iv: codec::encode(&title.nonce),
        content: codec::encode(&content.ciphertext),
        content_iv: codec::encode(&content.nonce),
        note_key: NoteKeyEnvelope::from(&wrapped),
    })
}

/// Re-encrypts an edited note under its existing note key.
///
/// The key envelope is carried over unchanged; title and content get fresh
/// nonces. Fails with [`CryptoError::DecryptionFailed`] if the envelope does
/// not open under `master`.
pub fn reencrypt<R: RandomSource>(
    note: &Note,
    key_envelope: &NoteKeyEnvelope,
    master: &MasterKey,
    rng: &R,
) -> Result<EncryptedNote, CryptoError> {
    let note_key = unwrap_note_key(key_envelope, master).map_err(into_decryption_failed)?;

    let (title, content) = seal_fields(&note_key, &note.title, &note.content, rng)?;
    Ok(EncryptedNote {
        id: note.id,
        title: codec::encode(&title.ciphertext),
        title_iv: codec::encode(&title.nonce),
        content: codec::encode(&content.ciphertext),
        content_iv: codec::encode(&content.nonce),
        note_key: key_envelope.clone(),
        created_at: note.created_at,
    })
}

/// Decrypts title and content. Nothing is returned unless both open.
pub fn decrypt(encrypted: &EncryptedNote, master: &MasterKey) -> Result<Note, CryptoError> {
    let opened = unwrap_note_key(&encrypted.note_key, master).and_then(|key| {
        let title = open_text(&key, "titleIV", &encrypted.title_iv, "title", &encrypted.title)?;
        let content = open_text(
            &key,
            "contentIV",
            &encrypted.content_iv,
            "content",
            &encrypted.content,
        )?;
        Ok((title, content))
    });
    let (title, content) = opened.map_err(into_decryption_failed)?;

    Ok(Note {
        id: encrypted.id,
        title,
        content,
        created_at: encrypted.created_at,
    })
}

/// Decrypts the title only, leaving the body untouched.
pub fn decrypt_preview(
    encrypted: &EncryptedNote,
    master: &MasterKey,
) -> Result<NotePreview, CryptoError> {
    let title = unwrap_note_key(&encrypted.note_key, master)
        .and_then(|key| open_text(&key, "titleIV", &encrypted.title_iv, "title", &encrypted.title))
        .map_err(into_decryption_failed)?;

    Ok(NotePreview {
        id: encrypted.id,
        title,
    })
}

/// Decrypts the preview of every note, in input order.
///
/// Failures are isolated: a corrupted note yields `Err` at its own index and
/// the remaining notes still decrypt.
pub fn batch_decrypt_previews(
    notes: &[EncryptedNote],
    master: &MasterKey,
) -> Vec<Result<NotePreview, CryptoError>> {
    notes
        .iter()
        .enumerate()
        .map(|(index, note)| {
            let preview = decrypt_preview(note, master);
            if let Err(e) = &preview {
                warn!(index, id = ?note.id, error = %e, "note preview failed");
            }
            preview
        })
        .collect()
}

fn seal_fields<R: RandomSource>(
    key: &NoteKey,
    title: &str,
    content: &str,
    rng: &R,
) -> Result<(Sealed, Sealed), CryptoError> {
    let title = crypto::seal(key, title.as_bytes(), rng)?;
    let content = crypto::seal(key, content.as_bytes(), rng)?;
    Ok((title, content))
}

fn unwrap_note_key(envelope: &NoteKeyEnvelope, master: &MasterKey) -> Result<NoteKey, CryptoError> {
    envelope.decode()?.unwrap(master)
}

fn open_text(
    key: &NoteKey,
    nonce_field: &'static str,
    nonce: &str,
    field: &'static str,
    ciphertext: &str,
) -> Result<String, CryptoError> {
    let nonce = codec::decode_array::<NONCE_LEN>(nonce_field, nonce)?;
    let ciphertext = codec::decode(field, ciphertext)?;
    let plaintext = crypto::open(key, &nonce, &ciphertext)?;

    std::str::from_utf8(&plaintext)
        .map(str::to_owned)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn into_decryption_failed(e: CryptoError) -> CryptoError {
    debug!(cause = %e, "note decryption failed");
    CryptoError::DecryptionFailed
}
