//! Client-side key hierarchy and envelope encryption for end-to-end
//! encrypted notes.
//!
//! A password derives a KEK that wraps the account's master key for the
//! server. After login the master key is also wrapped under a per-device KEK
//! kept in a [`LocalKeyStore`], so a later start can resume without the
//! password. Each note gets its own key, wrapped under the master key.

pub mod codec;
pub mod crypto;
pub mod envelope;
mod error;
pub mod keystore;
pub mod lifecycle;
pub mod notes;
mod storage;

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::debug;

pub use crate::crypto::{KdfParams, MasterKey, OsRandom, RandomSource, SeededRandom};
pub use crate::envelope::{EncryptedNote, NoteKeyEnvelope, NotePayload, RegistrationEnvelope};
pub use crate::error::{CryptoError, StoreError};
pub use crate::keystore::{FileKeyStore, LocalKeyStore, MemoryKeyStore, StoredValue};
pub use crate::notes::{Note, NotePreview};

/// Where a [`Session`] stands in the key lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing happened yet in this session.
    NoKey,
    /// An envelope was created; the account still has to log in.
    Registered,
    /// The master key is in memory and the device pair is stored.
    Unlocked,
    /// Logged out; the master key is gone.
    Locked,
}

/// One active session: the single master key slot plus the device store.
pub struct Session<S: LocalKeyStore, R: RandomSource = OsRandom> {
    store: S,
    rng: R,
    master: Option<MasterKey>,
    state: SessionState,
}

impl<S: LocalKeyStore> Session<S> {
    pub fn new(store: S) -> Self {
        Self::with_random(store, OsRandom)
    }
}

impl<S: LocalKeyStore, R: RandomSource> Session<S, R> {
    pub fn with_random(store: S, rng: R) -> Self {
        Self {
            store,
            rng,
            master: None,
            state: SessionState::NoKey,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the envelope to send with a registration request.
    ///
    /// An unlocked session stays unlocked.
    pub fn register(
        &mut self,
        password: &str,
        kdf: KdfParams,
    ) -> Result<RegistrationEnvelope, CryptoError> {
        let envelope = lifecycle::register(password, kdf, &self.rng)?;
        if self.state != SessionState::Unlocked {
            self.state = SessionState::Registered;
        }
        Ok(envelope)
    }

    /// Unlocks with the password and the envelope returned by the server.
    ///
    /// A failed login leaves the slot and state as they were.
    pub fn login(
        &mut self,
        password: &str,
        envelope: &RegistrationEnvelope,
    ) -> Result<(), CryptoError> {
        let master = lifecycle::login(password, envelope, &mut self.store, &self.rng)?;
        self.master = Some(master);
        self.state = SessionState::Unlocked;
        Ok(())
    }

    /// Unlocks from the device pair alone.
    pub fn resume(&mut self) -> Result<(), CryptoError> {
        let master = lifecycle::resume_without_password(&self.store)?;
        self.master = Some(master);
        self.state = SessionState::Unlocked;
        Ok(())
    }

    /// Drops the master key, then clears the device pair.
    ///
    /// The key is gone from memory even if the store cannot be cleared.
    pub fn logout(&mut self) -> Result<(), CryptoError> {
        self.master = None;
        self.state = SessionState::Locked;
        debug!("master key dropped");
        lifecycle::logout(&mut self.store)
    }

    /// The unlocked master key, or [`CryptoError::Locked`].
    pub fn master_key(&self) -> Result<&MasterKey, CryptoError> {
        self.master.as_ref().ok_or(CryptoError::Locked)
    }

    pub fn new_note(&self, title: &str, content: &str) -> Result<NotePayload, CryptoError> {
        notes::new_note(title, content, self.master_key()?, &self.rng)
    }

    pub fn reencrypt(
        &self,
        note: &Note,
        key_envelope: &NoteKeyEnvelope,
    ) -> Result<EncryptedNote, CryptoError> {
        notes::reencrypt(note, key_envelope, self.master_key()?, &self.rng)
    }

    pub fn decrypt(&self, encrypted: &EncryptedNote) -> Result<Note, CryptoError> {
        notes::decrypt(encrypted, self.master_key()?)
    }

    pub fn decrypt_preview(&self, encrypted: &EncryptedNote) -> Result<NotePreview, CryptoError> {
        notes::decrypt_preview(encrypted, self.master_key()?)
    }

    pub fn batch_decrypt_previews(
        &self,
        encrypted: &[EncryptedNote],
    ) -> Result<Vec<Result<NotePreview, CryptoError>>, CryptoError> {
        Ok(notes::batch_decrypt_previews(encrypted, self.master_key()?))
    }
}

/// Default location of the device key store file.
pub fn default_store_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "sealnote").context("could not determine platform directories")?;

    Ok(project_dirs.data_dir().join("device-keys.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_session_is_locked_out_of_notes() {
        let session = Session::new(MemoryKeyStore::new());

        assert_eq!(session.state(), SessionState::NoKey);
        assert!(matches!(session.new_note("t", "c"), Err(CryptoError::Locked)));
        assert!(matches!(
            session.batch_decrypt_previews(&[]),
            Err(CryptoError::Locked)
        ));
    }

    #[test]
    fn full_lifecycle() {
        let mut session = Session::new(MemoryKeyStore::new());

        let envelope = session.register("Correct1!", KdfParams::default()).unwrap();
        assert_eq!(session.state(), SessionState::Registered);

        assert!(matches!(
            session.login("Wrong1!", &envelope),
            Err(CryptoError::InvalidCredentials)
        ));
        assert_eq!(session.state(), SessionState::Registered);

        session.login("Correct1!", &envelope).unwrap();
        assert_eq!(session.state(), SessionState::Unlocked);

        let payload = session.new_note("Hello", "World").unwrap();
        let note = session.decrypt(&EncryptedNote::from(payload)).unwrap();
        assert_eq!((note.title.as_str(), note.content.as_str()), ("Hello", "World"));

        session.logout().unwrap();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(session.master_key().is_err());
        assert!(session.store().is_empty());
        assert!(matches!(session.resume(), Err(CryptoError::DeviceKeyMissing)));
    }

    #[test]
    fn resume_across_sessions_with_file_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");

        let mut first = Session::new(FileKeyStore::new(path.clone()));
        let envelope = first.register("pw", KdfParams::default()).unwrap();
        first.login("pw", &envelope).unwrap();
        let payload = first.new_note("kept", "across restarts").unwrap();
        drop(first);

        let mut second = Session::new(FileKeyStore::new(path));
        second.resume().unwrap();
        assert_eq!(second.state(), SessionState::Unlocked);

        let note = second.decrypt(&EncryptedNote::from(payload)).unwrap();
        assert_eq!(note.title, "kept");
    }

    #[test]
    fn reencrypt_through_session() {
        let mut session = Session::with_random(MemoryKeyStore::new(), SeededRandom::new([9u8; 32]));
        let envelope = session.register("pw", KdfParams::default()).unwrap();
        session.login("pw", &envelope).unwrap();

        let payload = session.new_note("draft", "v1").unwrap();
        let mut note = session.decrypt(&EncryptedNote::from(payload.clone())).unwrap();
        note.content = "v2".to_string();

        let updated = session.reencrypt(&note, &payload.note_key).unwrap();
        assert_eq!(updated.note_key, payload.note_key);
        assert_eq!(session.decrypt_preview(&updated).unwrap().title, "draft");
        assert_eq!(session.decrypt(&updated).unwrap().content, "v2");
    }

    #[test]
    fn default_store_path_is_json_file() {
        if let Ok(path) = default_store_path() {
            assert!(path.ends_with("device-keys.json"));
        }
    }
}
