//! Per-device key-value persistence for the device key pair.
//!
//! The lifecycle manages exactly two records, [`DEVICE_KEK`] and
//! [`DEVICE_ENVELOPE`], and always writes and deletes them together.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;
use zeroize::Zeroizing;

use crate::codec;
use crate::crypto::{DeviceKek, KEY_LEN, NONCE_LEN, WrappedKey};
use crate::error::{CryptoError, StoreError};
use crate::storage::Storage;

/// Record holding the non-exportable device key-encryption key.
pub const DEVICE_KEK: &str = "KEK_device";
/// Record holding the master key wrapped under the device KEK.
pub const DEVICE_ENVELOPE: &str = "wrapped_master_dev";

/// A value the key store can hold.
#[derive(Debug, Clone)]
pub enum StoredValue {
    DeviceKek(DeviceKek),
    WrappedKey(WrappedKey),
}

/// Persistent storage scoped to one device profile.
pub trait LocalKeyStore {
    fn get(&self, name: &str) -> Result<Option<StoredValue>, StoreError>;

    fn put(&mut self, name: &str, value: StoredValue) -> Result<(), StoreError>;

    fn delete(&mut self, name: &str) -> Result<(), StoreError>;

    /// Writes all entries or none of them.
    ///
    /// The default writes one by one and, when a write fails, restores the
    /// records it already touched to their previous state.
    fn put_many(&mut self, entries: Vec<(&str, StoredValue)>) -> Result<(), StoreError> {
        let mut previous = Vec::with_capacity(entries.len());

        for (name, value) in entries {
            let before = self.get(name)?;
            if let Err(e) = self.put(name, value) {
                for (done, old) in previous.into_iter().rev() {
                    let restored = match old {
                        Some(old) => self.put(done, old),
                        None => self.delete(done),
                    };
                    if let Err(rollback) = restored {
                        warn!(record = done, error = %rollback, "rollback of key store record failed");
                    }
                }
                return Err(e);
            }
            previous.push((name, before));
        }

        Ok(())
    }

    /// Deletes every named record, attempting all of them even if one fails.
    fn delete_many(&mut self, names: &[&str]) -> Result<(), StoreError> {
        let mut first_err = None;
        for name in names {
            if let Err(e) = self.delete(name) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Volatile store; contents die with the process.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: HashMap<String, StoredValue>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LocalKeyStore for MemoryKeyStore {
    fn get(&self, name: &str) -> Result<Option<StoredValue>, StoreError> {
        Ok(self.records.get(name).cloned())
    }

    fn put(&mut self, name: &str, value: StoredValue) -> Result<(), StoreError> {
        self.records.insert(name.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        self.records.remove(name);
        Ok(())
    }
}

const FILE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Default)]
struct KeyStoreFile {
    version: u32,
    records: BTreeMap<String, PersistedRecord>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum PersistedRecord {
    DeviceKek { key: String },
    WrappedKey { ciphertext: String, nonce: String },
}

impl From<&StoredValue> for PersistedRecord {
    fn from(value: &StoredValue) -> Self {
        match value {
            StoredValue::DeviceKek(kek) => PersistedRecord::DeviceKek {
                key: codec::encode(kek.persisted_bytes()),
            },
            StoredValue::WrappedKey(wrapped) => PersistedRecord::WrappedKey {
                ciphertext: codec::encode(&wrapped.ciphertext),
                nonce: codec::encode(&wrapped.nonce),
            },
        }
    }
}

impl PersistedRecord {
    fn restore(&self) -> Result<StoredValue, CryptoError> {
        match self {
            PersistedRecord::DeviceKek { key } => {
                let bytes = Zeroizing::new(codec::decode_array::<KEY_LEN>("key", key)?);
                Ok(StoredValue::DeviceKek(DeviceKek::from_persisted(bytes)))
            }
            PersistedRecord::WrappedKey { ciphertext, nonce } => {
                Ok(StoredValue::WrappedKey(WrappedKey {
                    ciphertext: codec::decode("ciphertext", ciphertext)?,
                    nonce: codec::decode_array::<NONCE_LEN>("nonce", nonce)?,
                }))
            }
        }
    }
}

/// Store backed by one JSON file, replaced atomically on every change.
///
/// Multi-record writes go out in a single file replace, so the device pair
/// is never half written. A file that cannot be parsed is discarded by the
/// next write or delete, since it only ever holds the device pair.
///
/// Limitations: the device KEK is stored as plain Base64, protected only by
/// the file's owner-only permissions. There is no cross-process locking.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    storage: Storage,
}

impl FileKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            storage: Storage::new(path),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.storage.path()
    }

    fn read(&self) -> Result<KeyStoreFile, StoreError> {
        let Some(data) = self.storage.load()? else {
            return Ok(KeyStoreFile {
                version: FILE_FORMAT_VERSION,
                records: BTreeMap::new(),
            });
        };

        let file: KeyStoreFile = serde_json::from_slice(&data)
            .map_err(|e| StoreError::Corrupted(format!("unreadable key store: {e}")))?;
        if file.version != FILE_FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported key store version: {}",
                file.version
            )));
        }
        Ok(file)
    }

    /// Like `read`, but a corrupted file counts as empty.
    fn read_or_reset(&self) -> Result<KeyStoreFile, StoreError> {
        match self.read() {
            Err(StoreError::Corrupted(reason)) => {
                warn!(path = %self.path().display(), %reason, "discarding unreadable key store");
                Ok(KeyStoreFile {
                    version: FILE_FORMAT_VERSION,
                    records: BTreeMap::new(),
                })
            }
            other => other,
        }
    }

    fn write(&self, file: &KeyStoreFile) -> Result<(), StoreError> {
        if file.records.is_empty() {
            return self.storage.remove();
        }
        let data = Zeroizing::new(
            serde_json::to_vec_pretty(file)
                .map_err(|e| StoreError::Corrupted(format!("unserializable key store: {e}")))?,
        );
        self.storage.save(&data)
    }
}

impl LocalKeyStore for FileKeyStore {
    fn get(&self, name: &str) -> Result<Option<StoredValue>, StoreError> {
        let file = self.read()?;
        file.records
            .get(name)
            .map(|record| {
                record
                    .restore()
                    .map_err(|e| StoreError::Corrupted(format!("record '{name}': {e}")))
            })
            .transpose()
    }

    fn put(&mut self, name: &str, value: StoredValue) -> Result<(), StoreError> {
        self.put_many(vec![(name, value)])
    }

    fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        self.delete_many(&[name])
    }

    fn put_many(&mut self, entries: Vec<(&str, StoredValue)>) -> Result<(), StoreError> {
        let mut file = self.read_or_reset()?;
        for (name, value) in &entries {
            file.records
                .insert((*name).to_string(), PersistedRecord::from(value));
        }
        self.write(&file)
    }

    fn delete_many(&mut self, names: &[&str]) -> Result<(), StoreError> {
        let mut file = self.read_or_reset()?;
        for name in names {
            file.records.remove(*name);
        }
        self.write(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{MasterKey, SeededRandom, wrap};
    use tempfile::tempdir;

    fn pair(rng: &SeededRandom) -> (DeviceKek, WrappedKey, MasterKey) {
        let kek = DeviceKek::generate(rng).unwrap();
        let master = MasterKey::generate(rng).unwrap();
        let wrapped = wrap(&master, &kek, rng).unwrap();
        (kek, wrapped, master)
    }

    /// Accepts everything except writes to one record name.
    struct RejectingStore {
        inner: MemoryKeyStore,
        reject: &'static str,
    }

    impl LocalKeyStore for RejectingStore {
        fn get(&self, name: &str) -> Result<Option<StoredValue>, StoreError> {
            self.inner.get(name)
        }

        fn put(&mut self, name: &str, value: StoredValue) -> Result<(), StoreError> {
            if name == self.reject {
                return Err(StoreError::WriteRejected(name.to_string()));
            }
            self.inner.put(name, value)
        }

        fn delete(&mut self, name: &str) -> Result<(), StoreError> {
            self.inner.delete(name)
        }
    }

    #[test]
    fn memory_store_put_get_delete() {
        let rng = SeededRandom::new([1u8; 32]);
        let (_, wrapped, _) = pair(&rng);
        let mut store = MemoryKeyStore::new();

        store
            .put(DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped.clone()))
            .unwrap();
        match store.get(DEVICE_ENVELOPE).unwrap() {
            Some(StoredValue::WrappedKey(w)) => assert_eq!(w, wrapped),
            other => panic!("expected wrapped key, got: {other:?}"),
        }

        store.delete(DEVICE_ENVELOPE).unwrap();
        assert!(store.get(DEVICE_ENVELOPE).unwrap().is_none());
    }

    #[test]
    fn default_put_many_rolls_back_on_failure() {
        let rng = SeededRandom::new([2u8; 32]);
        let (kek, wrapped, _) = pair(&rng);
        let mut store = RejectingStore {
            inner: MemoryKeyStore::new(),
            reject: DEVICE_ENVELOPE,
        };

        let result = store.put_many(vec![
            (DEVICE_KEK, StoredValue::DeviceKek(kek)),
            (DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped)),
        ]);

        assert!(matches!(result, Err(StoreError::WriteRejected(_))));
        assert!(store.inner.is_empty(), "half pair left behind");
    }

    #[test]
    fn default_put_many_restores_previous_values() {
        let rng = SeededRandom::new([3u8; 32]);
        let (old_kek, _, _) = pair(&rng);
        let (new_kek, wrapped, _) = pair(&rng);
        let mut store = RejectingStore {
            inner: MemoryKeyStore::new(),
            reject: DEVICE_ENVELOPE,
        };
        store
            .inner
            .put(DEVICE_KEK, StoredValue::DeviceKek(old_kek.clone()))
            .unwrap();

        let _ = store.put_many(vec![
            (DEVICE_KEK, StoredValue::DeviceKek(new_kek)),
            (DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped)),
        ]);

        match store.inner.get(DEVICE_KEK).unwrap() {
            Some(StoredValue::DeviceKek(k)) => {
                assert_eq!(k.persisted_bytes(), old_kek.persisted_bytes())
            }
            other => panic!("expected old device kek, got: {other:?}"),
        }
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        let rng = SeededRandom::new([4u8; 32]);
        let (kek, wrapped, master) = pair(&rng);

        let mut store = FileKeyStore::new(path.clone());
        store
            .put_many(vec![
                (DEVICE_KEK, StoredValue::DeviceKek(kek)),
                (DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped)),
            ])
            .unwrap();

        let reopened = FileKeyStore::new(path);
        let Some(StoredValue::DeviceKek(kek)) = reopened.get(DEVICE_KEK).unwrap() else {
            panic!("device kek missing after reopen");
        };
        let Some(StoredValue::WrappedKey(wrapped)) = reopened.get(DEVICE_ENVELOPE).unwrap() else {
            panic!("device envelope missing after reopen");
        };

        let unwrapped: MasterKey = wrapped.unwrap(&kek).unwrap();
        assert_eq!(unwrapped, master);
    }

    #[test]
    fn file_store_delete_many_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        let rng = SeededRandom::new([5u8; 32]);
        let (kek, wrapped, _) = pair(&rng);

        let mut store = FileKeyStore::new(path.clone());
        store
            .put_many(vec![
                (DEVICE_KEK, StoredValue::DeviceKek(kek)),
                (DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped)),
            ])
            .unwrap();
        store.delete_many(&[DEVICE_KEK, DEVICE_ENVELOPE]).unwrap();

        assert!(!path.exists());
        assert!(store.get(DEVICE_KEK).unwrap().is_none());
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = FileKeyStore::new(path);
        assert!(matches!(
            store.get(DEVICE_KEK),
            Err(StoreError::Corrupted(_))
        ));
    }

    #[test]
    fn put_many_replaces_unreadable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(&path, b"{ truncated").unwrap();
        let rng = SeededRandom::new([6u8; 32]);
        let (kek, wrapped, master) = pair(&rng);

        let mut store = FileKeyStore::new(path);
        store
            .put_many(vec![
                (DEVICE_KEK, StoredValue::DeviceKek(kek)),
                (DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped)),
            ])
            .unwrap();

        let Some(StoredValue::DeviceKek(kek)) = store.get(DEVICE_KEK).unwrap() else {
            panic!("device kek missing after rewrite");
        };
        let Some(StoredValue::WrappedKey(wrapped)) = store.get(DEVICE_ENVELOPE).unwrap() else {
            panic!("device envelope missing after rewrite");
        };
        let unwrapped: MasterKey = wrapped.unwrap(&kek).unwrap();
        assert_eq!(unwrapped, master);
    }

    #[test]
    fn put_many_replaces_unknown_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(&path, r#"{"version":99,"records":{}}"#).unwrap();
        let rng = SeededRandom::new([7u8; 32]);
        let (kek, _, _) = pair(&rng);

        let mut store = FileKeyStore::new(path);
        assert!(matches!(store.get(DEVICE_KEK), Err(StoreError::Corrupted(_))));

        store.put(DEVICE_KEK, StoredValue::DeviceKek(kek)).unwrap();
        assert!(matches!(
            store.get(DEVICE_KEK).unwrap(),
            Some(StoredValue::DeviceKek(_))
        ));
    }

    #[test]
    fn delete_many_removes_unreadable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(&path, b"{ truncated").unwrap();

        let mut store = FileKeyStore::new(path.clone());
        store.delete_many(&[DEVICE_KEK, DEVICE_ENVELOPE]).unwrap();

        assert!(!path.exists());
        assert!(store.get(DEVICE_KEK).unwrap().is_none());
    }

    #[test]
    fn default_put_many_rejected_first_write_leaves_nothing() {
        let rng = SeededRandom::new([8u8; 32]);
        let (kek, wrapped, _) = pair(&rng);
        let mut store = RejectingStore {
            inner: MemoryKeyStore::new(),
            reject: DEVICE_KEK,
        };

        let result = store.put_many(vec![
            (DEVICE_KEK, StoredValue::DeviceKek(kek)),
            (DEVICE_ENVELOPE, StoredValue::WrappedKey(wrapped)),
        ]);

        assert!(matches!(result, Err(StoreError::WriteRejected(_))));
        assert!(store.inner.is_empty());
    }

    #[test]
    fn file_store_rejects_truncated_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("device-keys.json");
        std::fs::write(
            &path,
            r#"{"version":1,"records":{"KEK_device":{"type":"deviceKek","key":"AAAA"}}}"#,
        )
        .unwrap();

        let store = FileKeyStore::new(path);
        assert!(matches!(
            store.get(DEVICE_KEK),
            Err(StoreError::Corrupted(_))
        ));
    }
}
