//! Master key lifecycle: register, login, resume without password, logout.

use tracing::{debug, warn};

use crate::crypto::{
    DeviceKek, KdfParams, MasterKey, RandomSource, WrappedKey, derive_kek, generate_salt, wrap,
};
use crate::envelope::RegistrationEnvelope;
use crate::error::{CryptoError, StoreError};
use crate::keystore::{DEVICE_ENVELOPE, DEVICE_KEK, LocalKeyStore, StoredValue};

/// Creates a new master key and wraps it under the password for the server.
///
/// Nothing is kept locally; the caller sends the envelope with the
/// registration request. Any failure happens before an envelope exists.
pub fn register<R: RandomSource>(
    password: &str,
    kdf: KdfParams,
    rng: &R,
) -> Result<RegistrationEnvelope, CryptoError> {
    let master = MasterKey::generate(rng)?;
    let salt = generate_salt(rng)?;
    let kek = derive_kek(password, &salt, &kdf)?;
    let wrapped = wrap(&master, &kek, rng)?;

    debug!(iterations = kdf.iterations(), "registration envelope created");
    Ok(RegistrationEnvelope::new(&wrapped, &salt, kdf))
}

/// Unlocks the master key from the server envelope and pairs this device.
///
/// On a wrong password nothing is persisted and
/// [`CryptoError::InvalidCredentials`] is returned. On success a fresh device
/// KEK and the master key wrapped under it are written as one unit.
pub fn login<S, R>(
    password: &str,
    envelope: &RegistrationEnvelope,
    store: &mut S,
    rng: &R,
) -> Result<MasterKey, CryptoError>
where
    S: LocalKeyStore + ?Sized,
    R: RandomSource,
{
    let (wrapped, salt) = envelope.decode()?;
    let kek = derive_kek(password, &salt, &envelope.kdf)?;
    let master: MasterKey = wrapped
        .unwrap(&kek)
        .map_err(|_| CryptoError::InvalidCredentials)?;

    let device = DeviceKek::generate(rng)?;
    let device_wrapped = wrap(&master, &device, rng)?;

    store
        .put_many(vec![
            (DEVICE_KEK, StoredValue::DeviceKek(device)),
            (DEVICE_ENVELOPE, StoredValue::WrappedKey(device_wrapped)),
        ])
        .map_err(CryptoError::PartialPersistence)?;

    debug!("login succeeded, device key pair stored");
    Ok(master)
}

/// Unlocks the master key from device storage, without the password.
///
/// A missing, half written or unreadable pair reports
/// [`CryptoError::DeviceKeyMissing`]; the caller falls back to login, which
/// writes a fresh pair.
pub fn resume_without_password<S>(store: &S) -> Result<MasterKey, CryptoError>
where
    S: LocalKeyStore + ?Sized,
{
    let (device, wrapped) = match read_device_pair(store) {
        Ok(Some(pair)) => pair,
        Ok(None) => {
            debug!("device key pair incomplete");
            return Err(CryptoError::DeviceKeyMissing);
        }
        Err(StoreError::Corrupted(reason)) => {
            warn!(%reason, "device key pair unreadable");
            return Err(CryptoError::DeviceKeyMissing);
        }
        Err(e) => return Err(e.into()),
    };

    let master = wrapped
        .unwrap(&device)
        .map_err(|_| CryptoError::DeviceKeyMismatch)?;

    debug!("session resumed from device key pair");
    Ok(master)
}

fn read_device_pair<S>(store: &S) -> Result<Option<(DeviceKek, WrappedKey)>, StoreError>
where
    S: LocalKeyStore + ?Sized,
{
    let (Some(kek), Some(envelope)) = (store.get(DEVICE_KEK)?, store.get(DEVICE_ENVELOPE)?) else {
        return Ok(None);
    };

    let StoredValue::DeviceKek(device) = kek else {
        return Err(StoreError::Corrupted(format!("'{DEVICE_KEK}' holds a wrapped key")));
    };
    let StoredValue::WrappedKey(wrapped) = envelope else {
        return Err(StoreError::Corrupted(format!("'{DEVICE_ENVELOPE}' holds a device key")));
    };
    Ok(Some((device, wrapped)))
}

/// Forgets the device pair. The caller drops its master key.
pub fn logout<S>(store: &mut S) -> Result<(), CryptoError>
where
    S: LocalKeyStore + ?Sized,
{
    store.delete_many(&[DEVICE_KEK, DEVICE_ENVELOPE])?;
    debug!("device key pair cleared");
    Ok(())
}
