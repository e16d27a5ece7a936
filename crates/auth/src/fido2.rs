use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tracing::debug;

use crate::crypto::{self, SecretKey};
use crate::error::{Error, Result};
use crate::record::{AuthRecord, AuthType};
use crate::store::AuthStore;

/// Caller-supplied cancellation signal.
///
/// Drivers are expected to poll it while blocked waiting for user
/// presence, which can take seconds.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A connected authenticator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub path: String,
    pub product: String,
    pub vendor: String,
    pub manufacturer: String,
}

/// A credential created on a device.
#[derive(Clone, Debug)]
pub struct Credential {
    pub id: Vec<u8>,
    pub aaguid: String,
}

/// RPC surface of a fido2 driver. Any concrete driver that can
/// enumerate devices, create hmac-secret credentials, and run
/// hmac-secret assertions will do.
pub trait Fido2Driver {
    /// Enumerates connected authenticators.
    ///
    /// # Errors
    /// Returns [`Error::Device`] or [`Error::Cancelled`].
    fn devices(&self, cancel: &CancelToken) -> Result<Vec<Device>>;

    /// Creates an hmac-secret credential on `device` for relying party
    /// `rp` and the given user id.
    ///
    /// # Errors
    /// Returns [`Error::Device`] or [`Error::Cancelled`].
    fn make_credential(
        &self,
        device: &str,
        pin: Option<&str>,
        rp: &str,
        user: &[u8],
        cancel: &CancelToken,
    ) -> Result<Credential>;

    /// Runs an hmac-secret assertion, returning the device-bound
    /// 32-byte secret for `(credential_id, salt)`.
    ///
    /// # Errors
    /// Returns [`Error::Device`] or [`Error::Cancelled`].
    fn hmac_secret(
        &self,
        device: &str,
        credential_id: &[u8],
        pin: Option<&str>,
        salt: &[u8],
        cancel: &CancelToken,
    ) -> Result<SecretKey>;
}

/// Output of credential generation, carried to a later registration.
#[derive(Clone, Debug)]
pub struct HmacSecret {
    pub credential_id: Vec<u8>,
    pub salt: Vec<u8>,
    pub aaguid: String,
    pub rp: String,
    pub no_pin: bool,
}

impl AuthStore {
    /// Creates a new hmac-secret credential on a device.
    ///
    /// An empty `device` selects the first connected one. The store's
    /// client key is the credential's user id, binding the device-side
    /// credential to this installation.
    ///
    /// # Errors
    /// Returns [`Error::Device`] when no device is connected or the
    /// driver fails.
    pub fn generate_hmac_secret(
        &self,
        driver: &dyn Fido2Driver,
        pin: Option<&str>,
        device: &str,
        rp: &str,
        cancel: &CancelToken,
    ) -> Result<HmacSecret> {
        let device = if device.is_empty() {
            let devices = driver.devices(cancel)?;
            let first = devices.first().ok_or_else(|| Error::Device("no devices found".into()))?;
            first.path.clone()
        } else {
            device.to_string()
        };
        let cred = driver.make_credential(&device, pin, rp, self.client_key().as_bytes(), cancel)?;
        debug!(aaguid = %cred.aaguid, "created hmac-secret credential");
        Ok(HmacSecret {
            credential_id: cred.id,
            salt: crypto::rand_bytes(32),
            aaguid: cred.aaguid,
            rp: rp.to_string(),
            no_pin: pin.is_none(),
        })
    }

    /// Enrolls a generated hmac-secret credential wrapping `master_key`.
    ///
    /// The device must be present: an assertion against the stored salt
    /// produces the wrapping key.
    ///
    /// # Errors
    /// Returns [`Error::Device`] when no connected device can complete
    /// the assertion.
    pub fn register_hmac_secret(
        &mut self,
        driver: &dyn Fido2Driver,
        hs: &HmacSecret,
        master_key: &SecretKey,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<AuthRecord> {
        let wk = assert_any_device(driver, &hs.credential_id, pin, &hs.salt, cancel)?;
        let ek = crypto::seal(master_key.as_bytes(), &wk)?;
        let record = AuthRecord {
            id: hex::encode(&hs.credential_id),
            auth_type: AuthType::Fido2HmacSecret,
            ek,
            salt: Some(hs.salt.clone()),
            kdf: None,
            aaguid: Some(hs.aaguid.clone()),
            nopin: hs.no_pin,
            created_at: OffsetDateTime::now_utc(),
        };
        self.set(&record)?;
        Ok(record)
    }

    /// Recovers the master key from any enrolled hmac-secret
    /// credential whose device is connected.
    ///
    /// Every enrolled record is tried against every connected device;
    /// the first assertion whose secret decrypts the record wins.
    /// Absent devices and failed assertions are skipped.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAuth`] when no record can be decrypted.
    pub fn recover_hmac_secret(
        &self,
        driver: &dyn Fido2Driver,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(AuthRecord, SecretKey)> {
        let records = self.list_by_type(AuthType::Fido2HmacSecret)?;
        let devices = driver.devices(cancel)?;
        for record in records {
            let Ok(credential_id) = hex::decode(&record.id) else {
                debug!(id = %record.id, "record id is not a credential id");
                continue;
            };
            let Some(salt) = record.salt.as_deref() else {
                continue;
            };
            for device in &devices {
                let wk = match driver.hmac_secret(&device.path, &credential_id, pin, salt, cancel) {
                    Ok(wk) => wk,
                    Err(err) => {
                        debug!(device = %device.path, %err, "assertion failed");
                        continue;
                    }
                };
                if let Ok(mk) = self.unlock(&record, &wk) {
                    return Ok((record, mk));
                }
            }
        }
        Err(Error::InvalidAuth)
    }
}

fn assert_any_device(
    driver: &dyn Fido2Driver,
    credential_id: &[u8],
    pin: Option<&str>,
    salt: &[u8],
    cancel: &CancelToken,
) -> Result<SecretKey> {
    for device in driver.devices(cancel)? {
        match driver.hmac_secret(&device.path, credential_id, pin, salt, cancel) {
            Ok(wk) => return Ok(wk),
            Err(err) => debug!(device = %device.path, %err, "assertion failed"),
        }
    }
    Err(Error::Device("no connected device produced an hmac-secret".into()))
}
