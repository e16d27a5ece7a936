//! In-memory fido2 driver for tests and examples.
//!
//! Assertions are deterministic: the secret for a `(credential id,
//! salt)` pair is an HMAC under a key derived from the device path, so
//! a credential enrolled through this driver unlocks again as long as
//! the same device path is present.

use std::sync::Mutex;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::crypto::{self, KEY_LEN, SecretKey};
use crate::error::{Error, Result};
use crate::fido2::{CancelToken, Credential, Device, Fido2Driver};

type HmacSha256 = Hmac<Sha256>;

pub struct MockDriver {
    devices: Vec<Device>,
    issued: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockDriver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Simulates plugging in an authenticator at `path`.
    pub fn add_device(&mut self, path: &str) {
        self.devices.push(Device {
            path: path.to_string(),
            product: "Mock Authenticator".to_string(),
            vendor: "mock".to_string(),
            manufacturer: "Coffer".to_string(),
        });
    }

    fn require_device(&self, path: &str) -> Result<()> {
        if self.devices.iter().any(|d| d.path == path) {
            Ok(())
        } else {
            Err(Error::Device(format!("no device at {path}")))
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn device_key(path: &str) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"mock-device-key");
    hasher.update(path.as_bytes());
    hasher.finalize().into()
}

fn check_cancelled(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

impl Fido2Driver for MockDriver {
    fn devices(&self, cancel: &CancelToken) -> Result<Vec<Device>> {
        check_cancelled(cancel)?;
        Ok(self.devices.clone())
    }

    fn make_credential(
        &self,
        device: &str,
        _pin: Option<&str>,
        _rp: &str,
        _user: &[u8],
        cancel: &CancelToken,
    ) -> Result<Credential> {
        check_cancelled(cancel)?;
        self.require_device(device)?;
        let id = crypto::rand_bytes(32);
        self.issued
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((device.to_string(), id.clone()));
        Ok(Credential {
            id,
            aaguid: format!("00000000-0000-0000-0000-{:012x}", self.devices.len()),
        })
    }

    fn hmac_secret(
        &self,
        device: &str,
        credential_id: &[u8],
        _pin: Option<&str>,
        salt: &[u8],
        cancel: &CancelToken,
    ) -> Result<SecretKey> {
        check_cancelled(cancel)?;
        self.require_device(device)?;
        let known = self
            .issued
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|(d, id)| d == device && id == credential_id);
        if !known {
            return Err(Error::Device("unknown credential".into()));
        }
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&device_key(device))
            .map_err(|e| Error::Crypto(e.to_string()))?;
        mac.update(credential_id);
        mac.update(salt);
        let out: [u8; KEY_LEN] = mac.finalize().into_bytes().into();
        Ok(SecretKey::from_bytes(out))
    }
}
