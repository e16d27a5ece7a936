use coffer_auth::{AuthRecord, CancelToken, Device, Fido2Driver, HmacSecret, SecretKey};

use crate::error::{Error, Result};
use crate::Keyring;

impl Keyring {
    /// Plugs in the fido2 driver. Hardware operations fail with
    /// [`Error::NoFido2Driver`] until one is set.
    pub fn set_fido2_driver(&mut self, driver: Box<dyn Fido2Driver>) {
        self.driver = Some(driver);
    }

    /// The configured driver, if any.
    #[must_use]
    pub fn fido2_driver(&self) -> Option<&dyn Fido2Driver> {
        self.driver.as_deref()
    }

    /// Lists connected authenticators.
    ///
    /// # Errors
    /// Returns [`Error::NoFido2Driver`] when no driver is set.
    pub fn fido2_devices(&self, cancel: &CancelToken) -> Result<Vec<Device>> {
        let driver = self.driver.as_deref().ok_or(Error::NoFido2Driver)?;
        Ok(driver.devices(cancel)?)
    }

    /// Creates an hmac-secret credential on a device. An empty
    /// `device` selects the first connected one.
    ///
    /// # Errors
    /// Returns [`Error::NoFido2Driver`] when no driver is set.
    pub fn generate_hmac_secret(
        &self,
        pin: Option<&str>,
        device: &str,
        rp: &str,
        cancel: &CancelToken,
    ) -> Result<HmacSecret> {
        let driver = self.driver.as_deref().ok_or(Error::NoFido2Driver)?;
        Ok(self.auth.generate_hmac_secret(driver, pin, device, rp, cancel)?)
    }

    /// Sets up the vault with a fresh master key wrapped by a
    /// generated hmac-secret credential. The device must be present.
    ///
    /// # Errors
    /// Returns [`Error::NoFido2Driver`] when no driver is set and
    /// [`Error::AlreadySetup`] when a vault file exists.
    pub fn setup_hmac_secret(
        &mut self,
        hs: &HmacSecret,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<SecretKey> {
        let mk = SecretKey::generate();
        let driver = self.driver.as_deref().ok_or(Error::NoFido2Driver)?;
        self.auth.register_hmac_secret(driver, hs, &mk, pin, cancel)?;
        self.setup(&mk)?;
        Ok(mk)
    }

    /// Enrolls a generated hmac-secret credential as an additional
    /// factor. Requires an unlocked vault.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked and
    /// [`Error::NoFido2Driver`] when no driver is set.
    pub fn register_hmac_secret(
        &mut self,
        hs: &HmacSecret,
        pin: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<AuthRecord> {
        let mk = self.mk.clone().ok_or(Error::Locked)?;
        let driver = self.driver.as_deref().ok_or(Error::NoFido2Driver)?;
        Ok(self.auth.register_hmac_secret(driver, hs, &mk, pin, cancel)?)
    }

    /// Recovers the master key from any enrolled hmac-secret
    /// credential whose device is connected, then unlocks the vault.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAuth`] when no enrolled credential can
    /// be recovered.
    pub fn unlock_with_hmac_secret(&mut self, pin: Option<&str>, cancel: &CancelToken) -> Result<SecretKey> {
        let driver = self.driver.as_deref().ok_or(Error::NoFido2Driver)?;
        let (_, mk) = self.auth.recover_hmac_secret(driver, pin, cancel)?;
        self.unlock(&mk)?;
        Ok(mk)
    }
}
