use coffer_auth::{AuthRecord, SecretKey};

use crate::error::{Error, Result};
use crate::Keyring;

impl Keyring {
    /// Sets up the vault with a fresh master key wrapped by `password`.
    ///
    /// The credential is enrolled first; if setup then fails, the
    /// partially created vault file is removed but the enrollment
    /// stays for the caller to delete.
    ///
    /// # Errors
    /// Returns [`Error::AlreadySetup`] when a vault file exists.
    pub fn setup_password(&mut self, password: &str) -> Result<SecretKey> {
        let mk = SecretKey::generate();
        self.auth_mut().register_password(password, &mk)?;
        self.setup(&mk)?;
        Ok(mk)
    }

    /// Enrolls `password` as an additional factor. Requires an
    /// unlocked vault, which proves knowledge of the master key.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn register_password(&mut self, password: &str) -> Result<AuthRecord> {
        let mk = self.master_key().cloned().ok_or(Error::Locked)?;
        Ok(self.auth_mut().register_password(password, &mk)?)
    }

    /// Recovers the master key from `password` and unlocks the vault.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAuth`] for a wrong password, without
    /// touching the vault file.
    pub fn unlock_with_password(&mut self, password: &str) -> Result<SecretKey> {
        let (_, mk) = self.auth().recover_password(password)?;
        self.unlock(&mk)?;
        Ok(mk)
    }
}
