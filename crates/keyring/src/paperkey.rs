use coffer_auth::{AuthRecord, SecretKey};

use crate::error::{Error, Result};
use crate::Keyring;

impl Keyring {
    /// Sets up the vault with a fresh master key wrapped by a paper
    /// key.
    ///
    /// # Errors
    /// Returns [`Error::AlreadySetup`] when a vault file exists.
    pub fn setup_paper_key(&mut self, paper_key: &str) -> Result<SecretKey> {
        let mk = SecretKey::generate();
        self.auth_mut().register_paper_key(paper_key, &mk)?;
        self.setup(&mk)?;
        Ok(mk)
    }

    /// Enrolls a paper key as an additional factor. Requires an
    /// unlocked vault.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn register_paper_key(&mut self, paper_key: &str) -> Result<AuthRecord> {
        let mk = self.master_key().cloned().ok_or(Error::Locked)?;
        Ok(self.auth_mut().register_paper_key(paper_key, &mk)?)
    }

    /// Recovers the master key from a paper key and unlocks the vault.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAuth`] for a wrong paper key.
    pub fn unlock_with_paper_key(&mut self, paper_key: &str) -> Result<SecretKey> {
        let (_, mk) = self.auth().recover_paper_key(paper_key)?;
        self.unlock(&mk)?;
        Ok(mk)
    }
}
