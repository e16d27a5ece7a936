//! An encrypted key vault unlocked by interchangeable factors.
//!
//! Two files back a [`Keyring`]: an unencrypted auth store holding the
//! enrolled credentials (each wrapping the same master key) and a
//! page-encrypted vault file holding the keys themselves, keyed by that
//! master key. Recovering the master key through any one factor unlocks
//! the vault; the key never touches disk in plaintext.

mod db;
pub mod error;
mod fido2;
pub mod key;
mod paperkey;
mod password;

pub use coffer_auth as auth;
pub use coffer_auth::{
    AuthRecord, AuthStore, AuthType, CancelToken, Device, Fido2Driver, HmacSecret, SecretKey,
};
pub use error::{Error, Result};
pub use key::{Key, now_ms};

use std::fs;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use tracing::debug;

use crate::db::VaultDb;

/// Where a keyring is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The vault file does not exist yet.
    SetupNeeded,
    /// The vault file exists but is not open.
    Locked,
    /// The vault file is open.
    Unlocked,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::SetupNeeded => "setup-needed",
            Status::Locked => "locked",
            Status::Unlocked => "unlocked",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The vault orchestrator.
///
/// Owns the auth store and, while unlocked, the open vault file. The
/// master key is retained between unlock and lock and wiped on lock
/// and on drop.
pub struct Keyring {
    path: PathBuf,
    db: Option<VaultDb>,
    pub(crate) auth: AuthStore,
    pub(crate) driver: Option<Box<dyn Fido2Driver>>,
    pub(crate) mk: Option<SecretKey>,
}

impl Keyring {
    /// Creates a keyring over the vault file at `path`, taking
    /// ownership of the auth store. Does not touch the filesystem.
    ///
    /// # Errors
    /// Reserved; the current implementation cannot fail.
    pub fn new(path: impl Into<PathBuf>, auth: AuthStore) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            db: None,
            auth,
            driver: None,
            mk: None,
        })
    }

    /// The owned auth store.
    #[must_use]
    pub const fn auth(&self) -> &AuthStore {
        &self.auth
    }

    /// Mutable access to the owned auth store, for enrollment
    /// management.
    pub fn auth_mut(&mut self) -> &mut AuthStore {
        &mut self.auth
    }

    /// Current lifecycle state, derived from the file and the handle.
    #[must_use]
    pub fn status(&self) -> Status {
        if !self.path.exists() {
            return Status::SetupNeeded;
        }
        if self.db.is_none() {
            return Status::Locked;
        }
        Status::Unlocked
    }

    /// Creates the vault file encrypted under `mk` and leaves it open.
    ///
    /// A partially created file is removed on failure.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyUnlocked`] if a vault is open and
    /// [`Error::AlreadySetup`] if the file already exists.
    pub fn setup(&mut self, mk: &SecretKey) -> Result<()> {
        debug!("setup");
        if self.db.is_some() {
            return Err(Error::AlreadyUnlocked);
        }
        if self.path.exists() {
            return Err(Error::AlreadySetup);
        }

        let db = match VaultDb::open(&self.path, mk) {
            Ok(db) => db,
            Err(err) => {
                let _ = fs::remove_file(&self.path);
                return Err(err);
            }
        };
        if let Err(err) = db.init_tables() {
            let _ = db.close();
            let _ = fs::remove_file(&self.path);
            return Err(err);
        }

        self.db = Some(db);
        self.mk = Some(mk.clone());
        debug!("setup complete");
        Ok(())
    }

    /// Opens the vault file with `mk`. A no-op when already unlocked.
    ///
    /// Tables are (re)created if missing, which repairs a vault whose
    /// setup was interrupted after file creation.
    ///
    /// # Errors
    /// Returns [`Error::SetupNeeded`] when the file does not exist and
    /// [`Error::InvalidAuth`] when the engine rejects the key.
    pub fn unlock(&mut self, mk: &SecretKey) -> Result<()> {
        debug!("unlock");
        if self.db.is_some() {
            debug!("already unlocked");
            return Ok(());
        }
        if !self.path.exists() {
            return Err(Error::SetupNeeded);
        }

        let db = VaultDb::open(&self.path, mk).and_then(|db| {
            db.init_tables()?;
            Ok(db)
        });
        let db = match db {
            Ok(db) => db,
            Err(Error::Sqlite(rusqlite::Error::SqliteFailure(e, _))) if e.code == ErrorCode::NotADatabase => {
                return Err(Error::InvalidAuth);
            }
            Err(err) => return Err(err),
        };

        self.db = Some(db);
        self.mk = Some(mk.clone());
        debug!("unlocked");
        Ok(())
    }

    /// Closes the vault file and wipes the retained master key. A
    /// no-op when already locked.
    ///
    /// # Errors
    /// Returns a database error if the file fails to close.
    pub fn lock(&mut self) -> Result<()> {
        debug!("locking");
        self.mk = None;
        let Some(db) = self.db.take() else {
            debug!("already locked");
            return Ok(());
        };
        db.close()?;
        Ok(())
    }

    /// The master key retained since the last successful setup or
    /// unlock, if any.
    #[must_use]
    pub fn master_key(&self) -> Option<&SecretKey> {
        self.mk.as_ref()
    }

    /// Destroys the vault and every enrollment.
    ///
    /// # Errors
    /// Always returns [`Error::NotImplemented`].
    pub fn reset(&mut self) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /// Stores a key, replacing any existing key with the same id.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn set(&mut self, key: &Key) -> Result<()> {
        self.db.as_mut().ok_or(Error::Locked)?.set(key)
    }

    /// Deletes a key by id.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked and [`Error::EmptyId`]
    /// for an empty id.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.db.as_mut().ok_or(Error::Locked)?.remove(id)
    }

    /// Looks up a key by id; `None` when absent.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn get(&self, id: &str) -> Result<Option<Key>> {
        self.db.as_ref().ok_or(Error::Locked)?.get(id)
    }

    /// Looks up a key by id, failing when absent.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] when no key has this id.
    pub fn get_or_fail(&self, id: &str) -> Result<Key> {
        self.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// All keys, ordered by id.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn list(&self) -> Result<Vec<Key>> {
        self.db.as_ref().ok_or(Error::Locked)?.list()
    }

    /// Keys of one type, ordered by id.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn list_by_type(&self, key_type: &str) -> Result<Vec<Key>> {
        self.db.as_ref().ok_or(Error::Locked)?.list_by_type(key_type)
    }

    /// Keys whose label set contains `label`, matched at label
    /// boundaries.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn list_by_label(&self, label: &str) -> Result<Vec<Key>> {
        self.db.as_ref().ok_or(Error::Locked)?.list_by_label(label)
    }

    /// The single key carrying `label`; `None` when there is none.
    ///
    /// # Errors
    /// Returns [`Error::AmbiguousLabel`] when several keys carry it.
    pub fn get_by_label(&self, label: &str) -> Result<Option<Key>> {
        let mut keys = self.list_by_label(label)?;
        match keys.len() {
            0 => Ok(None),
            1 => Ok(keys.pop()),
            _ => Err(Error::AmbiguousLabel(label.to_string())),
        }
    }

    /// Sets a vault config value; last write wins.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.db.as_mut().ok_or(Error::Locked)?.set_config(key, value)
    }

    /// Reads a vault config value; `None` when absent.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] unless unlocked.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.db.as_ref().ok_or(Error::Locked)?.get_config(key)
    }
}
