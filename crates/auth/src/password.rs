use time::OffsetDateTime;
use tracing::debug;

use crate::crypto::{self, KdfParams, SecretKey};
use crate::error::{Error, Result};
use crate::record::{AuthRecord, AuthType};
use crate::store::AuthStore;

/// Record id for the password credential. At most one exists.
pub const PASSWORD_ID: &str = "password";

impl AuthStore {
    /// Enrolls (or replaces) the password credential wrapping
    /// `master_key`.
    ///
    /// # Errors
    /// Returns a KDF, crypto, or database error.
    pub fn register_password(&mut self, password: &str, master_key: &SecretKey) -> Result<AuthRecord> {
        let record = derive_record(PASSWORD_ID, AuthType::Password, password, master_key)?;
        self.set(&record)?;
        Ok(record)
    }

    /// Recovers the master key from the enrolled password credential.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAuth`] when no password is enrolled or
    /// the password is wrong.
    pub fn recover_password(&self, password: &str) -> Result<(AuthRecord, SecretKey)> {
        recover_derived(self, AuthType::Password, password)
    }
}

// Shared with the paper-key factor, which differs only in id and type.
pub(crate) fn derive_record(
    id: &str,
    auth_type: AuthType,
    secret: &str,
    master_key: &SecretKey,
) -> Result<AuthRecord> {
    let salt = crypto::rand_bytes(16);
    let kdf = KdfParams::default();
    let wk = crypto::derive_key(secret, &salt, &kdf)?;
    let ek = crypto::seal(master_key.as_bytes(), &wk)?;
    Ok(AuthRecord {
        id: id.to_string(),
        auth_type,
        ek,
        salt: Some(salt),
        kdf: Some(kdf),
        aaguid: None,
        nopin: false,
        created_at: OffsetDateTime::now_utc(),
    })
}

pub(crate) fn recover_derived(
    store: &AuthStore,
    auth_type: AuthType,
    secret: &str,
) -> Result<(AuthRecord, SecretKey)> {
    let Some(record) = store.list_by_type(auth_type)?.into_iter().next() else {
        debug!(%auth_type, "no credential enrolled");
        return Err(Error::InvalidAuth);
    };
    let salt = record.salt.as_deref().ok_or(Error::InvalidAuth)?;
    let kdf = record.kdf.clone().unwrap_or_default();
    let wk = crypto::derive_key(secret, salt, &kdf)?;
    let mk = store.unlock(&record, &wk)?;
    Ok((record, mk))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn tmp_store(dir: &tempfile::TempDir) -> AuthStore {
        AuthStore::open(dir.path().join("auth.db"), None).unwrap()
    }

    #[test]
    fn test_register_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = tmp_store(&dir);

        let mk = SecretKey::generate();
        let record = store.register_password("testpassword", &mk).unwrap();
        assert_eq!(record.id, PASSWORD_ID);
        assert_eq!(record.ek.len(), 32 + crypto::SEAL_OVERHEAD);

        let (recovered_record, recovered_mk) = store.recover_password("testpassword").unwrap();
        assert_eq!(recovered_record.id, PASSWORD_ID);
        assert_eq!(recovered_mk, mk);
    }

    #[test]
    fn test_recover_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = tmp_store(&dir);

        store.register_password("testpassword", &SecretKey::generate()).unwrap();
        assert!(matches!(
            store.recover_password("invalidpassword"),
            Err(Error::InvalidAuth)
        ));
    }

    #[test]
    fn test_recover_without_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let store = tmp_store(&dir);
        assert!(matches!(store.recover_password("anything"), Err(Error::InvalidAuth)));
    }

    #[test]
    fn test_reregister_replaces_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = tmp_store(&dir);

        let mk = SecretKey::generate();
        store.register_password("first", &mk).unwrap();
        store.register_password("second", &mk).unwrap();

        assert_eq!(store.list_by_type(AuthType::Password).unwrap().len(), 1);
        assert!(matches!(store.recover_password("first"), Err(Error::InvalidAuth)));
        let (_, recovered) = store.recover_password("second").unwrap();
        assert_eq!(recovered, mk);
    }
}
