use crate::crypto::SecretKey;
use crate::error::Result;
use crate::password::{derive_record, recover_derived};
use crate::record::{AuthRecord, AuthType};
use crate::store::AuthStore;

/// Record id for the paper-key credential. At most one exists.
pub const PAPERKEY_ID: &str = "paperkey";

// A paper key is a high-entropy transcribable string. It goes through
// the same derivation as a password; only the id and type differ.
impl AuthStore {
    /// Enrolls (or replaces) the paper-key credential wrapping
    /// `master_key`.
    ///
    /// # Errors
    /// Returns a KDF, crypto, or database error.
    pub fn register_paper_key(&mut self, paper_key: &str, master_key: &SecretKey) -> Result<AuthRecord> {
        let record = derive_record(PAPERKEY_ID, AuthType::PaperKey, paper_key, master_key)?;
        self.set(&record)?;
        Ok(record)
    }

    /// Recovers the master key from the enrolled paper-key credential.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidAuth`] when no paper key is
    /// enrolled or the paper key is wrong.
    pub fn recover_paper_key(&self, paper_key: &str) -> Result<(AuthRecord, SecretKey)> {
        recover_derived(self, AuthType::PaperKey, paper_key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_paper_key_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AuthStore::open(dir.path().join("auth.db"), None).unwrap();

        let mk = SecretKey::generate();
        let record = store
            .register_paper_key("chill pencil wool kite snow brick", &mk)
            .unwrap();
        assert_eq!(record.id, PAPERKEY_ID);

        let (_, recovered) = store.recover_paper_key("chill pencil wool kite snow brick").unwrap();
        assert_eq!(recovered, mk);
        assert!(matches!(
            store.recover_paper_key("wrong words entirely"),
            Err(Error::InvalidAuth)
        ));
    }

    #[test]
    fn test_password_and_paper_key_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AuthStore::open(dir.path().join("auth.db"), None).unwrap();

        let mk = SecretKey::generate();
        store.register_password("testpassword", &mk).unwrap();
        store.register_paper_key("chill pencil wool kite", &mk).unwrap();

        let mut ids: Vec<_> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["paperkey", "password"]);

        let (_, from_password) = store.recover_password("testpassword").unwrap();
        let (_, from_paper) = store.recover_paper_key("chill pencil wool kite").unwrap();
        assert_eq!(from_password, from_paper);
        assert_eq!(from_password, mk);
    }
}
