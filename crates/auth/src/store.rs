use std::path::Path;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use time::OffsetDateTime;
use tracing::debug;
use zeroize::Zeroize;

use crate::crypto::{self, KEY_LEN, KdfParams, SecretKey};
use crate::error::{Error, Result};
use crate::record::{AuthRecord, AuthType};

/// Config key the client key is persisted under.
const CLIENT_KEY: &str = "clientKey";

/// Unencrypted store of enrolled credentials.
///
/// The file carries no plaintext secrets: each record's `ek` is sealed
/// under its factor's wrapping key, and tampering shows up as an AEAD
/// failure on the next unlock attempt.
pub struct AuthStore {
    conn: Connection,
    client_key: SecretKey,
}

impl AuthStore {
    /// Opens (or creates) the store and initializes its tables.
    ///
    /// A client key already persisted in the `config` table is adopted;
    /// otherwise the provided one, or a freshly generated one, is stored.
    ///
    /// # Errors
    /// Returns a database error if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>, client_key: Option<SecretKey>) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_tables(&conn)?;
        let client_key = init_client_key(&conn, client_key)?;
        Ok(Self { conn, client_key })
    }

    /// The stable per-installation identity key.
    #[must_use]
    pub const fn client_key(&self) -> &SecretKey {
        &self.client_key
    }

    /// Closes the store.
    ///
    /// # Errors
    /// Returns the database error if the connection fails to close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    /// Adds or replaces a credential, keyed by `record.id`.
    ///
    /// # Errors
    /// Returns a database error if the transaction fails.
    pub fn set(&mut self, record: &AuthRecord) -> Result<()> {
        transact(&mut self.conn, |tx| {
            debug!(id = %record.id, "saving auth record");
            set_tx(tx, record)
        })
    }

    /// Deletes a credential by id. Deleting an unknown id is not an
    /// error.
    ///
    /// # Errors
    /// Returns a database error if the transaction fails.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        transact(&mut self.conn, |tx| {
            debug!(%id, "deleting auth record");
            tx.execute("DELETE FROM auth WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    /// All enrolled credentials; empty when none.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub fn list(&self) -> Result<Vec<AuthRecord>> {
        self.select_records("SELECT id, type, ek, salt, kdf, aaguid, nopin, createdAt FROM auth", &[])
    }

    /// Enrolled credentials of one type; empty when none.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub fn list_by_type(&self, auth_type: AuthType) -> Result<Vec<AuthRecord>> {
        self.select_records(
            "SELECT id, type, ek, salt, kdf, aaguid, nopin, createdAt FROM auth WHERE type = ?1",
            &[auth_type.as_str()],
        )
    }

    /// Attempts to recover the master key by opening `record.ek` with a
    /// wrapping key.
    ///
    /// # Errors
    /// Returns [`Error::InvalidAuth`] unless decryption succeeds and
    /// yields exactly 32 bytes.
    pub fn unlock(&self, record: &AuthRecord, wrapping_key: &SecretKey) -> Result<SecretKey> {
        let mut plaintext = crypto::open(&record.ek, wrapping_key).map_err(|_| {
            debug!(id = %record.id, "credential did not decrypt");
            Error::InvalidAuth
        })?;
        if plaintext.len() != KEY_LEN {
            plaintext.zeroize();
            return Err(Error::InvalidAuth);
        }
        let mut mk = [0u8; KEY_LEN];
        mk.copy_from_slice(&plaintext);
        plaintext.zeroize();
        Ok(SecretKey::from_bytes(mk))
    }

    /// Sets a config value; last write wins.
    ///
    /// # Errors
    /// Returns a database error if the transaction fails.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        transact(&mut self.conn, |tx| {
            tx.execute(
                "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Reads a config value, None when absent.
    ///
    /// # Errors
    /// Returns a database error if the query fails.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        get_config(&self.conn, key)
    }

    fn select_records(&self, sql: &str, args: &[&str]) -> Result<Vec<AuthRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), |r| {
            Ok(RawRecord {
                id: r.get(0)?,
                auth_type: r.get(1)?,
                ek: r.get(2)?,
                salt: r.get(3)?,
                kdf: r.get(4)?,
                aaguid: r.get(5)?,
                nopin: r.get(6)?,
                created_at: r.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_record()?);
        }
        Ok(out)
    }
}

// Column values as stored; parsing into crate types happens outside the
// row mapper so failures surface as crate errors, not rusqlite errors.
struct RawRecord {
    id: String,
    auth_type: String,
    ek: Vec<u8>,
    salt: Option<Vec<u8>>,
    kdf: Option<String>,
    aaguid: Option<String>,
    nopin: bool,
    created_at: OffsetDateTime,
}

impl RawRecord {
    fn into_record(self) -> Result<AuthRecord> {
        let kdf = match self.kdf {
            Some(json) => Some(serde_json::from_str::<KdfParams>(&json)?),
            None => None,
        };
        Ok(AuthRecord {
            id: self.id,
            auth_type: AuthType::from_str(&self.auth_type)?,
            ek: self.ek,
            salt: self.salt,
            kdf,
            aaguid: self.aaguid,
            nopin: self.nopin,
            created_at: self.created_at,
        })
    }
}

fn set_tx(tx: &Transaction<'_>, record: &AuthRecord) -> Result<()> {
    let kdf = record.kdf.as_ref().map(serde_json::to_string).transpose()?;
    tx.execute(
        "INSERT OR REPLACE INTO auth (id, type, ek, salt, kdf, aaguid, nopin, createdAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.auth_type.as_str(),
            record.ek,
            record.salt,
            kdf,
            record.aaguid,
            record.nopin,
            record.created_at,
        ],
    )?;
    Ok(())
}

fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS auth (
            id TEXT NOT NULL PRIMARY KEY,
            type TEXT NOT NULL,
            ek BLOB NOT NULL,
            salt BLOB,
            kdf TEXT,
            aaguid TEXT,
            nopin BOOL NOT NULL,
            createdAt TIMESTAMP NOT NULL
        );
        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn init_client_key(conn: &Connection, provided: Option<SecretKey>) -> Result<SecretKey> {
    if let Some(hex_key) = get_config(conn, CLIENT_KEY)? {
        let bytes = hex::decode(&hex_key).map_err(|e| Error::Crypto(e.to_string()))?;
        let arr: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("client key is not 32 bytes".into()))?;
        return Ok(SecretKey::from_bytes(arr));
    }
    let ck = provided.unwrap_or_else(SecretKey::generate);
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
        params![CLIENT_KEY, hex::encode(ck.as_bytes())],
    )?;
    Ok(ck)
}

fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM config WHERE key = ?1", params![key], |r| r.get(0))
        .optional()?;
    Ok(value)
}

/// Runs `f` inside a transaction, committing on success.
///
/// The transaction rolls back when `f` errors and when it panics (the
/// guard is dropped during unwinding before the panic continues).
pub(crate) fn transact<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}
