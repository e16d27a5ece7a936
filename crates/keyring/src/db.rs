use std::path::Path;

use coffer_auth::SecretKey;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::debug;

use crate::error::{Error, Result};
use crate::key::{Key, decode_labels, encode_labels};

/// SQLCipher page size of the vault file.
const PAGE_SIZE: u32 = 4096;

/// Handle on the page-encrypted vault file.
///
/// The file only decrypts under the master key it was created with; a
/// wrong key surfaces as a `NotADatabase` engine error on the first
/// statement that touches a page.
pub(crate) struct VaultDb {
    conn: Connection,
}

impl VaultDb {
    /// Opens (or creates) the vault file, keying the engine before any
    /// other statement runs.
    pub fn open(path: &Path, master_key: &SecretKey) -> Result<Self> {
        let conn = Connection::open(path)?;
        let key_hex = hex::encode(master_key.as_bytes());
        run_pragma(&conn, &format!("PRAGMA key = \"x'{key_hex}'\""))?;
        run_pragma(&conn, &format!("PRAGMA cipher_page_size = {PAGE_SIZE}"))?;
        Ok(Self { conn })
    }

    pub fn init_tables(&self) -> Result<()> {
        debug!("initializing vault tables");
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS keys (
                id TEXT PRIMARY KEY NOT NULL,
                type TEXT NOT NULL,
                private BLOB,
                public BLOB,
                createdAt INTEGER,
                updatedAt INTEGER,
                notes TEXT,
                labels TEXT,
                ext JSON
            );
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }

    pub fn set(&mut self, key: &Key) -> Result<()> {
        let ext = key.ext.as_ref().map(serde_json::to_string).transpose()?;
        transact(&mut self.conn, |tx| {
            debug!(id = %key.id, "saving key");
            tx.execute(
                "INSERT OR REPLACE INTO keys (id, type, private, public, createdAt, updatedAt, notes, labels, ext)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key.id,
                    key.key_type,
                    key.private,
                    key.public,
                    key.created_at,
                    key.updated_at,
                    key.notes,
                    encode_labels(&key.labels),
                    ext,
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::EmptyId);
        }
        transact(&mut self.conn, |tx| {
            debug!(%id, "deleting key");
            tx.execute("DELETE FROM keys WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Key>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, type, private, public, createdAt, updatedAt, notes, labels, ext
                 FROM keys WHERE id = ?1",
                params![id],
                raw_key_row,
            )
            .optional()?;
        row.map(RawKey::into_key).transpose()
    }

    pub fn list(&self) -> Result<Vec<Key>> {
        self.select_keys(
            "SELECT id, type, private, public, createdAt, updatedAt, notes, labels, ext
             FROM keys ORDER BY id",
            &[],
        )
    }

    pub fn list_by_type(&self, key_type: &str) -> Result<Vec<Key>> {
        self.select_keys(
            "SELECT id, type, private, public, createdAt, updatedAt, notes, labels, ext
             FROM keys WHERE type = ?1 ORDER BY id",
            &[key_type],
        )
    }

    pub fn list_by_label(&self, label: &str) -> Result<Vec<Key>> {
        debug!(%label, "get keys with label");
        let pattern = format!("%^{label}$%");
        self.select_keys(
            "SELECT id, type, private, public, createdAt, updatedAt, notes, labels, ext
             FROM keys WHERE labels LIKE ?1 ORDER BY id",
            &[pattern.as_str()],
        )
    }

    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        transact(&mut self.conn, |tx| {
            tx.execute(
                "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(value)
    }

    fn select_keys(&self, sql: &str, args: &[&str]) -> Result<Vec<Key>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), raw_key_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_key()?);
        }
        Ok(out)
    }
}

// PRAGMA statements may or may not return a row depending on the
// engine; drain whatever comes back instead of assuming.
fn run_pragma(conn: &Connection, sql: &str) -> Result<()> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}

/// Runs `f` inside a transaction, committing on success. Rolls back on
/// error and on panic, then lets the panic continue.
fn transact<T>(conn: &mut Connection, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
    let tx = conn.transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

// Column values as stored; JSON parsing happens outside the row mapper
// so failures surface as crate errors.
struct RawKey {
    id: String,
    key_type: String,
    private: Option<Vec<u8>>,
    public: Option<Vec<u8>>,
    created_at: i64,
    updated_at: i64,
    notes: String,
    labels: String,
    ext: Option<String>,
}

fn raw_key_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawKey> {
    Ok(RawKey {
        id: r.get(0)?,
        key_type: r.get(1)?,
        private: r.get(2)?,
        public: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
        notes: r.get(6)?,
        labels: r.get(7)?,
        ext: r.get(8)?,
    })
}

impl RawKey {
    fn into_key(self) -> Result<Key> {
        let ext = match self.ext {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(Key {
            id: self.id,
            key_type: self.key_type,
            private: self.private,
            public: self.public,
            created_at: self.created_at,
            updated_at: self.updated_at,
            notes: self.notes,
            labels: decode_labels(&self.labels),
            ext,
        })
    }
}
