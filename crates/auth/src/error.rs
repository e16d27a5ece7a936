use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by credential enrollment and recovery.
///
/// `InvalidAuth` deliberately covers every way a credential can fail to
/// recover the master key, so callers cannot tell a wrong secret apart
/// from a tampered record.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid auth")]
    InvalidAuth,

    #[error("unrecognized auth type {0:?}")]
    UnknownType(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("encryption failed: {0}")]
    Crypto(String),

    #[error("fido2 device: {0}")]
    Device(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
