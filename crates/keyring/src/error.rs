use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the keyring.
#[derive(Debug, Error)]
pub enum Error {
    #[error("keyring is locked")]
    Locked,

    #[error("setup needed")]
    SetupNeeded,

    #[error("already setup")]
    AlreadySetup,

    #[error("already unlocked")]
    AlreadyUnlocked,

    #[error("invalid auth")]
    InvalidAuth,

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("multiple keys for label {0:?}")]
    AmbiguousLabel(String),

    #[error("no fido2 driver set")]
    NoFido2Driver,

    #[error("not implemented")]
    NotImplemented,

    #[error("empty id")]
    EmptyId,

    #[error(transparent)]
    Auth(coffer_auth::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Invalid credentials and undecryptable records collapse into one kind
// so callers cannot tell which stage rejected them.
impl From<coffer_auth::Error> for Error {
    fn from(err: coffer_auth::Error) -> Self {
        match err {
            coffer_auth::Error::InvalidAuth => Error::InvalidAuth,
            other => Error::Auth(other),
        }
    }
}
