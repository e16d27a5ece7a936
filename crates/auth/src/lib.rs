//! Credential enrollment and master-key wrapping for the Coffer vault.
//!
//! The auth store is an unencrypted SQLite file. Each enrolled
//! credential (password, paper key, fido2 hmac-secret) derives a
//! 32-byte wrapping key and holds its own sealed copy of the one
//! immutable master key, so any single factor can recover it and
//! factors can be added or removed independently.

pub mod crypto;
pub mod error;
pub mod fido2;
pub mod mock;
pub mod paperkey;
pub mod password;
pub mod record;
pub mod store;

pub use crypto::{KdfParams, SecretKey, derive_key, open, seal};
pub use error::{Error, Result};
pub use fido2::{CancelToken, Credential, Device, Fido2Driver, HmacSecret};
pub use paperkey::PAPERKEY_ID;
pub use password::PASSWORD_ID;
pub use record::{AuthRecord, AuthType};
pub use store::AuthStore;
