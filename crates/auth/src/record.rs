use std::fmt;
use std::str::FromStr;

use time::OffsetDateTime;

use crate::crypto::KdfParams;
use crate::error::Error;

/// The kind of credential backing an enrolled record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    Password,
    PaperKey,
    Fido2HmacSecret,
}

impl AuthType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuthType::Password => "password",
            AuthType::PaperKey => "paperkey",
            AuthType::Fido2HmacSecret => "fido2-hmac-secret",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(AuthType::Password),
            "paperkey" => Ok(AuthType::PaperKey),
            "fido2-hmac-secret" => Ok(AuthType::Fido2HmacSecret),
            _ => Err(Error::UnknownType(s.to_string())),
        }
    }
}

/// One enrolled credential.
///
/// `ek` is the master key sealed under this credential's wrapping key.
/// Password and paper-key records use a fixed id so at most one of each
/// can exist; fido2 records are keyed by credential id, so several
/// devices can be enrolled side by side.
#[derive(Clone, Debug)]
pub struct AuthRecord {
    pub id: String,
    pub auth_type: AuthType,
    pub ek: Vec<u8>,
    /// KDF salt for derived factors, hmac-secret salt for fido2.
    pub salt: Option<Vec<u8>>,
    /// Cost parameters used when `salt` feeds a KDF; None for fido2.
    pub kdf: Option<KdfParams>,
    pub aaguid: Option<String>,
    pub nopin: bool,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_auth_type_str_roundtrip() {
        for t in [AuthType::Password, AuthType::PaperKey, AuthType::Fido2HmacSecret] {
            assert_eq!(t.as_str().parse::<AuthType>().unwrap(), t);
        }
    }

    #[test]
    fn test_auth_type_unknown() {
        let err = "pgp-words".parse::<AuthType>().unwrap_err();
        assert!(matches!(err, Error::UnknownType(_)));
    }
}
