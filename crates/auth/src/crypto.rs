use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Length of every key this module produces or consumes.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Bytes added to a plaintext by [`seal`]: the nonce plus the
/// authentication tag.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// 32 bytes of key material, wiped from memory on drop.
///
/// Used for the master key, for per-factor wrapping keys, and for KDF
/// outputs, so intermediate copies never outlive their scope.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Generates a key from the system CSPRNG.
    ///
    /// # Panics
    /// Panics if the operating system fails to produce random bytes.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn generate() -> Self {
        let mut k = [0u8; KEY_LEN];
        getrandom::fill(&mut k).expect("failed to get random bytes");
        Self(k)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Random bytes for salts and nonces.
///
/// # Panics
/// Panics if the operating system fails to produce random bytes.
#[allow(clippy::expect_used)]
#[must_use]
pub fn rand_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    getrandom::fill(&mut out).expect("failed to get random bytes");
    out
}

/// Argon2id cost parameters, persisted next to each derived record so
/// they can be raised later without invalidating old enrollments.
///
/// The salt is not part of this struct; it is stored in its own column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 19456, // ~19MB memory
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// Derives a 32-byte wrapping key from a secret and salt.
///
/// Argon2id, version 0x13. Deterministic for fixed inputs.
///
/// # Errors
/// Returns [`Error::Kdf`] if the parameters are rejected or hashing
/// fails.
pub fn derive_key(secret: &str, salt: &[u8], params: &KdfParams) -> Result<SecretKey> {
    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(KEY_LEN))
            .map_err(|e| Error::Kdf(e.to_string()))?,
    );
    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(secret.as_bytes(), salt, &mut out)
        .map_err(|e| Error::Kdf(e.to_string()))?;
    Ok(SecretKey(out))
}

/// Encrypts `plaintext` under `key` with XChaCha20-Poly1305.
///
/// The returned ciphertext is nonce || ciphertext || tag, so it is
/// self-contained and [`SEAL_OVERHEAD`] bytes longer than the input.
///
/// # Errors
/// Returns [`Error::Crypto`] if encryption fails.
pub fn seal(plaintext: &[u8], key: &SecretKey) -> Result<Vec<u8>> {
    let aead = XChaCha20Poly1305::new((&key.0).into());
    let nonce = rand_bytes(NONCE_LEN);
    let ct = aead
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Crypto("encrypt failed".into()))?;
    let mut out = Vec::with_capacity(nonce.len() + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Decrypts a [`seal`] ciphertext.
///
/// # Errors
/// Returns [`Error::InvalidAuth`] on any authentication failure. A
/// tampered or wrongly keyed ciphertext never yields garbage bytes.
pub fn open(ciphertext: &[u8], key: &SecretKey) -> Result<Vec<u8>> {
    if ciphertext.len() < SEAL_OVERHEAD {
        return Err(Error::InvalidAuth);
    }
    let (nonce, ct) = ciphertext.split_at(NONCE_LEN);
    let aead = XChaCha20Poly1305::new((&key.0).into());
    aead.decrypt(XNonce::from_slice(nonce), ct)
        .map_err(|_| Error::InvalidAuth)
}
