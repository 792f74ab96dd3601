//! Cryptographic primitives built on the `ring` crate.
//!
//! - **Encryption/decryption**: AES-256-GCM authenticated encryption with
//!   randomly generated 96-bit nonces and caller-supplied associated data.
//! - **Key derivation**: HKDF-SHA256 for per-message keys, PBKDF2-HMAC-SHA256
//!   for the device-derived keychain key.
//! - **Hashing and encoding**: SHA-256 and unpadded base64url.
//! - **Random generation**: cryptographically secure random bytes via `ring`.
//!
//! Every failure is reported as an error. There is no fallback to a weaker
//! primitive when the CSPRNG or a digest fails.

use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, hkdf, pbkdf2};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 32;

/// Length of a SHA-256 digest in bytes.
pub const SHA256_LEN: usize = 32;

/// PBKDF2 iteration count, 600,000 per the OWASP 2023 figure for HMAC-SHA256.
const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(600_000) {
    Some(n) => n,
    None => panic!("PBKDF2 iteration count must be non-zero"),
};

/// PBKDF2 algorithm: HMAC-SHA256.
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM using the given 256-bit `key`,
/// authenticating `aad` alongside it.
///
/// Returns `(nonce, ciphertext)` where `nonce` is a randomly generated 96-bit
/// value and `ciphertext` includes the 128-bit authentication tag.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the key length is wrong or
/// `ring` reports a failure.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8],
    aad: &[u8],
) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    if key.len() != KEY_LEN {
        return Err(VaultError::EncryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    fill_random(&mut nonce_bytes).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to generate random nonce".into(),
    })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "encrypted data"
    );

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (which includes the GCM tag) using the given `nonce`,
/// 256-bit `key`, and the same `aad` that was supplied at encryption time.
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the key is wrong, the
/// ciphertext or associated data has been tampered with, or the nonce does
/// not match.
pub fn decrypt(
    nonce: &[u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
    key: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(*nonce));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed: wrong key or corrupted data".into(),
        })?;

    let result = plaintext.to_vec();

    tracing::trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len = result.len(),
        "decrypted data"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from input keying material with HKDF-SHA256.
///
/// `info` segments are concatenated by HKDF and bind the derived key to its
/// purpose.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivationFailed`] if `ring` rejects the
/// expansion.
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[&[u8]]) -> Result<[u8; KEY_LEN]> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    let okm = prk
        .expand(info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "HKDF expand rejected the requested length".into(),
        })?;

    let mut key = [0u8; KEY_LEN];
    okm.fill(&mut key)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "HKDF fill failed".into(),
        })?;
    Ok(key)
}

/// Derive a 256-bit encryption key from a `password` and a known `salt`
/// using PBKDF2-HMAC-SHA256.
pub fn derive_key_with_salt(password: &[u8], salt: &[u8], out: &mut [u8; KEY_LEN]) {
    pbkdf2::derive(PBKDF2_ALG, PBKDF2_ITERATIONS, salt, password, out);
}

// ---------------------------------------------------------------------------
// Hashing and encoding
// ---------------------------------------------------------------------------

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; SHA256_LEN] {
    let hash = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; SHA256_LEN];
    out.copy_from_slice(hash.as_ref());
    out
}

/// Unpadded base64url encoding (`+` → `-`, `/` → `_`, no `=`).
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode unpadded base64url. Trailing `=` padding is tolerated.
///
/// # Errors
///
/// Returns [`VaultError::InvalidEncoding`] for characters outside the
/// base64url alphabet or an impossible length.
pub fn base64url_decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| VaultError::InvalidEncoding {
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| VaultError::RandomFailed)
}

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::RandomFailed`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate `byte_len` random bytes and return them base64url encoded.
///
/// The result only contains `A-Z a-z 0-9 - _` and is safe to place in URLs
/// and OAuth parameters without further escaping.
pub fn random_urlsafe(byte_len: usize) -> Result<String> {
    Ok(base64url_encode(&random_bytes(byte_len)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = random_bytes(KEY_LEN).unwrap();
        let plaintext = b"hello, vaultsync!";

        let (nonce, ciphertext) = encrypt(plaintext, &key, b"header").unwrap();
        let decrypted = decrypt(&nonce, &ciphertext, &key, b"header").unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key1 = random_bytes(KEY_LEN).unwrap();
        let key2 = random_bytes(KEY_LEN).unwrap();

        let (nonce, ciphertext) = encrypt(b"secret data", &key1, &[]).unwrap();
        assert!(decrypt(&nonce, &ciphertext, &key2, &[]).is_err());
    }

    #[test]
    fn decrypt_with_different_aad_fails() {
        let key = random_bytes(KEY_LEN).unwrap();

        let (nonce, ciphertext) = encrypt(b"secret data", &key, b"v1").unwrap();
        assert!(decrypt(&nonce, &ciphertext, &key, b"v2").is_err());
    }

    #[test]
    fn decrypt_with_tampered_ciphertext_fails() {
        let key = random_bytes(KEY_LEN).unwrap();

        let (nonce, mut ciphertext) = encrypt(b"secret data", &key, &[]).unwrap();
        if let Some(byte) = ciphertext.first_mut() {
            *byte ^= 0x01;
        }

        assert!(decrypt(&nonce, &ciphertext, &key, &[]).is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = vec![0u8; 16];
        assert!(encrypt(b"test", &short_key, &[]).is_err());
    }

    #[test]
    fn hkdf_is_deterministic_and_info_bound() {
        let a = hkdf_sha256(b"ikm", b"salt", &[b"purpose-a"]).unwrap();
        let b = hkdf_sha256(b"ikm", b"salt", &[b"purpose-a"]).unwrap();
        let c = hkdf_sha256(b"ikm", b"salt", &[b"purpose-b"]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            base64url_encode(&digest),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn base64url_has_no_padding_or_standard_alphabet() {
        let encoded = base64url_encode(&[0xfb, 0xff, 0xfe]);
        assert_eq!(encoded, "-__-");

        let encoded = base64url_encode(b"a");
        assert_eq!(encoded, "YQ");
    }

    #[test]
    fn base64url_decode_accepts_padding_and_rejects_garbage() {
        assert_eq!(base64url_decode("YQ").unwrap(), b"a");
        assert_eq!(base64url_decode("YQ==").unwrap(), b"a");
        assert!(base64url_decode("not base64!").is_err());
    }

    #[test]
    fn random_urlsafe_uses_url_alphabet() {
        let value = random_urlsafe(64).unwrap();
        // 64 bytes → 86 characters without padding.
        assert_eq!(value.len(), 86);
        assert!(
            value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(value, random_urlsafe(64).unwrap());
    }
}
