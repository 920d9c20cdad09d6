//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Cryptographic primitives for the ECP security core.
//!
//! AES-256-GCM for authenticated encryption, PBKDF2-HMAC-SHA256 for password-based
//! key derivation, SHA-256 for content hashing, and an OS CSPRNG for salts and IVs.

use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const SALT_LEN: usize = 32;
pub const GCM_TAG_LEN: usize = 16;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("invalid salt length: {0}, expected {SALT_LEN}")]
    InvalidSaltLength(usize),
    #[error("invalid key length: {0}, expected {KEY_LEN}")]
    InvalidKeyLength(usize),
    #[error("invalid iv length: {0}, expected {IV_LEN}")]
    InvalidIvLength(usize),
    #[error("authentication failure: tag mismatch on decrypt")]
    AuthenticationFailure,
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
}

/// Derives a 32-byte master key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// Rejects an empty password or a salt whose length is not exactly [`SALT_LEN`].
/// Logs a warning (does not fail) when `iterations` is below 10,000.
pub fn derive_master_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; KEY_LEN], CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::EmptyPassword);
    }
    if salt.len() != SALT_LEN {
        return Err(CryptoError::InvalidSaltLength(salt.len()));
    }
    if iterations < 10_000 {
        tracing::warn!(iterations, "PBKDF2 iteration count below recommended minimum of 10,000");
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    tracing::debug!(iterations, "derived master key");
    Ok(key)
}

/// Generates `n` cryptographically random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generates a fresh random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generates a fresh random 12-byte AES-GCM nonce.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypts `plaintext` under AES-256-GCM, returning `(ciphertext || tag, iv)`.
///
/// Generates a fresh IV when `iv` is `None`. `aad` is bound into the authentication
/// tag but not encrypted.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8],
    iv: Option<[u8; IV_LEN]>,
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; IV_LEN]), CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    let iv = iv.unwrap_or_else(generate_iv);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&iv);
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    Ok((ciphertext, iv))
}

/// Decrypts `ciphertext_with_tag` (as produced by [`encrypt`]) under AES-256-GCM.
///
/// Fails with [`CryptoError::AuthenticationFailure`] if the tag does not verify —
/// this covers a wrong key, a wrong `aad`, or tampering with any byte of the input.
pub fn decrypt(
    ciphertext_with_tag: &[u8],
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIvLength(iv.len()));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext_with_tag,
                aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailure)
}

/// Computes the SHA-256 digest of `data`.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes the hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(compute_sha256(data))
}

/// Streams a file through SHA-256 in 8 KiB chunks, returning the hex digest.
pub fn compute_file_hash(path: &std::path::Path) -> std::io::Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>, CryptoError> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}

/// Common weak passwords rejected outright by [`password_strength`].
const WEAK_PASSWORD_DENYLIST: &[&str] = &[
    "password",
    "12345678",
    "qwerty",
    "abc123",
    "password123",
    "admin123",
    "88888888",
];

/// Outcome of [`password_strength`]: hard failure reasons, plus advisory warnings
/// that do not block acceptance.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PasswordStrength {
    pub warnings: Vec<String>,
}

/// Validates password strength. Returns `Ok(PasswordStrength)` with any non-fatal
/// warnings, or `Err(reason)` if the password is rejected outright.
///
/// Hard requirements: length >= 8, at least one lowercase/uppercase/digit, and not
/// on the common weak-password denylist. Length < 12 and absence of a special
/// character are warnings only.
pub fn password_strength(password: &str) -> Result<PasswordStrength, String> {
    if password.len() < 8 {
        return Err("password must be at least 8 characters".to_string());
    }

    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| "!@#$%^&*(),.?\":{}|<>".contains(c));

    if !has_lower {
        return Err("password must contain a lowercase letter".to_string());
    }
    if !has_upper {
        return Err("password must contain an uppercase letter".to_string());
    }
    if !has_digit {
        return Err("password must contain a digit".to_string());
    }
    if WEAK_PASSWORD_DENYLIST.contains(&password.to_lowercase().as_str()) {
        return Err("password is too common".to_string());
    }

    let mut warnings = Vec::new();
    if password.len() < 12 {
        warnings.push("password is shorter than the recommended 12 characters".to_string());
    }
    if !has_special {
        warnings.push("password has no special character".to_string());
    }
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    Ok(PasswordStrength { warnings })
}
