// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! Offline credential vault: AEAD-sealed credential blobs bound to a
//! password and the local device fingerprint, cached under a directory so
//! the hybrid authenticator can fall back to a cached identity when the
//! remote identity service is unreachable.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::crypto::{self, CryptoError, IV_LEN};
use crate::error::VaultError;
use crate::fingerprint::device_fingerprint;

pub const DEFAULT_CACHE_DAYS: u32 = 7;
const VAULT_KDF_ITERATIONS: u32 = 10_000;

/// A cached offline credential, as persisted by [`Vault::save`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
    pub token: String,
    pub device_fingerprint: String,
    pub created_at: String,
    pub expires_at: String,
    pub user_info: serde_json::Value,
}

/// A directory of AEAD-sealed credential files, one per username, bound to
/// password + device fingerprint with an explicit expiry.
pub struct Vault {
    cache_dir: PathBuf,
    cache_days: u32,
}

impl Vault {
    /// Opens (creating if absent) a vault rooted at `cache_dir`, with
    /// credentials expiring `cache_days` after they are saved.
    pub fn open(cache_dir: impl Into<PathBuf>, cache_days: u32) -> Result<Self, VaultError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Vault {
            cache_dir,
            cache_days,
        })
    }

    fn cache_path(&self, username: &str) -> PathBuf {
        let hash = crypto::sha256_hex(username.as_bytes());
        self.cache_dir.join(format!("{}.credential", &hash[..16]))
    }

    /// Derives the vault's per-credential encryption key: PBKDF2 over the
    /// password with salt `SHA-256(password || device_fingerprint)`, using a
    /// reduced iteration count since the password is independently verified
    /// (via `password_hash`) after decryption.
    fn derive_vault_key(password: &str, fingerprint: &str) -> Result<[u8; crypto::KEY_LEN], CryptoError> {
        let salt_input = format!("{password}{fingerprint}");
        let salt = crypto::compute_sha256(salt_input.as_bytes());
        crypto::derive_master_key(password, &salt, VAULT_KDF_ITERATIONS)
    }

    /// Seals `token`/`user_info` under a key derived from `password` and the
    /// current device fingerprint, and writes `IV || ciphertext` to
    /// `<cache_dir>/<sha256(username)[0..16]>.credential`.
    pub fn save(
        &self,
        username: &str,
        password: &str,
        token: &str,
        user_info: serde_json::Value,
    ) -> Result<(), VaultError> {
        self.save_with_fingerprint(username, password, token, user_info, &device_fingerprint())
    }

    /// Same as [`Vault::save`], but takes the device fingerprint explicitly
    /// instead of deriving it from the current host. Exists so tests can
    /// simulate "save on device A, load on device B" without depending on
    /// the process' real hardware.
    fn save_with_fingerprint(
        &self,
        username: &str,
        password: &str,
        token: &str,
        user_info: serde_json::Value,
        fingerprint: &str,
    ) -> Result<(), VaultError> {
        let now = SystemTime::now();
        let created_at = iso8601(now);
        let expires_at = iso8601(now + Duration::from_secs(self.cache_days as u64 * 86_400));

        let credential = Credential {
            username: username.to_string(),
            password_hash: crypto::sha256_hex(password.as_bytes()),
            token: token.to_string(),
            device_fingerprint: fingerprint.to_string(),
            created_at,
            expires_at,
            user_info,
        };

        let json = serde_json::to_vec(&credential)?;
        let key = Self::derive_vault_key(password, fingerprint)?;
        let (ciphertext, iv) = crypto::encrypt(&json, &key, None, username.as_bytes())?;

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);

        fs::write(self.cache_path(username), blob)?;
        tracing::info!(username, "offline credential cached");
        Ok(())
    }

    /// Loads and validates a cached credential for `username`.
    ///
    /// Returns `None` (never a surfaced error) when the file is absent,
    /// the AEAD tag doesn't verify, the password hash doesn't match, the
    /// device fingerprint doesn't match, or the credential has expired — in
    /// the last case the stale file is also deleted. Callers should treat
    /// every `None` the same way: "no usable cached credential."
    pub fn load(&self, username: &str, password: &str) -> Option<Credential> {
        self.load_with_fingerprint(username, password, &device_fingerprint())
    }

    /// Same as [`Vault::load`], but takes the device fingerprint explicitly
    /// instead of deriving it from the current host. Exists so tests can
    /// simulate a copied vault file being opened on a different device.
    fn load_with_fingerprint(&self, username: &str, password: &str, fingerprint: &str) -> Option<Credential> {
        let path = self.cache_path(username);
        let blob = fs::read(&path).ok()?;
        if blob.len() < IV_LEN {
            return None;
        }
        let (iv, ciphertext) = blob.split_at(IV_LEN);

        let key = Self::derive_vault_key(password, fingerprint).ok()?;
        let plaintext = crypto::decrypt(ciphertext, &key, iv, username.as_bytes()).ok()?;
        let credential: Credential = serde_json::from_slice(&plaintext).ok()?;

        if credential.password_hash != crypto::sha256_hex(password.as_bytes()) {
            tracing::warn!(username, "cached credential rejected: password mismatch");
            return None;
        }
        if credential.device_fingerprint != fingerprint {
            tracing::warn!(username, "cached credential rejected: device fingerprint mismatch");
            return None;
        }
        if SystemTime::now() > parse_iso8601(&credential.expires_at)? {
            tracing::info!(username, "cached credential expired, deleting");
            let _ = fs::remove_file(&path);
            return None;
        }

        Some(credential)
    }

    /// Removes the cached credential for `username`, if present. Returns
    /// whether a file was actually removed.
    pub fn delete(&self, username: &str) -> Result<bool, VaultError> {
        let path = self.cache_path(username);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Deletes every cached credential whose file modification time is
    /// older than `cache_days`. Returns the number of files removed.
    pub fn cleanup_expired(&self) -> Result<usize, VaultError> {
        let mut removed = 0usize;
        let ttl = Duration::from_secs(self.cache_days as u64 * 86_400);
        let now = SystemTime::now();

        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("credential") {
                continue;
            }
            let metadata = entry.metadata()?;
            let modified = metadata.modified()?;
            if now.duration_since(modified).unwrap_or_default() > ttl {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "cleaned up expired credentials");
        }
        Ok(removed)
    }
}

fn iso8601(time: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = time.into();
    dt.to_rfc3339()
}

fn parse_iso8601(s: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc).into())
}
