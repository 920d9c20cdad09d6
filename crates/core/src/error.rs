//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Unified error hierarchy for the aipk workspace. Each module keeps its
//! own focused error enum; `AipkError` wraps each with `#[from]` so call
//! sites can match on a single type while still inspecting which
//! subsystem failed.

use thiserror::Error;

/// Top-level unified error type for aipk operations.
#[derive(Error, Debug)]
pub enum AipkError {
    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("package format error: {0}")]
    Format(#[from] FormatError),

    #[error("credential vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("identity service error: {0}")]
    Identity(#[from] IdentityError),

    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the ECP header/index format model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad header: {0}")]
    BadHeader(String),

    #[error("malformed index: {0}")]
    MalformedIndex(String),
}

impl From<serde_json::Error> for FormatError {
    fn from(e: serde_json::Error) -> Self {
        FormatError::MalformedIndex(e.to_string())
    }
}

/// Errors from the offline credential vault. Most vault failure paths are
/// handled internally (the vault returns `None` rather than propagating
/// these), but `delete`/maintenance callers still need a surfaced type for
/// filesystem failures.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("credential not found for user")]
    NotFound,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
}

/// Errors from the identity HTTP client.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("authentication failed: {0}")]
    AuthError(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
