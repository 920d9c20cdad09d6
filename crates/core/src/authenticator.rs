// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! The hybrid authenticator: composes the online [`IdentityClient`] with the
//! offline [`Vault`] under a deterministic online-first, offline-fallback
//! policy, and holds the resulting distribution key in a [`Secret`] for the
//! lifetime of the session.
//!
//! A plain, caller-owned value — no process-wide singleton. Nothing it holds
//! is shared across authenticator instances (see the re-architecture note in
//! DESIGN.md).

use crate::crypto::{self, CryptoError};
use crate::error::IdentityError;
use crate::fingerprint::device_fingerprint;
use crate::identity::IdentityClient;
use crate::secret::Secret;
use crate::vault::Vault;

#[derive(Debug, thiserror::Error)]
pub enum AuthenticatorError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Vault(#[from] crate::error::VaultError),
}

/// Which trust root produced the current session, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Online,
    Offline,
}

/// Orchestrates online-first/offline-fallback authentication and holds the
/// resulting distribution key for as long as the session is open.
pub struct HybridAuthenticator {
    identity: IdentityClient,
    vault: Vault,
    distribution_secret: String,
    state: AuthState,
    username: Option<String>,
    token: Option<String>,
    user_info: Option<serde_json::Value>,
    distribution_key: Option<Secret<[u8; crypto::KEY_LEN]>>,
}

impl HybridAuthenticator {
    pub fn new(identity: IdentityClient, vault: Vault, distribution_secret: impl Into<String>) -> Self {
        HybridAuthenticator {
            identity,
            vault,
            distribution_secret: distribution_secret.into(),
            state: AuthState::Unauthenticated,
            username: None,
            token: None,
            user_info: None,
            distribution_key: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn current_user(&self) -> Option<&serde_json::Value> {
        self.user_info.as_ref()
    }

    /// Derives the distribution key from the fixed distribution secret with
    /// `salt = SHA-256(secret)`. This binds the secret into the same
    /// key-holder lifecycle as every other key in the system; it is
    /// obfuscation against casual inspection, not protection against an
    /// attacker who has the application binary (see DESIGN.md).
    fn derive_distribution_key(&self) -> Result<Secret<[u8; crypto::KEY_LEN]>, AuthenticatorError> {
        let salt = crypto::compute_sha256(self.distribution_secret.as_bytes());
        let key = crypto::derive_master_key(&self.distribution_secret, &salt, crypto::DEFAULT_PBKDF2_ITERATIONS)?;
        Ok(Secret::new(key))
    }

    /// Attempts online login first; on a network failure, falls back to the
    /// offline vault. Returns `true` iff a session was established.
    pub fn authenticate(&mut self, username: &str, password: &str) -> bool {
        let fp = device_fingerprint();

        if self.identity.health() {
            match self.identity.login(username, password, &fp) {
                Ok(session) => {
                    if let Err(e) = self
                        .vault
                        .save(username, password, &session.token, session.user.clone())
                    {
                        tracing::warn!(error = %e, "failed to cache credential after online login");
                    }

                    let key = match self.derive_distribution_key() {
                        Ok(k) => k,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to derive distribution key");
                            return false;
                        }
                    };

                    self.username = Some(username.to_string());
                    self.token = Some(session.token);
                    self.user_info = Some(session.user);
                    self.distribution_key = Some(key);
                    self.state = AuthState::Online;
                    tracing::info!(username, "authenticated online");
                    return true;
                }
                Err(IdentityError::AuthError(reason)) => {
                    tracing::error!(username, reason, "online authentication rejected");
                    self.state = AuthState::Unauthenticated;
                    return false;
                }
                Err(IdentityError::NetworkError(reason)) => {
                    tracing::warn!(username, reason, "network error during login, falling back to offline vault");
                }
                Err(IdentityError::UnexpectedResponse(reason)) => {
                    tracing::error!(username, reason, "unexpected identity response");
                    self.state = AuthState::Unauthenticated;
                    return false;
                }
            }
        } else {
            tracing::info!("identity service unreachable, attempting offline authentication");
        }

        match self.vault.load(username, password) {
            Some(credential) => {
                let key = match self.derive_distribution_key() {
                    Ok(k) => k,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to derive distribution key");
                        return false;
                    }
                };

                self.username = Some(username.to_string());
                self.token = Some(credential.token);
                self.user_info = Some(credential.user_info);
                self.distribution_key = Some(key);
                self.state = AuthState::Offline;
                tracing::info!(username, "authenticated offline from cached credential");
                true
            }
            None => {
                tracing::error!(username, "no usable cached credential, offline authentication failed");
                self.state = AuthState::Unauthenticated;
                false
            }
        }
    }

    /// Returns the distribution password (the fixed secret used to derive
    /// the distribution key) once authenticated. Fails otherwise.
    pub fn get_distribution_password(&self) -> Result<&str, AuthenticatorError> {
        if self.state == AuthState::Unauthenticated || self.distribution_key.is_none() {
            return Err(AuthenticatorError::NotAuthenticated);
        }
        Ok(&self.distribution_secret)
    }

    /// If online, best-effort logs out of the identity service. In all
    /// cases, zeroes the distribution key and clears the session.
    pub fn logout(&mut self) {
        if self.state == AuthState::Online {
            if let Some(token) = &self.token {
                if !self.identity.logout(token) {
                    tracing::warn!("logout request to identity service did not succeed");
                }
            }
        }

        self.username = None;
        self.token = None;
        self.user_info = None;
        self.distribution_key = None;
        self.state = AuthState::Unauthenticated;
        tracing::info!("session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn healthy_login_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": "jwt-abc",
                "user": {"username": "pilot", "email": "pilot@example.com", "permissions": []}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn online_authentication_succeeds_and_caches_credential() {
        let server = healthy_login_server().await;
        let cache_dir = TempDir::new().unwrap();

        let mut auth = HybridAuthenticator::new(
            IdentityClient::new(server.uri(), "1.0.0"),
            Vault::open(cache_dir.path(), 7).unwrap(),
            "Aviation2025!ComplexDistributionPassword",
        );

        let ok = tokio::task::spawn_blocking(move || auth.authenticate("pilot", "Aviation2025!"))
            .await
            .unwrap();
        assert!(ok);

        let entries: Vec<_> = std::fs::read_dir(cache_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn offline_fallback_uses_cached_credential_when_server_unreachable() {
        let server = healthy_login_server().await;
        let cache_dir = TempDir::new().unwrap();

        let server_uri = server.uri();
        let cache_path = cache_dir.path().to_path_buf();
        tokio::task::spawn_blocking({
            let cache_path = cache_path.clone();
            let server_uri = server_uri.clone();
            move || {
                let mut auth = HybridAuthenticator::new(
                    IdentityClient::new(server_uri, "1.0.0"),
                    Vault::open(cache_path, 7).unwrap(),
                    "Aviation2025!ComplexDistributionPassword",
                );
                assert!(auth.authenticate("pilot", "Aviation2025!"));
            }
        })
        .await
        .unwrap();

        // Fresh authenticator pointed at an unreachable server: must fall back.
        let cache_path = cache_dir.path().to_path_buf();
        let (ok, ok_wrong) = tokio::task::spawn_blocking(move || {
            let mut auth = HybridAuthenticator::new(
                IdentityClient::new("http://127.0.0.1:1", "1.0.0"),
                Vault::open(&cache_path, 7).unwrap(),
                "Aviation2025!ComplexDistributionPassword",
            );
            let ok = auth.authenticate("pilot", "Aviation2025!");
            assert_eq!(auth.state(), AuthState::Offline);
            auth.logout();

            let mut auth2 = HybridAuthenticator::new(
                IdentityClient::new("http://127.0.0.1:1", "1.0.0"),
                Vault::open(&cache_path, 7).unwrap(),
                "Aviation2025!ComplexDistributionPassword",
            );
            let ok_wrong = auth2.authenticate("pilot", "wrong-password");
            (ok, ok_wrong)
        })
        .await
        .unwrap();

        assert!(ok);
        assert!(!ok_wrong);
    }

    #[tokio::test]
    async fn distribution_password_unavailable_before_authentication() {
        let cache_dir = TempDir::new().unwrap();
        let auth = HybridAuthenticator::new(
            IdentityClient::new("http://127.0.0.1:1", "1.0.0"),
            Vault::open(cache_dir.path(), 7).unwrap(),
            "Aviation2025!ComplexDistributionPassword",
        );
        assert!(matches!(
            auth.get_distribution_password(),
            Err(AuthenticatorError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn auth_error_does_not_fall_back_to_offline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"success": false, "error": "bad creds"})),
            )
            .mount(&server)
            .await;

        let cache_dir = TempDir::new().unwrap();
        let server_uri = server.uri();
        let cache_path = cache_dir.path().to_path_buf();
        let ok = tokio::task::spawn_blocking(move || {
            let mut auth = HybridAuthenticator::new(
                IdentityClient::new(server_uri, "1.0.0"),
                Vault::open(cache_path, 7).unwrap(),
                "Aviation2025!ComplexDistributionPassword",
            );
            auth.authenticate("pilot", "wrong")
        })
        .await
        .unwrap();

        assert!(!ok);
        // No vault file should have been written on an explicit auth rejection.
        assert!(std::fs::read_dir(cache_dir.path()).unwrap().next().is_none());
    }
}
