// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! Client for the remote identity service: health checks, login, token
//! verification, logout, and a user-info convenience accessor. Built over a
//! blocking `reqwest` client since nothing else in this crate needs an async
//! runtime and every call site here is a short request/response exchange.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    device_fingerprint: &'a str,
    app_version: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct LogoutResponse {
    #[serde(default)]
    success: bool,
}

/// A successful login: the bearer token and the user record the identity
/// service returned alongside it.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub token: String,
    pub user: serde_json::Value,
}

/// A thin, synchronous HTTP client for the remote identity service.
///
/// Never retries automatically — retry policy is a concern for whatever
/// calls this client (here, the hybrid authenticator's fallback decision).
pub struct IdentityClient {
    base_url: String,
    app_version: String,
    http: reqwest::blocking::Client,
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>, app_version: impl Into<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("building a reqwest client with a fixed timeout never fails");

        IdentityClient {
            base_url: base_url.into(),
            app_version: app_version.into(),
            http,
        }
    }

    /// Returns `true` iff the identity service answers `GET /api/health`
    /// within the timeout. Any error (timeout, connection refused, DNS
    /// failure, non-2xx) is treated as unreachable rather than surfaced.
    pub fn health(&self) -> bool {
        match self.http.get(format!("{}/api/health", self.base_url)).send() {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "identity health check failed");
                false
            }
        }
    }

    /// Logs in with `username`/`password`, binding the session to
    /// `device_fingerprint`.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        device_fingerprint: &str,
    ) -> Result<LoginSession, IdentityError> {
        let request = LoginRequest {
            username,
            password,
            device_fingerprint,
            app_version: &self.app_version,
        };

        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| IdentityError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body: LoginResponse = response
            .json()
            .map_err(|e| IdentityError::NetworkError(e.to_string()))?;

        if status.is_success() && body.success {
            let token = body
                .token
                .ok_or_else(|| IdentityError::UnexpectedResponse("missing token".into()))?;
            let user = body
                .user
                .ok_or_else(|| IdentityError::UnexpectedResponse("missing user".into()))?;
            tracing::info!(username, "login successful");
            return Ok(LoginSession { token, user });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let reason = body.error.unwrap_or_else(|| "invalid credentials".into());
            tracing::warn!(username, status = %status, "login rejected by identity service");
            return Err(IdentityError::AuthError(reason));
        }

        Err(IdentityError::UnexpectedResponse(format!(
            "unexpected status {status}"
        )))
    }

    /// Returns `true` iff the identity service confirms `token` is valid.
    /// Any other outcome (expired, malformed, network failure) is `false`.
    pub fn verify(&self, token: &str) -> bool {
        let response = self
            .http
            .get(format!("{}/api/auth/verify", self.base_url))
            .bearer_auth(token)
            .send();

        match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<VerifyResponse>()
                .map(|body| body.valid)
                .unwrap_or(false),
            Ok(_) => false,
            Err(e) => {
                tracing::debug!(error = %e, "token verification request failed");
                false
            }
        }
    }

    /// Best-effort logout. Never fatal: returns `true` only on a 2xx
    /// response, `false` on anything else including network failure.
    pub fn logout(&self, token: &str) -> bool {
        match self
            .http
            .post(format!("{}/api/auth/logout", self.base_url))
            .bearer_auth(token)
            .send()
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "logout request failed");
                false
            }
        }
    }

    /// Fetches the current user's profile. `None` on any non-200 response or
    /// transport error — never surfaced as an error to the caller.
    pub fn user_info(&self, token: &str) -> Option<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}/api/user/info", self.base_url))
            .bearer_auth(token)
            .send()
            .ok()?;

        if !response.status().is_success() {
            return None;
        }
        response.json().ok()
    }
}
