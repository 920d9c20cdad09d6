//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! # aipk-core
//!
//! Security and format core for the Encrypted Chart Package (ECP): a
//! content-addressable, AEAD-sealed archive format for bundling a directory
//! tree of aeronautical chart PDFs into a single distributable file, plus the
//! authentication stack that unlocks it — online against a remote identity
//! service, or offline against a device-bound encrypted credential cache.
//!
//! ## Modules
//!
//! - [`crypto`] — AES-256-GCM, PBKDF2-HMAC-SHA256, SHA-256, password strength.
//! - [`fingerprint`] — stable per-host device fingerprint.
//! - [`format`] — the 512-byte header and JSON index data model.
//! - [`builder`] — scans a source tree and writes a sealed `.aipk` package.
//! - [`reader`] — opens a sealed package and decrypts entries on demand.
//! - [`vault`] — offline, AEAD-sealed credential cache.
//! - [`identity`] — HTTP client for the remote identity service.
//! - [`authenticator`] — online-first/offline-fallback authentication.
//! - [`secret`] — zeroizing, redacted in-memory key holder.
//! - [`config`] — environment-driven runtime configuration.
//! - [`error`] — the unified error hierarchy.
//!
//! ## Quick start: build and read a package
//!
//! ```no_run
//! use aipk_core::builder::{create_package, BuildOptions};
//! use aipk_core::reader::PackageReader;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let opts = BuildOptions {
//!     password: "Aviation2025!".to_string(),
//!     ..Default::default()
//! };
//! create_package(Path::new("./charts"), Path::new("./out.aipk"), opts)?;
//!
//! let mut reader = PackageReader::open(Path::new("./out.aipk"), "Aviation2025!")?;
//! for entry in reader.list() {
//!     let _plaintext = reader.open_entry(&entry.id)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod authenticator;
pub mod builder;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod format;
pub mod identity;
pub mod reader;
pub mod secret;
pub mod vault;

pub use authenticator::{AuthState, AuthenticatorError, HybridAuthenticator};
pub use builder::{create_package, BuildOptions, BuildStats, BuilderError, Compression};
pub use config::{Config, ConfigError};
pub use error::AipkError;
pub use fingerprint::{device_fingerprint, device_info, DeviceInfo};
pub use format::{Airport, Category, CategorySummary, Entry, Header, Index, PackageInfo};
pub use identity::{IdentityClient, LoginSession};
pub use reader::{PackageReader, ReaderError};
pub use secret::Secret;
pub use vault::{Credential, Vault};
