// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! Opens an Encrypted Chart Package written by [`crate::builder`]: validates
//! the header, decrypts the index with the user-supplied password, and
//! decrypts individual entries by identifier on demand.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::crypto::{self, CryptoError, GCM_TAG_LEN};
use crate::format::{CompressionAlgo, Entry, Header, Index, HEADER_LEN, INDEX_AAD};

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error(transparent)]
    BadHeader(#[from] crate::error::FormatError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("hash mismatch for entry {id}: expected {expected}, computed {computed}")]
    HashMismatch {
        id: String,
        expected: String,
        computed: String,
    },

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A read-only handle on an opened ECP. The master key lives only for the
/// duration this value exists; dropping it (or calling nothing further)
/// releases the key along with the rest of the struct.
pub struct PackageReader {
    file: File,
    header: Header,
    index: Index,
    master_key: [u8; crypto::KEY_LEN],
}

impl PackageReader {
    /// Opens `path`, validates its header, and decrypts the index using
    /// `password`. Fails with [`ReaderError::BadHeader`] on a malformed
    /// container or [`ReaderError::Crypto`] (`AuthenticationFailure`) on a
    /// wrong password or tampered index.
    pub fn open(path: &Path, password: &str) -> Result<Self, ReaderError> {
        let mut file = File::open(path)?;

        let mut header_bytes = [0u8; HEADER_LEN];
        file.read_exact(&mut header_bytes)?;
        let header = Header::from_bytes(&header_bytes)?;

        let master_key = crypto::derive_master_key(
            password,
            &header.master_salt,
            crypto::DEFAULT_PBKDF2_ITERATIONS,
        )?;

        file.seek(SeekFrom::Start(header.index_offset))?;
        let mut sealed_index = vec![0u8; header.index_length as usize];
        file.read_exact(&mut sealed_index)?;

        let index_nonce = header.index_nonce();
        let index_json = crypto::decrypt(&sealed_index, &master_key, &index_nonce, INDEX_AAD)
            .map_err(|e| {
                tracing::error!("index decrypt failed: wrong password or tampered index");
                ReaderError::Crypto(e)
            })?;
        let index = Index::from_json_bytes(&index_json)?;

        tracing::info!(
            package = %path.display(),
            files = index.files.len(),
            "opened package"
        );

        Ok(PackageReader {
            file,
            header,
            index,
            master_key,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Lists every entry in the package index, in on-disk order.
    pub fn list(&self) -> &[Entry] {
        &self.index.files
    }

    /// Decrypts and (if applicable) decompresses the entry named `id`,
    /// verifying its stored SHA-256 before returning the plaintext.
    pub fn open_entry(&mut self, id: &str) -> Result<Vec<u8>, ReaderError> {
        let entry = self
            .index
            .find(id)
            .cloned()
            .ok_or_else(|| ReaderError::NotFound(id.to_string()))?;

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut sealed = vec![0u8; entry.compressed_size as usize + GCM_TAG_LEN];
        self.file.read_exact(&mut sealed)?;

        let iv = crypto::decode_base64(&entry.iv)?;
        let compressed = crypto::decrypt(&sealed, &self.master_key, &iv, entry.id.as_bytes())
            .map_err(|e| {
                tracing::error!(id = %entry.id, "entry decrypt failed: tampered or wrong key");
                ReaderError::Crypto(e)
            })?;

        let plaintext = match CompressionAlgo::try_from(self.header.compression_algo)? {
            CompressionAlgo::Gzip => {
                let mut decoder = GzDecoder::new(compressed.as_slice());
                let mut out = Vec::with_capacity(entry.original_size as usize);
                decoder.read_to_end(&mut out)?;
                out
            }
            CompressionAlgo::None | CompressionAlgo::ZstdReserved => compressed,
        };

        let computed = crypto::sha256_hex(&plaintext);
        if computed != entry.file_hash {
            tracing::error!(id = %entry.id, "plaintext hash mismatch after successful decrypt");
            return Err(ReaderError::HashMismatch {
                id: entry.id.clone(),
                expected: entry.file_hash.clone(),
                computed,
            });
        }

        Ok(plaintext)
    }
}
