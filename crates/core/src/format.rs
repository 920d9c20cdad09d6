// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! The on-disk Encrypted Chart Package (ECP) data model: the 512-byte fixed
//! header, the JSON index document it points at, and the per-entry record
//! schema. Encode/decode here is purely structural — no crypto, no I/O
//! beyond byte slices — so the builder and reader can share one definition
//! of "what a well-formed package looks like."

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

pub const MAGIC: &[u8; 4] = b"AIPK";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;
pub const HEADER_LEN: usize = 512;

pub const INDEX_IV_FIELD_LEN: usize = 32;
pub const MASTER_SALT_LEN: usize = 32;
pub const BODY_HASH_FIELD_LEN: usize = 64;
pub const METADATA_FIELD_LEN: usize = 128;
pub const RESERVED_FIELD_LEN: usize = 200;

/// The index's associated-data tag, binding the sealed index to its role so
/// ciphertext from one package section can't be replayed into another.
pub const INDEX_AAD: &[u8] = b"AIPKG_INDEX_V1";

/// Body compression used for entry payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompressionAlgo {
    None = 0,
    Gzip = 1,
    /// Reserved: framing exists, encoder not wired up. See the Open Question
    /// in DESIGN.md.
    ZstdReserved = 2,
}

impl TryFrom<u32> for CompressionAlgo {
    type Error = FormatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionAlgo::None),
            1 => Ok(CompressionAlgo::Gzip),
            2 => Ok(CompressionAlgo::ZstdReserved),
            other => Err(FormatError::BadHeader(format!(
                "unknown compression_algo {other}"
            ))),
        }
    }
}

/// Entry-payload AEAD algorithm. Only one is defined today; the field
/// exists so a future algorithm can be introduced without a header shape
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EncryptionAlgo {
    Aes256Gcm = 1,
}

impl TryFrom<u32> for EncryptionAlgo {
    type Error = FormatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EncryptionAlgo::Aes256Gcm),
            other => Err(FormatError::BadHeader(format!(
                "unknown encryption_algo {other}"
            ))),
        }
    }
}

/// The fixed 512-byte package header, little-endian throughout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,
    pub index_offset: u64,
    pub index_length: u64,
    /// Only the first 12 bytes are the GCM nonce; the remainder is zeroed
    /// padding to keep the field width fixed.
    pub index_iv: [u8; INDEX_IV_FIELD_LEN],
    pub master_salt: [u8; MASTER_SALT_LEN],
    /// SHA-256 digest of everything after the header, right-zero-padded to
    /// the fixed field width (the digest itself is 32 bytes).
    pub body_hash: [u8; BODY_HASH_FIELD_LEN],
    pub created_timestamp: u64,
    pub total_files: u64,
    pub total_data_size: u64,
    pub compression_algo: u32,
    pub encryption_algo: u32,
    pub metadata: String,
}

impl Header {
    /// A header with all offset/length/hash fields zeroed, suitable as the
    /// placeholder written by the builder's first pass before the real
    /// values are known.
    pub fn placeholder(master_salt: [u8; MASTER_SALT_LEN], metadata: impl Into<String>) -> Self {
        Header {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            index_offset: HEADER_LEN as u64,
            index_length: 0,
            index_iv: [0u8; INDEX_IV_FIELD_LEN],
            master_salt,
            body_hash: [0u8; BODY_HASH_FIELD_LEN],
            created_timestamp: 0,
            total_files: 0,
            total_data_size: 0,
            compression_algo: CompressionAlgo::None as u32,
            encryption_algo: EncryptionAlgo::Aes256Gcm as u32,
            metadata: metadata.into(),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut off = 0usize;

        out[off..off + 4].copy_from_slice(MAGIC);
        off += 4;
        out[off..off + 2].copy_from_slice(&self.version_major.to_le_bytes());
        off += 2;
        out[off..off + 2].copy_from_slice(&self.version_minor.to_le_bytes());
        off += 2;
        out[off..off + 8].copy_from_slice(&self.index_offset.to_le_bytes());
        off += 8;
        out[off..off + 8].copy_from_slice(&self.index_length.to_le_bytes());
        off += 8;
        out[off..off + INDEX_IV_FIELD_LEN].copy_from_slice(&self.index_iv);
        off += INDEX_IV_FIELD_LEN;
        out[off..off + MASTER_SALT_LEN].copy_from_slice(&self.master_salt);
        off += MASTER_SALT_LEN;
        out[off..off + BODY_HASH_FIELD_LEN].copy_from_slice(&self.body_hash);
        off += BODY_HASH_FIELD_LEN;
        out[off..off + 8].copy_from_slice(&self.created_timestamp.to_le_bytes());
        off += 8;
        out[off..off + 8].copy_from_slice(&self.total_files.to_le_bytes());
        off += 8;
        out[off..off + 8].copy_from_slice(&self.total_data_size.to_le_bytes());
        off += 8;
        out[off..off + 4].copy_from_slice(&self.compression_algo.to_le_bytes());
        off += 4;
        out[off..off + 4].copy_from_slice(&self.encryption_algo.to_le_bytes());
        off += 4;

        let meta_bytes = self.metadata.as_bytes();
        let meta_len = meta_bytes.len().min(METADATA_FIELD_LEN);
        out[off..off + meta_len].copy_from_slice(&meta_bytes[..meta_len]);
        off += METADATA_FIELD_LEN;

        // reserved block stays zeroed
        off += RESERVED_FIELD_LEN;
        debug_assert_eq!(off, HEADER_LEN);

        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() != HEADER_LEN {
            return Err(FormatError::BadHeader(format!(
                "expected {HEADER_LEN} header bytes, got {}",
                bytes.len()
            )));
        }

        let magic = &bytes[0..4];
        if magic != MAGIC {
            return Err(FormatError::BadHeader("bad magic".into()));
        }

        let mut off = 4usize;
        let version_major = u16::from_le_bytes([bytes[off], bytes[off + 1]]);
        off += 2;
        let version_minor = u16::from_le_bytes([bytes[off], bytes[off + 1]]);
        off += 2;
        if version_major > VERSION_MAJOR {
            return Err(FormatError::BadHeader(format!(
                "unsupported major version {version_major}"
            )));
        }

        let index_offset = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let index_length = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        if index_offset < HEADER_LEN as u64 {
            return Err(FormatError::BadHeader(format!(
                "index_offset {index_offset} below header length"
            )));
        }
        if index_length == 0 {
            return Err(FormatError::BadHeader("index_length is zero".into()));
        }

        let mut index_iv = [0u8; INDEX_IV_FIELD_LEN];
        index_iv.copy_from_slice(&bytes[off..off + INDEX_IV_FIELD_LEN]);
        off += INDEX_IV_FIELD_LEN;

        let mut master_salt = [0u8; MASTER_SALT_LEN];
        master_salt.copy_from_slice(&bytes[off..off + MASTER_SALT_LEN]);
        off += MASTER_SALT_LEN;

        let mut body_hash = [0u8; BODY_HASH_FIELD_LEN];
        body_hash.copy_from_slice(&bytes[off..off + BODY_HASH_FIELD_LEN]);
        off += BODY_HASH_FIELD_LEN;

        let created_timestamp = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let total_files = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let total_data_size = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        off += 8;
        let compression_algo = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;
        let encryption_algo = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        off += 4;

        CompressionAlgo::try_from(compression_algo)?;
        EncryptionAlgo::try_from(encryption_algo)?;

        let meta_raw = &bytes[off..off + METADATA_FIELD_LEN];
        let meta_end = meta_raw.iter().position(|&b| b == 0).unwrap_or(meta_raw.len());
        let metadata = String::from_utf8_lossy(&meta_raw[..meta_end]).into_owned();

        Ok(Header {
            version_major,
            version_minor,
            index_offset,
            index_length,
            index_iv,
            master_salt,
            body_hash,
            created_timestamp,
            total_files,
            total_data_size,
            compression_algo,
            encryption_algo,
            metadata,
        })
    }

    pub fn index_nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&self.index_iv[..12]);
        nonce
    }

    pub fn body_hash_digest(&self) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&self.body_hash[..32]);
        digest
    }
}

/// Fixed chart-category taxonomy. `code` is the stable on-disk identifier;
/// `display_name` is what a UI would show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Adc,
    Aoc,
    Apdc,
    Gmc,
    Patc,
    Sid,
    Star,
    Iac,
    Fda,
    DatabaseCodingTable,
    WaypointList,
}

impl Category {
    pub fn code(&self) -> &'static str {
        match self {
            Category::Adc => "ADC",
            Category::Aoc => "AOC",
            Category::Apdc => "APDC",
            Category::Gmc => "GMC",
            Category::Patc => "PATC",
            Category::Sid => "SID",
            Category::Star => "STAR",
            Category::Iac => "IAC",
            Category::Fda => "FDA",
            Category::DatabaseCodingTable => "DATABASE_CODING_TABLE",
            Category::WaypointList => "WAYPOINT_LIST",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Adc => "Aerodrome Chart",
            Category::Aoc => "Aircraft Operating Chart",
            Category::Apdc => "Airport Diagram",
            Category::Gmc => "Ground Movement Chart",
            Category::Patc => "Precision Approach Terrain Chart",
            Category::Sid => "Standard Instrument Departure",
            Category::Star => "Standard Terminal Arrival Route",
            Category::Iac => "Instrument Approach Chart",
            Category::Fda => "Final Descent Area Chart",
            Category::DatabaseCodingTable => "Database Coding Table",
            Category::WaypointList => "Waypoint List",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Adc,
            Category::Aoc,
            Category::Apdc,
            Category::Gmc,
            Category::Patc,
            Category::Sid,
            Category::Star,
            Category::Iac,
            Category::Fda,
            Category::DatabaseCodingTable,
            Category::WaypointList,
        ]
    }

    pub fn from_code(code: &str) -> Option<Category> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.code().eq_ignore_ascii_case(code))
    }
}

/// One sealed payload's index record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub airport: String,
    pub category: String,
    pub filename: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runway: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    pub offset: u64,
    pub compressed_size: u64,
    pub original_size: u64,
    /// base64-encoded 12-byte GCM nonce.
    pub iv: String,
    pub file_hash: String,
    pub created_at: String,
}

/// Per-airport aggregate carried in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Airport {
    pub icao: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub file_count: u64,
}

/// Per-category aggregate carried in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategorySummary {
    pub code: String,
    pub display_name: String,
    pub file_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageInfo {
    pub format_version: String,
    pub total_files: u64,
    pub total_data_size: u64,
    pub compressed_size: u64,
    /// `compressed_size / total_data_size`, `0.0` when `total_data_size == 0`.
    pub compression_ratio: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Index {
    pub package_info: PackageInfo,
    pub airports: Vec<Airport>,
    pub categories: Vec<CategorySummary>,
    pub files: Vec<Entry>,
}

impl Index {
    pub fn find(&self, id: &str) -> Option<&Entry> {
        self.files.iter().find(|e| e.id == id)
    }

    /// Canonical JSON encoding used for both the first-pass seal and the
    /// second-pass reseal. Field order here is struct-declaration order (not
    /// a hash map), which is what makes the two-pass fix-up in the builder
    /// byte-identical in length across re-encodes of the same data.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, FormatError> {
        serde_json::to_vec(self).map_err(FormatError::from)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        serde_json::from_slice(bytes).map_err(FormatError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        let mut h = Header::placeholder([0x11u8; MASTER_SALT_LEN], "aipk-0.1.0");
        h.index_offset = HEADER_LEN as u64;
        h.index_length = 4096;
        h.index_iv[..12].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        h.body_hash[..32].copy_from_slice(&[0xAB; 32]);
        h.created_timestamp = 1_700_000_000;
        h.total_files = 3;
        h.total_data_size = 123_456;
        h.compression_algo = CompressionAlgo::Gzip as u32;
        h.encryption_algo = EncryptionAlgo::Aes256Gcm as u32;
        h
    }

    #[test]
    fn header_roundtrip_is_byte_exact() {
        let h = sample_header();
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(FormatError::BadHeader(_))
        ));
    }

    #[test]
    fn header_rejects_future_major_version() {
        let mut h = sample_header();
        h.version_major = VERSION_MAJOR + 1;
        let bytes = h.to_bytes();
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn header_rejects_index_offset_below_header_len() {
        let mut bytes = sample_header().to_bytes();
        bytes[8..16].copy_from_slice(&100u64.to_le_bytes());
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn header_rejects_zero_index_length() {
        let mut bytes = sample_header().to_bytes();
        bytes[16..24].copy_from_slice(&0u64.to_le_bytes());
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn header_rejects_wrong_length_buffer() {
        assert!(Header::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn metadata_field_truncates_and_strips_nul() {
        let long = "x".repeat(METADATA_FIELD_LEN + 50);
        let mut h = sample_header();
        h.metadata = long.clone();
        let bytes = h.to_bytes();
        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.metadata.len(), METADATA_FIELD_LEN);
        assert_eq!(decoded.metadata, long[..METADATA_FIELD_LEN]);
    }

    #[test]
    fn category_code_lookup_roundtrips() {
        for cat in Category::all() {
            let code = cat.code();
            assert_eq!(Category::from_code(code), Some(*cat));
        }
        assert_eq!(Category::from_code("NOPE"), None);
    }

    #[test]
    fn index_json_roundtrip() {
        let index = Index {
            package_info: PackageInfo {
                format_version: "1.0".into(),
                total_files: 1,
                total_data_size: 100,
                compressed_size: 60,
                compression_ratio: 0.6,
                created_at: "2026-01-01T00:00:00Z".into(),
            },
            airports: vec![Airport {
                icao: "ZBAA".into(),
                display_name: None,
                file_count: 1,
            }],
            categories: vec![CategorySummary {
                code: "SID".into(),
                display_name: Category::Sid.display_name().into(),
                file_count: 1,
            }],
            files: vec![Entry {
                id: "zbaa_sid_deadbeef".into(),
                airport: "ZBAA".into(),
                category: "SID".into(),
                filename: "ZBAA-7A01-SID.pdf".into(),
                title: "SID".into(),
                chart_number: Some("ZBAA-7A01".into()),
                runway: None,
                procedure: None,
                offset: 600,
                compressed_size: 42,
                original_size: 100,
                iv: "AAAAAAAAAAAAAAAAAAAA".into(),
                file_hash: "deadbeef".repeat(8),
                created_at: "2026-01-01T00:00:00Z".into(),
            }],
        };

        let bytes = index.to_json_bytes().unwrap();
        let decoded = Index::from_json_bytes(&bytes).unwrap();
        assert_eq!(index, decoded);
        assert_eq!(decoded.find("zbaa_sid_deadbeef").unwrap().airport, "ZBAA");
        assert!(decoded.find("missing").is_none());
    }
}
