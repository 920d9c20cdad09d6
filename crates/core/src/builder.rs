// Copyright (c) 2025 TRUSTEDGE LABS LLC
// MPL-2.0: https://mozilla.org/MPL/2.0/
// Project: trustedge — Privacy and trust at the edge.

//! Builds an Encrypted Chart Package from a source tree of airport/category
//! directories full of PDF charts.
//!
//! The on-disk layout can't be written in one pass: entry offsets depend on
//! the sealed index length, and the index itself contains those offsets. So
//! the builder seals every entry first with provisional (data-region-relative)
//! offsets, builds and seals the index once to learn its length, then fixes
//! up every offset to be absolute and reseals the index a second time with
//! the same IV so the sealed length — and therefore every entry's absolute
//! offset — does not move again.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use regex::Regex;

use crate::crypto::{self, CryptoError};
use crate::format::{
    Airport, Category, CategorySummary, Entry, Header, Index, PackageInfo, HEADER_LEN, INDEX_AAD,
};
use crate::secret::Secret;

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("weak password: {0}")]
    WeakPassword(String),

    #[error("source directory not found: {0}")]
    SourceNotFound(PathBuf),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Format(#[from] crate::error::FormatError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("build interrupted by caller")]
    Interrupted,
}

/// Progress milestones reported during a build. `current`/`total` are
/// advisory and the build must succeed when no callback is supplied.
///
/// Returns `true` to continue, `false` to request cancellation. A `false`
/// return causes the build to stop at the next checkpoint and fail with
/// [`BuilderError::Interrupted`], going through the same cleanup path as any
/// other build error rather than tearing down the process from inside the
/// callback.
pub type ProgressCallback<'a> = dyn FnMut(u64, u64, &str) -> bool + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    None,
}

pub struct BuildOptions<'a> {
    pub password: String,
    pub version_tag: Option<String>,
    pub compression: Compression,
    pub level: u32,
    pub progress: Option<&'a mut ProgressCallback<'a>>,
}

impl<'a> Default for BuildOptions<'a> {
    fn default() -> Self {
        BuildOptions {
            password: String::new(),
            version_tag: None,
            compression: Compression::Gzip,
            level: 6,
            progress: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildStats {
    pub total_files: u64,
    pub airports_count: u64,
    pub original_size: u64,
    pub compressed_size: u64,
    pub final_size: u64,
    pub compression_ratio: f64,
}

struct ScannedFile {
    id: String,
    airport: String,
    category: String,
    path: PathBuf,
    filename: String,
    title: String,
    chart_number: Option<String>,
    runway: Option<String>,
    procedure: Option<String>,
}

fn chart_name_re() -> Regex {
    Regex::new(r"(?i)^([A-Z]{4}-[0-9A-Z]+)-(.+)\.pdf$").expect("valid regex")
}

fn runway_re() -> Regex {
    Regex::new(r"(?i)RWY\s*([0-9LRC-]+)").expect("valid regex")
}

fn procedure_re() -> Regex {
    Regex::new(r"\(([^)]+)\)").expect("valid regex")
}

fn normalize_category(raw: &str) -> String {
    raw.trim().replace(' ', "_").to_uppercase()
}

fn parse_chart_filename(path: &Path, airport: &str, category: &str) -> ScannedFile {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let id = format!(
        "{}_{}_{}",
        airport.to_lowercase(),
        category.to_lowercase(),
        &md5_hex(&filename)[..8]
    );

    let name_re = chart_name_re();
    let (chart_number, title, runway, procedure) = match name_re.captures(&filename) {
        Some(caps) => {
            let chart_number = caps.get(1).map(|m| m.as_str().to_uppercase());
            let title = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            let runway = runway_re()
                .captures(&title)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            let procedure = procedure_re()
                .captures(&title)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            (chart_number, title, runway, procedure)
        }
        None => (
            None,
            filename.trim_end_matches(".pdf").trim_end_matches(".PDF").to_string(),
            None,
            None,
        ),
    };

    ScannedFile {
        id,
        airport: airport.to_string(),
        category: category.to_string(),
        path: path.to_path_buf(),
        filename,
        title,
        chart_number,
        runway,
        procedure,
    }
}

fn md5_hex(s: &str) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn scan_source_tree(source_dir: &Path) -> std::io::Result<Vec<ScannedFile>> {
    let mut files = Vec::new();

    for airport_entry in fs::read_dir(source_dir)? {
        let airport_entry = airport_entry?;
        if !airport_entry.file_type()?.is_dir() {
            continue;
        }
        let airport_name = airport_entry.file_name().to_string_lossy().into_owned();
        if airport_name.chars().count() != 4 {
            continue;
        }

        for category_entry in fs::read_dir(airport_entry.path())? {
            let category_entry = category_entry?;
            if !category_entry.file_type()?.is_dir() {
                continue;
            }
            let category = normalize_category(&category_entry.file_name().to_string_lossy());

            for pdf_entry in fs::read_dir(category_entry.path())? {
                let pdf_entry = pdf_entry?;
                if !pdf_entry.file_type()?.is_file() {
                    continue;
                }
                let path = pdf_entry.path();
                let is_pdf = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false);
                if !is_pdf {
                    continue;
                }
                files.push(parse_chart_filename(&path, &airport_name, &category));
            }
        }
    }

    files.sort_by(|a, b| {
        (&a.airport, &a.category, &a.filename).cmp(&(&b.airport, &b.category, &b.filename))
    });

    Ok(files)
}

fn standard_categories() -> Vec<CategorySummary> {
    Category::all()
        .iter()
        .map(|c| CategorySummary {
            code: c.code().to_string(),
            display_name: c.display_name().to_string(),
            file_count: 0,
        })
        .collect()
}

fn compress(data: &[u8], mode: Compression, level: u32) -> std::io::Result<Vec<u8>> {
    match mode {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level.clamp(1, 9)));
            encoder.write_all(data)?;
            encoder.finish()
        }
    }
}

/// Scans `source_dir`, seals every chart into `output_path` as a new ECP,
/// using the two-pass offset-resolution algorithm. Leaves no partial file at
/// `output_path` on failure.
pub fn create_package(
    source_dir: &Path,
    output_path: &Path,
    opts: BuildOptions,
) -> Result<BuildStats, BuilderError> {
    crypto::password_strength(&opts.password).map_err(|reason| {
        tracing::error!(%reason, "package build rejected: weak password");
        BuilderError::WeakPassword(reason)
    })?;

    if !source_dir.is_dir() {
        return Err(BuilderError::SourceNotFound(source_dir.to_path_buf()));
    }

    let scanned = scan_source_tree(source_dir)?;
    tracing::info!(source = %source_dir.display(), files = scanned.len(), "scanned source tree");

    let mut progress = opts.progress;
    if let Some(cb) = progress.as_deref_mut() {
        if !cb(0, scanned.len() as u64, "scanning files") {
            return Err(BuilderError::Interrupted);
        }
    }

    let master_salt = crypto::generate_salt();
    let master_key = Secret::new(crypto::derive_master_key(
        &opts.password,
        &master_salt,
        crypto::DEFAULT_PBKDF2_ITERATIONS,
    )?);

    let total = scanned.len() as u64;
    let mut entries = Vec::with_capacity(scanned.len());
    let mut sealed_blocks = Vec::with_capacity(scanned.len());
    let mut running_offset: u64 = 0;
    let mut total_original: u64 = 0;
    let mut total_compressed: u64 = 0;

    for (idx, file) in scanned.iter().enumerate() {
        let plaintext = fs::read(&file.path)?;
        let original_size = plaintext.len() as u64;
        let file_hash = crypto::sha256_hex(&plaintext);
        let compressed = compress(&plaintext, opts.compression, opts.level)?;
        let compressed_size = compressed.len() as u64;

        let (sealed, iv) = crypto::encrypt(
            &compressed,
            master_key.expose_secret(),
            None,
            file.id.as_bytes(),
        )?;

        entries.push(Entry {
            id: file.id.clone(),
            airport: file.airport.clone(),
            category: file.category.clone(),
            filename: file.filename.clone(),
            title: file.title.clone(),
            chart_number: file.chart_number.clone(),
            runway: file.runway.clone(),
            procedure: file.procedure.clone(),
            offset: running_offset,
            compressed_size,
            original_size,
            iv: crypto::encode_base64(&iv),
            file_hash,
            created_at: now_iso8601(),
        });

        running_offset += sealed.len() as u64;
        total_original += original_size;
        total_compressed += compressed_size;
        sealed_blocks.push(sealed);

        if let Some(cb) = progress.as_deref_mut() {
            let pct = ((idx as u64 + 1) * 70) / total;
            if !cb(pct, 100, &format!("sealing {}/{}", idx + 1, total)) {
                return Err(BuilderError::Interrupted);
            }
        }
    }

    let mut airports: Vec<Airport> = Vec::new();
    for entry in &entries {
        match airports.iter_mut().find(|a| a.icao == entry.airport) {
            Some(a) => a.file_count += 1,
            None => airports.push(Airport {
                icao: entry.airport.clone(),
                display_name: None,
                file_count: 1,
            }),
        }
    }
    airports.sort_by(|a, b| a.icao.cmp(&b.icao));

    let mut categories = standard_categories();
    for entry in &entries {
        if let Some(cat) = categories.iter_mut().find(|c| c.code == entry.category) {
            cat.file_count += 1;
        }
    }

    let compression_ratio = if total_original == 0 {
        0.0
    } else {
        total_compressed as f64 / total_original as f64
    };

    let version_tag = opts
        .version_tag
        .unwrap_or_else(|| format!("AIPK{}", now_year_month()));

    let package_info = PackageInfo {
        format_version: version_tag.clone(),
        total_files: entries.len() as u64,
        total_data_size: total_original,
        compressed_size: total_compressed,
        compression_ratio,
        created_at: now_iso8601(),
    };

    if let Some(cb) = progress.as_deref_mut() {
        if !cb(0, 100, "building index") {
            return Err(BuilderError::Interrupted);
        }
    }

    let mut index = Index {
        package_info,
        airports,
        categories,
        files: entries,
    };

    let index_iv = crypto::generate_iv();

    // First pass: offsets are relative to the data region start.
    let sealed_index = seal_index(&index, master_key.expose_secret(), index_iv)?;
    let data_start = HEADER_LEN as u64 + sealed_index.len() as u64;

    // Second pass: fix up offsets to be absolute, reseal with the same IV.
    for entry in index.files.iter_mut() {
        entry.offset += data_start;
    }
    let sealed_index = seal_index(&index, master_key.expose_secret(), index_iv)?;

    let tmp_path = output_path.with_extension(append_tmp_extension(output_path));
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let write_result = write_package(
        &tmp_path,
        &master_salt,
        index_iv,
        &sealed_index,
        &sealed_blocks,
        &index,
        opts.compression,
        &version_tag,
        &mut progress,
    );

    match write_result {
        Ok(()) => {}
        Err(e) => {
            tracing::error!(error = %e, "package write failed, removing temporary file");
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
    }

    if output_path.exists() {
        fs::remove_file(output_path)?;
    }
    fs::rename(&tmp_path, output_path)?;

    if let Some(cb) = progress.as_deref_mut() {
        // The package is already in its final location; a cancellation signal
        // here has nothing left to stop.
        cb(100, 100, "package created");
    }

    tracing::info!(
        output = %output_path.display(),
        total_files = index.files.len(),
        "package build complete"
    );

    let final_size = fs::metadata(output_path)?.len();

    Ok(BuildStats {
        total_files: index.files.len() as u64,
        airports_count: index.airports.len() as u64,
        original_size: total_original,
        compressed_size: total_compressed,
        final_size,
        compression_ratio,
    })
}

fn seal_index(
    index: &Index,
    master_key: &[u8; crypto::KEY_LEN],
    iv: [u8; crypto::IV_LEN],
) -> Result<Vec<u8>, BuilderError> {
    let json = index.to_json_bytes()?;
    let (sealed, _) = crypto::encrypt(&json, master_key, Some(iv), INDEX_AAD)?;
    Ok(sealed)
}

#[allow(clippy::too_many_arguments)]
fn write_package(
    tmp_path: &Path,
    master_salt: &[u8; crypto::SALT_LEN],
    index_iv: [u8; crypto::IV_LEN],
    sealed_index: &[u8],
    sealed_blocks: &[Vec<u8>],
    index: &Index,
    compression: Compression,
    version_tag: &str,
    progress: &mut Option<&mut ProgressCallback<'_>>,
) -> Result<(), BuilderError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(tmp_path)?;

    let placeholder = Header::placeholder(*master_salt, version_tag);
    file.write_all(&placeholder.to_bytes())?;
    file.write_all(sealed_index)?;

    let total_blocks = sealed_blocks.len() as u64;
    for (idx, block) in sealed_blocks.iter().enumerate() {
        file.write_all(block)?;
        if let Some(cb) = progress.as_deref_mut() {
            let pct = 70 + ((idx as u64 + 1) * 20) / total_blocks.max(1);
            if !cb(pct, 100, &format!("writing block {}/{}", idx + 1, total_blocks)) {
                return Err(BuilderError::Interrupted);
            }
        }
    }

    if let Some(cb) = progress.as_deref_mut() {
        if !cb(0, 100, "hashing package body") {
            return Err(BuilderError::Interrupted);
        }
    }

    file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
    let mut hasher_input = Vec::new();
    file.read_to_end(&mut hasher_input)?;
    let body_digest = crypto::compute_sha256(&hasher_input);
    let mut body_hash = [0u8; crate::format::BODY_HASH_FIELD_LEN];
    body_hash[..32].copy_from_slice(&body_digest);

    let mut final_header = Header::placeholder(*master_salt, version_tag);
    final_header.index_offset = HEADER_LEN as u64;
    final_header.index_length = sealed_index.len() as u64;
    final_header.index_iv[..12].copy_from_slice(&index_iv);
    final_header.body_hash = body_hash;
    final_header.created_timestamp = now_unix_timestamp();
    final_header.total_files = index.files.len() as u64;
    final_header.total_data_size = index.package_info.total_data_size;
    final_header.compression_algo = match compression {
        Compression::Gzip => crate::format::CompressionAlgo::Gzip as u32,
        Compression::None => crate::format::CompressionAlgo::None as u32,
    };

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&final_header.to_bytes())?;
    file.sync_all()?;

    Ok(())
}

fn append_tmp_extension(path: &Path) -> std::ffi::OsString {
    let mut ext = path
        .extension()
        .map(|e| e.to_os_string())
        .unwrap_or_default();
    if !ext.is_empty() {
        ext.push(".");
    }
    ext.push("tmp");
    ext
}

fn now_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn now_year_month() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_chart(dir: &Path, airport: &str, category: &str, filename: &str, body: &[u8]) {
        let cat_dir = dir.join(airport).join(category);
        fs::create_dir_all(&cat_dir).unwrap();
        fs::write(cat_dir.join(filename), body).unwrap();
    }

    #[test]
    fn scan_source_tree_finds_nested_pdfs() {
        let src = TempDir::new().unwrap();
        write_chart(
            src.path(),
            "ZBAA",
            "SID",
            "ZBAA-7A01-SID RNAV RWY01-36L-36R(IDKEX).pdf",
            b"%PDF-1.4\ncontent\n%%EOF\n",
        );
        write_chart(src.path(), "ZBAA", "IAC", "plain.pdf", b"%PDF-1.4\nother\n%%EOF\n");

        let files = scan_source_tree(src.path()).unwrap();
        assert_eq!(files.len(), 2);
        let sid = files.iter().find(|f| f.category == "SID").unwrap();
        assert_eq!(sid.airport, "ZBAA");
        assert_eq!(sid.chart_number.as_deref(), Some("ZBAA-7A01"));
        assert_eq!(sid.runway.as_deref(), Some("01-36L-36R"));
        assert_eq!(sid.procedure.as_deref(), Some("IDKEX"));

        let plain = files.iter().find(|f| f.category == "IAC").unwrap();
        assert_eq!(plain.chart_number, None);
        assert_eq!(plain.title, "plain");
    }

    #[test]
    fn scan_source_tree_skips_non_four_char_dirs() {
        let src = TempDir::new().unwrap();
        write_chart(src.path(), "ZZZ", "SID", "a.pdf", b"x");
        write_chart(src.path(), "ZBAA", "SID", "b.pdf", b"x");
        let files = scan_source_tree(src.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].airport, "ZBAA");
    }

    #[test]
    fn create_package_produces_well_formed_file() {
        let src = TempDir::new().unwrap();
        let body = format!("%PDF-1.4\n{}\n%%EOF\n", "Test content line\n".repeat(1000));
        write_chart(
            src.path(),
            "ZBAA",
            "SID",
            "ZBAA-7A01-SID RNAV RWY01-36L-36R(IDKEX).pdf",
            body.as_bytes(),
        );

        let out_dir = TempDir::new().unwrap();
        let out_path = out_dir.path().join("test.aipk");

        let opts = BuildOptions {
            password: "TestPassword123!".to_string(),
            compression: Compression::Gzip,
            level: 6,
            ..Default::default()
        };

        let stats = create_package(src.path(), &out_path, opts).unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.airports_count, 1);
        assert!(out_path.exists());

        let raw = fs::read(&out_path).unwrap();
        let header = Header::from_bytes(&raw[..HEADER_LEN]).unwrap();
        assert_eq!(header.total_files, 1);
        let body_digest = crypto::compute_sha256(&raw[HEADER_LEN..]);
        assert_eq!(&header.body_hash[..32], &body_digest[..]);
    }

    #[test]
    fn create_package_rejects_weak_password() {
        let src = TempDir::new().unwrap();
        write_chart(src.path(), "ZBAA", "SID", "a.pdf", b"%PDF-1.4\nx\n%%EOF\n");
        let out_dir = TempDir::new().unwrap();
        let out_path = out_dir.path().join("test.aipk");

        let opts = BuildOptions {
            password: "weak".to_string(),
            ..Default::default()
        };

        let result = create_package(src.path(), &out_path, opts);
        assert!(matches!(result, Err(BuilderError::WeakPassword(_))));
        assert!(!out_path.exists());
    }

    #[test]
    fn create_package_succeeds_on_empty_source() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("Terminal")).unwrap();
        let out_dir = TempDir::new().unwrap();
        let out_path = out_dir.path().join("test.aipk");

        let opts = BuildOptions {
            password: "TestPassword123!".to_string(),
            ..Default::default()
        };

        let stats = create_package(src.path(), &out_path, opts).unwrap();
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.airports_count, 0);
        assert!(out_path.exists());

        let raw = fs::read(&out_path).unwrap();
        let header = Header::from_bytes(&raw[..HEADER_LEN]).unwrap();
        assert_eq!(header.total_files, 0);
    }

    #[test]
    fn create_package_rejects_missing_source_dir() {
        let out_dir = TempDir::new().unwrap();
        let out_path = out_dir.path().join("test.aipk");
        let opts = BuildOptions {
            password: "TestPassword123!".to_string(),
            ..Default::default()
        };
        let result = create_package(Path::new("/nonexistent/source/tree"), &out_path, opts);
        assert!(matches!(result, Err(BuilderError::SourceNotFound(_))));
        assert!(!out_path.exists());
    }
}
