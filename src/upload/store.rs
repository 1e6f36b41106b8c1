//! Content Store
//!
//! Persists validated payloads under `<fingerprint>.<ext>` in a base
//! directory. Identical content always lands on the same path.
//!
//! Writes go to a hidden `.part` file first, are fsynced, then renamed
//! onto the final path, so a reader never observes a truncated artifact.
//! The temp file is removed on every failure path, including when the
//! writing future is dropped mid-write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256, Sha512};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::types::{StoredArtifact, UploadError, ValidatedPayload};

const PART_SUFFIX: &str = ".part";

// ============================================================================
// Digest Algorithm
// ============================================================================

/// Hash used to fingerprint content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Lowercase hex digest of `data`
    pub fn fingerprint(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(format!("unsupported hash algorithm: {other}")),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("sha256"),
            Self::Sha512 => f.write_str("sha512"),
        }
    }
}

// ============================================================================
// Content Store
// ============================================================================

/// Content-addressed file store rooted at a directory
#[derive(Debug, Clone)]
pub struct ContentStore {
    base_dir: PathBuf,
    algorithm: DigestAlgorithm,
}

impl ContentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_algorithm(base_dir, DigestAlgorithm::default())
    }

    pub fn with_algorithm(base_dir: impl Into<PathBuf>, algorithm: DigestAlgorithm) -> Self {
        Self {
            base_dir: base_dir.into(),
            algorithm,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Final path for a fingerprint and media type
    pub fn path_for(&self, fingerprint_hex: &str, media_type: &str) -> PathBuf {
        self.base_dir
            .join(stored_filename(fingerprint_hex, media_type))
    }

    /// Persist a payload, returning where it landed
    pub async fn store(&self, payload: ValidatedPayload) -> Result<StoredArtifact, UploadError> {
        let fingerprint_hex = self.algorithm.fingerprint(&payload.bytes);
        let stored_filename = stored_filename(&fingerprint_hex, &payload.media_type);
        let storage_path = self.base_dir.join(&stored_filename);

        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(UploadError::StorageError)?;

        let part = PartFile::new(&self.base_dir, &fingerprint_hex);
        write_part(part.path(), &payload.bytes)
            .await
            .map_err(UploadError::StorageError)?;
        tokio::fs::rename(part.path(), &storage_path)
            .await
            .map_err(UploadError::StorageError)?;
        part.disarm();

        tracing::info!(
            fingerprint = %fingerprint_hex,
            path = %storage_path.display(),
            size_bytes = payload.size_bytes,
            "Stored artifact"
        );

        Ok(StoredArtifact {
            fingerprint_hex,
            storage_path,
            stored_filename,
            size_bytes: payload.size_bytes,
        })
    }

    /// Remove `.part` files left behind by a crash
    pub async fn sweep_stale_parts(&self) -> Result<usize, UploadError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(UploadError::StorageError(e)),
        };

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(UploadError::StorageError)?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(PART_SUFFIX) {
                tokio::fs::remove_file(entry.path())
                    .await
                    .map_err(UploadError::StorageError)?;
                count += 1;
            }
        }

        if count > 0 {
            tracing::info!(count = count, "Removed stale partial uploads");
        }

        Ok(count)
    }
}

async fn write_part(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Temp file that deletes itself unless disarmed
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(dir: &Path, fingerprint_hex: &str) -> Self {
        Self {
            path: dir.join(format!(".{}.{}{}", fingerprint_hex, Uuid::new_v4(), PART_SUFFIX)),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `<fingerprint>.<ext>`
pub fn stored_filename(fingerprint_hex: &str, media_type: &str) -> String {
    format!("{}.{}", fingerprint_hex, canonical_extension(media_type))
}

/// Extension for a media type; never derived from the client's file name.
///
/// The table below wins over `mime_guess`, whose extension lists are not in
/// preference order. Types outside the table take `mime_guess`'s first entry.
pub fn canonical_extension(media_type: &str) -> &'static str {
    match media_type {
        "application/pdf" => "pdf",
        "application/epub+zip" => "epub",
        "application/x-mobipocket-ebook" => "mobi",
        "application/vnd.amazon.ebook" => "azw",
        "application/zip" => "zip",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/html" => "html",
        "text/csv" => "csv",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/tiff" => "tiff",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

// ============================================================================
// Tests
// ============================================================================
