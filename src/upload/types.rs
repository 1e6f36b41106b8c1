//! Upload types for the validate-then-store pipeline

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

// ============================================================================
// Constants
// ============================================================================

/// Default read chunk size: 1KB
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default maximum file size: 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default batch worker count
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Media type used when a multipart field does not declare one
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

// ============================================================================
// Inbound Types
// ============================================================================

/// Single-pass byte source for an upload
pub type ByteReader<'a> = Pin<Box<dyn AsyncRead + Send + 'a>>;

/// One file as advertised by the client
pub struct UploadDescriptor<'a> {
    /// File name supplied by the client (never used for storage)
    pub declared_name: String,

    /// Media type supplied by the client
    pub declared_media_type: String,

    /// The file contents, consumed at most once
    pub reader: ByteReader<'a>,
}

impl<'a> UploadDescriptor<'a> {
    pub fn new(
        declared_name: impl Into<String>,
        declared_media_type: impl Into<String>,
        reader: impl AsyncRead + Send + 'a,
    ) -> Self {
        Self {
            declared_name: declared_name.into(),
            declared_media_type: declared_media_type.into(),
            reader: Box::pin(reader),
        }
    }
}

impl UploadDescriptor<'static> {
    /// Descriptor over an in-memory buffer
    pub fn from_bytes(
        declared_name: impl Into<String>,
        declared_media_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(
            declared_name,
            declared_media_type,
            std::io::Cursor::new(data.into()),
        )
    }
}

impl fmt::Debug for UploadDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadDescriptor")
            .field("declared_name", &self.declared_name)
            .field("declared_media_type", &self.declared_media_type)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Policy
// ============================================================================

/// What the validator accepts. Built once, shared read-only.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Lowercased media types without parameters
    pub allowed_media_types: HashSet<String>,

    /// Lowercased file extensions; empty disables the extension check
    pub allowed_extensions: HashSet<String>,

    /// Upper bound on accepted payload size
    pub max_bytes: u64,

    /// Reject zero-length payloads
    pub reject_empty: bool,

    /// Size of each read from the byte source
    pub chunk_size: usize,
}

impl ValidationPolicy {
    pub fn new<I, S>(allowed_media_types: I, max_bytes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_media_types: allowed_media_types
                .into_iter()
                .map(|s| normalize_media_type(s.as_ref()))
                .collect(),
            allowed_extensions: HashSet::new(),
            max_bytes,
            reject_empty: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|s| s.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn with_reject_empty(mut self, reject_empty: bool) -> Self {
        self.reject_empty = reject_empty;
        self
    }

    /// Whether a declared media type is on the allow-list
    pub fn allows_media_type(&self, media_type: &str) -> bool {
        self.allowed_media_types
            .contains(&normalize_media_type(media_type))
    }

    /// Whether a declared file name passes the extension allow-list
    pub fn allows_file_name(&self, file_name: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        file_extension(file_name)
            .map(|ext| self.allowed_extensions.contains(&ext))
            .unwrap_or(false)
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::new(["application/pdf"], DEFAULT_MAX_FILE_SIZE)
    }
}

/// Strip parameters (`; charset=...`) and lowercase
pub fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

// ============================================================================
// Pipeline Products
// ============================================================================

/// Bytes that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPayload {
    pub bytes: Vec<u8>,
    pub size_bytes: u64,

    /// Normalized declared media type, used to pick the stored extension
    pub media_type: String,
}

/// A file persisted under its content fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    /// Lowercase hex digest of the content
    pub fingerprint_hex: String,

    /// Full path of the stored file
    pub storage_path: PathBuf,

    /// `<fingerprint>.<ext>`
    pub stored_filename: String,

    pub size_bytes: u64,
}

/// Result for one item of an upload request
#[derive(Debug)]
pub enum UploadOutcome {
    Accepted {
        original_name: String,
        artifact: StoredArtifact,
    },
    Rejected {
        original_name: String,
        reason: UploadError,
    },
}

impl UploadOutcome {
    pub fn original_name(&self) -> &str {
        match self {
            Self::Accepted { original_name, .. } | Self::Rejected { original_name, .. } => {
                original_name
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

// ============================================================================
// Batch Types
// ============================================================================

/// Aggregate status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item accepted
    Success,
    /// At least one accepted and at least one rejected
    PartialFailure,
    /// Every item rejected
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_filename: String,
    pub stored_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub original_filename: String,
    pub error_reason: String,
    pub error_code: String,
}

/// Outbound shape of a batch upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<FailedFile>,
    pub status: BatchStatus,
}

/// Outbound shape of a single upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleUploadResponse {
    pub stored_filename: String,
    pub message: String,
}

// ============================================================================
// Error Types
// ============================================================================

/// Per-item upload failure
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("File too large (max: {limit} bytes)")]
    TooLarge { limit: u64 },

    #[error("Transfer error: {0}")]
    TransferError(#[source] std::io::Error),

    #[error("Storage error: {0}")]
    StorageError(#[source] std::io::Error),

    #[error("Too many files in one request (max: {limit})")]
    BatchLimit { limit: usize },
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidType(_) => StatusCode::BAD_REQUEST,
            Self::EmptyFile => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TransferError(_) => StatusCode::BAD_REQUEST,
            Self::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BatchLimit { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidType(_) => "INVALID_FILE_TYPE",
            Self::EmptyFile => "EMPTY_FILE",
            Self::TooLarge { .. } => "FILE_TOO_LARGE",
            Self::TransferError(_) => "TRANSFER_ERROR",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::BatchLimit { .. } => "TOO_MANY_FILES",
        }
    }
}
