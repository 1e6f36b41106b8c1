//! Configuration management for the Intake server

use std::env;
use std::path::PathBuf;

use crate::upload::{
    DigestAlgorithm, ValidationPolicy, DEFAULT_BATCH_CONCURRENCY, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_FILE_SIZE,
};

/// Default number of files accepted in one batch request
pub const DEFAULT_MAX_BATCH_FILES: usize = 20;

/// Multipart framing allowance on top of file bytes
const REQUEST_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid hash algorithm: {0}")]
    InvalidHashAlgorithm(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub chunk_size: usize,
    pub hash_algorithm: DigestAlgorithm,
    pub batch_concurrency: usize,
    pub max_batch_files: usize,
}

#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Bearer token required on upload routes; `None` disables the check
    pub api_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            upload: UploadConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            upload_dir: PathBuf::from("./uploaded_pdfs"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: vec!["application/pdf".to_string()],
            allowed_extensions: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash_algorithm: DigestAlgorithm::Sha256,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            max_batch_files: DEFAULT_MAX_BATCH_FILES,
        }
    }
}

impl Config {
    /// Load from process environment.
    ///
    /// Any malformed variable is an error; there is no partial fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = UploadConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var(&lookup, "SERVER_PORT", 8000)?,
            },
            upload: UploadConfig {
                upload_dir: lookup("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload_dir),
                max_file_size: parse_var(&lookup, "UPLOAD_MAX_FILE_SIZE", defaults.max_file_size)?,
                allowed_mime_types: list_var(&lookup, "UPLOAD_ALLOWED_MIME_TYPES")
                    .unwrap_or(defaults.allowed_mime_types),
                allowed_extensions: list_var(&lookup, "UPLOAD_ALLOWED_EXTENSIONS")
                    .unwrap_or_default(),
                chunk_size: parse_var(&lookup, "UPLOAD_CHUNK_SIZE", defaults.chunk_size)?,
                hash_algorithm: match lookup("UPLOAD_HASH_ALGORITHM") {
                    Some(value) => value
                        .parse()
                        .map_err(|_| ConfigError::InvalidHashAlgorithm(value))?,
                    None => defaults.hash_algorithm,
                },
                batch_concurrency: parse_var(
                    &lookup,
                    "UPLOAD_BATCH_CONCURRENCY",
                    defaults.batch_concurrency,
                )?,
                max_batch_files: parse_var(&lookup, "UPLOAD_MAX_BATCH_FILES", defaults.max_batch_files)?,
            },
            auth: AuthConfig {
                api_token: lookup("API_TOKEN").filter(|t| !t.is_empty()),
            },
        })
    }
}

impl UploadConfig {
    /// Validation policy for the pipeline
    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy::new(&self.allowed_mime_types, self.max_file_size)
            .with_allowed_extensions(&self.allowed_extensions)
            .with_chunk_size(self.chunk_size)
    }

    /// Body limit for batch requests: every file at the cap plus framing
    pub fn request_body_limit(&self) -> usize {
        let per_file = usize::try_from(self.max_file_size).unwrap_or(usize::MAX);
        per_file
            .saturating_mul(self.max_batch_files.max(1))
            .saturating_add(REQUEST_OVERHEAD_BYTES)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(default),
    }
}

fn list_var<F>(lookup: &F, var: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(var)?;
    Some(
        value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("SERVER_PORT", "9100"),
            ("UPLOAD_MAX_FILE_SIZE", "2048"),
            ("UPLOAD_ALLOWED_MIME_TYPES", "application/pdf, application/epub+zip"),
            ("UPLOAD_HASH_ALGORITHM", "sha512"),
            ("API_TOKEN", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.upload.max_file_size, 2048);
        assert_eq!(config.upload.allowed_mime_types.len(), 2);
        assert_eq!(config.upload.hash_algorithm, DigestAlgorithm::Sha512);
        assert_eq!(config.auth.api_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_malformed_value_is_an_error_not_a_fallback() {
        let result = Config::from_lookup(lookup_from(&[
            ("API_TOKEN", "s3cret"),
            ("UPLOAD_MAX_FILE_SIZE", "10MB"),
        ]));

        match result {
            Err(ConfigError::InvalidValue { var, value }) => {
                assert_eq!(var, "UPLOAD_MAX_FILE_SIZE");
                assert_eq!(value, "10MB");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_hash_algorithm_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("UPLOAD_HASH_ALGORITHM", "md5")]));
        assert!(matches!(result, Err(ConfigError::InvalidHashAlgorithm(v)) if v == "md5"));
    }

    #[test]
    fn test_empty_token_disables_auth() {
        let config = Config::from_lookup(lookup_from(&[("API_TOKEN", "")])).unwrap();
        assert!(config.auth.api_token.is_none());
    }

    #[test]
    fn test_default_policy() {
        let policy = UploadConfig::default().policy();
        assert!(policy.allows_media_type("application/pdf"));
        assert_eq!(policy.max_bytes, 10 * 1024 * 1024);
        assert_eq!(policy.chunk_size, 1024);
        assert!(policy.reject_empty);
        assert!(policy.allowed_extensions.is_empty());
    }

    #[test]
    fn test_request_body_limit() {
        let config = UploadConfig {
            max_file_size: 1000,
            max_batch_files: 3,
            ..UploadConfig::default()
        };
        assert_eq!(config.request_body_limit(), 3000 + REQUEST_OVERHEAD_BYTES);

        let huge = UploadConfig {
            max_file_size: u64::MAX,
            ..UploadConfig::default()
        };
        assert_eq!(huge.request_body_limit(), usize::MAX);
    }

    #[test]
    fn test_token_is_redacted() {
        let auth = AuthConfig {
            api_token: Some("secret".to_string()),
        };
        assert!(!format!("{auth:?}").contains("secret"));
    }
}
