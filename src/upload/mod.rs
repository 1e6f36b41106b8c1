//! Upload Pipeline
//!
//! Streaming validation and content-addressed persistence:
//! - Declared type and extension allow-lists checked before reading
//! - Chunked reads with an early abort once the size limit is passed
//! - SHA-256 (or SHA-512) fingerprint as the stored file name
//! - Atomic temp-file + rename writes
//!
//! Flow:
//! 1. `validator::validate` turns an `UploadDescriptor` into a `ValidatedPayload`
//! 2. `ContentStore::store` persists it as `<fingerprint>.<ext>`
//! 3. `batch` collects one `UploadOutcome` per item, in input order
//! 4. Accepted artifacts are handed to an `IngestSink`

pub mod batch;
pub mod ingest;
pub mod store;
pub mod types;
pub mod validator;

pub use batch::{process_batch, process_one, UploadPipeline};
pub use ingest::{spawn_ingest_worker, ChannelIngestSink, IngestError, IngestJob, IngestSink};
pub use store::{canonical_extension, ContentStore, DigestAlgorithm};
pub use types::*;
pub use validator::validate;
