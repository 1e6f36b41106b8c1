//! Ingest Hand-off
//!
//! Accepted artifacts are announced to a downstream processor (text
//! extraction, embedding, indexing) through an [`IngestSink`]. Hand-off is
//! fire-and-forget: a slow or absent consumer never fails an upload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::StoredArtifact;

/// Default queue depth for the channel sink
pub const DEFAULT_INGEST_QUEUE_DEPTH: usize = 256;

/// Message describing a newly stored artifact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJob {
    pub original_name: String,
    pub artifact: StoredArtifact,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Ingest queue is full")]
    QueueFull,

    #[error("Ingest queue is closed")]
    QueueClosed,
}

/// Destination for ingest jobs
#[async_trait::async_trait]
pub trait IngestSink: Send + Sync {
    async fn submit(&self, job: IngestJob) -> Result<(), IngestError>;
}

/// Sink backed by a bounded tokio channel
#[derive(Clone)]
pub struct ChannelIngestSink {
    tx: mpsc::Sender<IngestJob>,
}

impl ChannelIngestSink {
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<IngestJob>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl IngestSink for ChannelIngestSink {
    async fn submit(&self, job: IngestJob) -> Result<(), IngestError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => IngestError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => IngestError::QueueClosed,
        })
    }
}

/// Drain the queue, logging each job.
///
/// Stands in for the document processor; exits when every sender is gone.
pub fn spawn_ingest_worker(mut rx: mpsc::Receiver<IngestJob>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut processed = 0;
        while let Some(job) = rx.recv().await {
            processed += 1;
            tracing::info!(
                original_name = %job.original_name,
                fingerprint = %job.artifact.fingerprint_hex,
                path = %job.artifact.storage_path.display(),
                uploaded_at = %job.uploaded_at,
                "Queued artifact for ingestion"
            );
        }
        tracing::debug!(processed = processed, "Ingest worker stopped");
        processed
    })
}
