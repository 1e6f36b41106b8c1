//! Batch Coordinator
//!
//! Runs every upload through validate -> store independently. A failed item
//! becomes a `Rejected` outcome and never stops its siblings; outcomes are
//! returned in input order even when items run concurrently.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use super::ingest::{IngestJob, IngestSink};
use super::store::ContentStore;
use super::types::{
    BatchReport, BatchStatus, FailedFile, UploadDescriptor, UploadOutcome, UploadedFile,
    ValidationPolicy, DEFAULT_BATCH_CONCURRENCY,
};
use super::validator::validate;

/// Validate and store one upload
pub async fn process_one(
    descriptor: UploadDescriptor<'_>,
    policy: &ValidationPolicy,
    store: &ContentStore,
) -> UploadOutcome {
    let original_name = descriptor.declared_name.clone();

    let result = match validate(descriptor, policy).await {
        Ok(payload) => store.store(payload).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(artifact) => UploadOutcome::Accepted {
            original_name,
            artifact,
        },
        Err(reason) => {
            tracing::warn!(
                file_name = %original_name,
                code = reason.code(),
                error = %reason,
                "Upload rejected"
            );
            UploadOutcome::Rejected {
                original_name,
                reason,
            }
        }
    }
}

/// Process uploads with at most `concurrency` in flight, preserving order
pub async fn process_batch<'a, I>(
    descriptors: I,
    policy: &ValidationPolicy,
    store: &ContentStore,
    concurrency: usize,
) -> Vec<UploadOutcome>
where
    I: IntoIterator<Item = UploadDescriptor<'a>>,
{
    stream::iter(descriptors)
        .map(|descriptor| process_one(descriptor, policy, store))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

impl BatchStatus {
    /// An empty batch counts as success
    pub fn from_outcomes(outcomes: &[UploadOutcome]) -> Self {
        let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
        if accepted == outcomes.len() {
            Self::Success
        } else if accepted == 0 {
            Self::Failure
        } else {
            Self::PartialFailure
        }
    }
}

impl BatchReport {
    pub fn from_outcomes(outcomes: &[UploadOutcome]) -> Self {
        let mut uploaded = Vec::new();
        let mut failed = Vec::new();

        for outcome in outcomes {
            match outcome {
                UploadOutcome::Accepted {
                    original_name,
                    artifact,
                } => uploaded.push(UploadedFile {
                    original_filename: original_name.clone(),
                    stored_filename: artifact.stored_filename.clone(),
                }),
                UploadOutcome::Rejected {
                    original_name,
                    reason,
                } => failed.push(FailedFile {
                    original_filename: original_name.clone(),
                    error_reason: reason.to_string(),
                    error_code: reason.code().to_string(),
                }),
            }
        }

        Self {
            uploaded,
            failed,
            status: BatchStatus::from_outcomes(outcomes),
        }
    }
}

// ============================================================================
// Upload Pipeline
// ============================================================================

/// Policy, store and ingest hand-off, built once at startup
#[derive(Clone)]
pub struct UploadPipeline {
    policy: Arc<ValidationPolicy>,
    store: ContentStore,
    concurrency: usize,
    ingest: Option<Arc<dyn IngestSink>>,
}

impl UploadPipeline {
    pub fn new(policy: ValidationPolicy, store: ContentStore) -> Self {
        Self {
            policy: Arc::new(policy),
            store,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            ingest: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_ingest_sink(mut self, sink: Arc<dyn IngestSink>) -> Self {
        self.ingest = Some(sink);
        self
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub async fn process_one(&self, descriptor: UploadDescriptor<'_>) -> UploadOutcome {
        let outcome = process_one(descriptor, &self.policy, &self.store).await;
        self.announce(&outcome).await;
        outcome
    }

    pub async fn process_batch<'a, I>(&self, descriptors: I) -> Vec<UploadOutcome>
    where
        I: IntoIterator<Item = UploadDescriptor<'a>>,
    {
        let outcomes =
            process_batch(descriptors, &self.policy, &self.store, self.concurrency).await;
        for outcome in &outcomes {
            self.announce(outcome).await;
        }
        outcomes
    }

    async fn announce(&self, outcome: &UploadOutcome) {
        let (Some(sink), UploadOutcome::Accepted { original_name, artifact }) =
            (&self.ingest, outcome)
        else {
            return;
        };

        let job = IngestJob {
            original_name: original_name.clone(),
            artifact: artifact.clone(),
            uploaded_at: Utc::now(),
        };
        if let Err(e) = sink.submit(job).await {
            tracing::warn!(
                file_name = %original_name,
                error = %e,
                "Failed to hand artifact to ingest queue"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
