//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::upload::{ContentStore, IngestSink, UploadPipeline};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    pipeline: UploadPipeline,
}

impl AppState {
    /// Build the state and its upload pipeline from configuration
    pub fn new(config: Config, ingest: Option<Arc<dyn IngestSink>>) -> Self {
        let store = ContentStore::with_algorithm(
            config.upload.upload_dir.clone(),
            config.upload.hash_algorithm,
        );
        let mut pipeline = UploadPipeline::new(config.upload.policy(), store)
            .with_concurrency(config.upload.batch_concurrency);
        if let Some(sink) = ingest {
            pipeline = pipeline.with_ingest_sink(sink);
        }

        Self {
            inner: Arc::new(AppStateInner { config, pipeline }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload pipeline
    pub fn pipeline(&self) -> &UploadPipeline {
        &self.inner.pipeline
    }
}
