//! Job submission and lookup.
//!
//! The HTTP layer talks to [`DownloadService`] and nothing else. Submission
//! validates the URL, persists a pending record and spawns the pipeline in
//! the background; the call returns as soon as the record exists.

use super::job_store::JobStore;
use super::models::{DownloadFormat, DownloadJob, JobStatus};
use super::pipeline::{StrategyPipeline, StrategyRequest};
use crate::server::metrics;
use anyhow::Result;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Sources accepted by default: watch page URLs in the common shapes, plus
/// links that point straight at a media file.
pub const DEFAULT_SOURCE_PATTERN: &str =
    r"(watch\?v=|/shorts/|youtu\.be/|\.(mp4|m4a|webm|mp3)(\?.*)?$)";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL does not match any supported source")]
    UnsupportedSource,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum FetchOutputError {
    /// Covers unknown jobs, jobs that are not completed and output files
    /// that are gone from disk. The distinction is deliberately kept to the
    /// logs so callers cannot probe for half-finished downloads.
    #[error("Output not available")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub struct DownloadService {
    store: Arc<dyn JobStore>,
    pipeline: Arc<StrategyPipeline>,
    output_dir: PathBuf,
    allowed_source: Regex,
}

impl DownloadService {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Arc<StrategyPipeline>,
        output_dir: PathBuf,
        allowed_source: Regex,
    ) -> Self {
        Self {
            store,
            pipeline,
            output_dir,
            allowed_source,
        }
    }

    /// Validate and enqueue a new download. Returns the pending record
    /// immediately; the actual download happens in a background task.
    pub fn submit(
        &self,
        source_url: &str,
        format: DownloadFormat,
        title: Option<String>,
    ) -> Result<DownloadJob, SubmitError> {
        let parsed =
            Url::parse(source_url).map_err(|err| SubmitError::InvalidUrl(err.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SubmitError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        if !self.allowed_source.is_match(source_url) {
            return Err(SubmitError::UnsupportedSource);
        }

        let id = Uuid::new_v4().to_string();
        let job = DownloadJob::new(id.clone(), source_url.to_string(), format).with_title(title);
        self.store.create(job.clone())?;
        metrics::record_job_submitted(format.as_str());
        info!("Job {} submitted for {} as {}", id, source_url, format.as_str());

        let request = StrategyRequest {
            job_id: id,
            source_url: source_url.to_string(),
            format,
            title: job.title.clone(),
            output_path: self.output_path_for(&job.id, format),
        };
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            pipeline.run(request).await;
        });

        Ok(job)
    }

    /// Get a job by ID.
    pub fn job(&self, id: &str) -> Result<Option<DownloadJob>> {
        self.store.get(id)
    }

    /// All jobs, most recent first.
    pub fn list(&self) -> Result<Vec<DownloadJob>> {
        self.store.list_recent_first()
    }

    /// Resolve the output file of a completed job.
    pub async fn output_file(&self, id: &str) -> Result<(DownloadJob, PathBuf), FetchOutputError> {
        let job = self
            .store
            .get(id)
            .map_err(FetchOutputError::Storage)?
            .ok_or(FetchOutputError::NotFound)?;

        if job.status != JobStatus::Completed {
            info!(
                "Output requested for job {} which is {} rather than completed",
                id,
                job.status.as_str()
            );
            return Err(FetchOutputError::NotFound);
        }

        let location = match &job.output_location {
            Some(location) => PathBuf::from(location),
            None => {
                warn!("Completed job {} has no output location", id);
                return Err(FetchOutputError::NotFound);
            }
        };

        if tokio::fs::metadata(&location).await.is_err() {
            warn!(
                "Output file for job {} vanished from {}",
                id,
                location.display()
            );
            return Err(FetchOutputError::NotFound);
        }

        Ok((job, location))
    }

    /// Fail whatever a previous process run left unfinished.
    pub fn fail_interrupted_jobs(&self) -> Result<usize> {
        let swept = self.store.fail_interrupted("interrupted by restart")?;
        if swept > 0 {
            info!("Failed {} jobs left over from a previous run", swept);
        }
        Ok(swept)
    }

    fn output_path_for(&self, id: &str, format: DownloadFormat) -> PathBuf {
        self.output_dir.join(format!("{}.{}", id, format.extension()))
    }
}
