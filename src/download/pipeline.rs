//! Ordered fallback execution of download strategies.
//!
//! A job is handed to each configured strategy in turn until one produces
//! the output file. Strategies are isolated behind [`StrategyOutcome`]: a
//! misbehaving downloader can fail its own attempt but cannot take the
//! pipeline down with it.

use super::job_store::JobStore;
use super::models::DownloadFormat;
use super::progress::ProgressSink;
use crate::server::metrics;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What a single strategy attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// The output file exists at the given path.
    Success(PathBuf),
    /// This attempt failed but a later strategy may still succeed.
    Retryable(String),
    /// The request itself is unusable, trying further strategies is pointless.
    Fatal(String),
}

/// Everything a strategy needs to know about the download it is attempting.
#[derive(Debug, Clone)]
pub struct StrategyRequest {
    pub job_id: String,
    pub source_url: String,
    pub format: DownloadFormat,
    /// Display title, for log lines only. The output path is already fixed.
    pub title: Option<String>,
    pub output_path: PathBuf,
}

/// A single way of obtaining the media file.
///
/// Implementations express every failure through the returned outcome and
/// never panic; a strategy that produced [`StrategyOutcome::Success`] must
/// have written the file at the requested output path.
#[async_trait]
pub trait DownloadStrategy: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn run(&self, request: &StrategyRequest, progress: &ProgressSink) -> StrategyOutcome;
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Wall-clock budget for a single strategy attempt.
    pub attempt_timeout: Duration,
    /// Pause between the end of one attempt and the start of the next.
    pub inter_attempt_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            attempt_timeout: Duration::from_secs(900),
            inter_attempt_delay: Duration::from_secs(2),
        }
    }
}

/// Runs the configured strategies in order for one job at a time.
pub struct StrategyPipeline {
    strategies: Vec<Arc<dyn DownloadStrategy>>,
    store: Arc<dyn JobStore>,
    settings: PipelineSettings,
    shutdown: CancellationToken,
}

impl StrategyPipeline {
    pub fn new(
        strategies: Vec<Arc<dyn DownloadStrategy>>,
        store: Arc<dyn JobStore>,
        settings: PipelineSettings,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        if strategies.is_empty() {
            bail!("At least one download strategy must be configured");
        }
        Ok(StrategyPipeline {
            strategies,
            store,
            settings,
            shutdown,
        })
    }

    /// Drive one job to a terminal state.
    ///
    /// Every error path ends in a store write, never in a propagated error:
    /// callers spawn this and walk away.
    pub async fn run(&self, request: StrategyRequest) {
        let _active = metrics::track_active_download();
        let job_id = request.job_id.clone();
        let progress = ProgressSink::new(job_id.clone(), self.store.clone());
        let total = self.strategies.len();

        for (index, strategy) in self.strategies.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        warn!("Job {}: shutting down before attempt {}", job_id, index + 1);
                        self.finish_failed(&job_id, Some("interrupted by shutdown"));
                        return;
                    }
                    _ = tokio::time::sleep(self.settings.inter_attempt_delay) => {}
                }
            }

            match self.store.begin_attempt(&job_id) {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Job {} is already terminal, skipping remaining attempts", job_id);
                    return;
                }
                Err(err) => {
                    error!("Failed to begin attempt for job {}: {}", job_id, err);
                    return;
                }
            }

            info!(
                "Job {}: attempt {}/{} via {}",
                job_id,
                index + 1,
                total,
                strategy.name()
            );

            let attempt = strategy.run(&request, &progress);
            let outcome = match tokio::time::timeout(self.settings.attempt_timeout, attempt).await
            {
                Ok(outcome) => outcome,
                // Dropping the attempt future tears down whatever child
                // process or connection the strategy had open.
                Err(_) => StrategyOutcome::Retryable(format!(
                    "timed out after {}s",
                    self.settings.attempt_timeout.as_secs()
                )),
            };

            match outcome {
                StrategyOutcome::Success(path) => {
                    metrics::record_strategy_attempt(strategy.name(), "success");
                    let location = path.to_string_lossy().to_string();
                    match self.store.mark_completed(&job_id, &location) {
                        Ok(true) => {
                            metrics::record_job_finished("completed");
                            info!("Job {} completed via {}: {}", job_id, strategy.name(), location)
                        }
                        Ok(false) => warn!(
                            "Job {} was already terminal when {} succeeded",
                            job_id,
                            strategy.name()
                        ),
                        Err(err) => {
                            error!("Failed to mark job {} completed: {}", job_id, err)
                        }
                    }
                    return;
                }
                StrategyOutcome::Retryable(reason) => {
                    metrics::record_strategy_attempt(strategy.name(), "retryable");
                    warn!("Job {}: {} failed: {}", job_id, strategy.name(), reason);
                    if let Err(err) = self.store.record_attempt_error(&job_id, &reason) {
                        error!("Failed to record attempt error for job {}: {}", job_id, err);
                    }
                }
                StrategyOutcome::Fatal(reason) => {
                    metrics::record_strategy_attempt(strategy.name(), "fatal");
                    warn!(
                        "Job {}: {} reported an unrecoverable error: {}",
                        job_id,
                        strategy.name(),
                        reason
                    );
                    self.finish_failed(&job_id, Some(&reason));
                    return;
                }
            }
        }

        info!("Job {}: every strategy failed after {} attempts", job_id, total);
        // Keep the reason recorded by the final attempt.
        self.finish_failed(&job_id, None);
    }

    fn finish_failed(&self, job_id: &str, reason: Option<&str>) {
        match self.store.mark_failed(job_id, reason) {
            Ok(true) => metrics::record_job_finished("failed"),
            Ok(false) => {}
            Err(err) => error!("Failed to mark job {} failed: {}", job_id, err),
        }
    }
}
