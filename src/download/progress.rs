//! Progress reporting from strategy attempts into the job store.

use super::job_store::JobStore;
use std::sync::Arc;
use tracing::warn;

/// Handle a strategy uses to report completion percentage for one attempt.
///
/// Reports are best-effort: values are clamped to the 0 to 100 range and
/// storage errors are logged rather than surfaced, so a flaky progress
/// write can never fail an otherwise healthy download.
#[derive(Clone)]
pub struct ProgressSink {
    job_id: String,
    store: Arc<dyn JobStore>,
}

impl ProgressSink {
    pub fn new(job_id: impl Into<String>, store: Arc<dyn JobStore>) -> Self {
        ProgressSink {
            job_id: job_id.into(),
            store,
        }
    }

    /// Record a completion percentage for the current attempt.
    pub fn report(&self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0) as u8;
        if let Err(err) = self.store.update_progress(&self.job_id, clamped) {
            warn!("Failed to store progress for job {}: {}", self.job_id, err);
        }
    }
}
