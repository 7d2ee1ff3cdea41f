//! Download module
//!
//! Job records, their SQLite store, the strategy pipeline that drives each
//! download to a terminal state, and the service the HTTP layer talks to.

mod job_store;
mod models;
mod pipeline;
mod progress;
mod schema;
mod service;
pub mod strategies;

pub use job_store::{JobStore, SqliteJobStore};
pub use models::*;
pub use pipeline::{
    DownloadStrategy, PipelineSettings, StrategyOutcome, StrategyPipeline, StrategyRequest,
};
pub use progress::ProgressSink;
pub use service::{DownloadService, FetchOutputError, SubmitError, DEFAULT_SOURCE_PATTERN};
