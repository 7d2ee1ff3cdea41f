//! Scarica, a self-hosted media download server.
//!
//! The binary wires these modules together; they are public so the
//! end-to-end tests can drive them directly.

pub mod analyzer;
pub mod config;
pub mod download;
pub mod server;
pub mod sqlite_persistence;

pub use analyzer::{MediaAnalyzer, YtDlpAnalyzer};
pub use download::{DownloadService, JobStore, SqliteJobStore};
pub use server::{run_server, RequestsLoggingLevel};
