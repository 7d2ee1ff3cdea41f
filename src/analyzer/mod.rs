//! Source analysis
//!
//! Probes a URL without downloading it and summarizes what is there: title,
//! channel, duration and the download format options worth offering.

mod models;
mod ytdlp;

pub use models::{FormatOption, MediaSummary};
pub use ytdlp::{AnalyzeError, YtDlpAnalyzer};

use async_trait::async_trait;

#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    async fn analyze(&self, url: &str) -> Result<MediaSummary, AnalyzeError>;
}
