//! Scripted strategies and analyzer for end-to-end tests
//!
//! The real strategies fetch over the network or shell out to yt-dlp, so the
//! test server swaps in these deterministic stand-ins. Their behavior is
//! keyed off the source URL: URLs carrying [`FAIL_MARKER`] are refused,
//! everything else succeeds with a canned payload.

use super::constants::*;
use async_trait::async_trait;
use scarica_server::analyzer::{
    AnalyzeError, FormatOption, MediaAnalyzer, MediaSummary,
};
use scarica_server::download::{
    DownloadStrategy, ProgressSink, StrategyOutcome, StrategyRequest,
};

/// Refuses every request so the pipeline falls through to the next strategy.
pub(crate) struct RefusingStrategy;

#[async_trait]
impl DownloadStrategy for RefusingStrategy {
    fn name(&self) -> &'static str {
        "test-refusing"
    }

    async fn run(&self, _request: &StrategyRequest, _progress: &ProgressSink) -> StrategyOutcome {
        StrategyOutcome::Retryable("simulated network failure".to_string())
    }
}

/// Writes the canned payload at the requested output path, unless the URL
/// carries the failure marker.
pub(crate) struct ScriptedStrategy;

#[async_trait]
impl DownloadStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        "test-scripted"
    }

    async fn run(&self, request: &StrategyRequest, progress: &ProgressSink) -> StrategyOutcome {
        if request.source_url.contains(FAIL_MARKER) {
            return StrategyOutcome::Retryable("simulated source outage".to_string());
        }

        progress.report(40.0);
        if let Err(err) = tokio::fs::write(&request.output_path, TEST_MEDIA_BYTES).await {
            return StrategyOutcome::Fatal(format!("cannot write output file: {}", err));
        }
        progress.report(100.0);
        StrategyOutcome::Success(request.output_path.clone())
    }
}

/// Returns a canned summary without touching the network.
pub(crate) struct ScriptedAnalyzer;

#[async_trait]
impl MediaAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, url: &str) -> Result<MediaSummary, AnalyzeError> {
        if url.contains(SLOW_MARKER) {
            return Err(AnalyzeError::TimedOut(1));
        }
        if url.contains(FAIL_MARKER) {
            return Err(AnalyzeError::Failed("simulated source outage".to_string()));
        }

        Ok(MediaSummary {
            title: ANALYZED_TITLE.to_string(),
            duration_label: ANALYZED_DURATION.to_string(),
            thumbnail_url: Some("https://example.com/thumb.jpg".to_string()),
            channel_name: ANALYZED_CHANNEL.to_string(),
            view_count_label: Some("1.2M views".to_string()),
            publish_date_label: Some("Jan 31, 2024".to_string()),
            formats: vec![
                FormatOption {
                    container: "mp4".to_string(),
                    quality_label: "1080p".to_string(),
                    size_label: Some("120.0 MB".to_string()),
                },
                FormatOption {
                    container: "mp4".to_string(),
                    quality_label: "720p".to_string(),
                    size_label: Some("64.5 MB".to_string()),
                },
                FormatOption {
                    container: "m4a".to_string(),
                    quality_label: "audio".to_string(),
                    size_label: None,
                },
            ],
        })
    }
}
