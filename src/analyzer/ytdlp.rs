//! Analysis backed by `yt-dlp --dump-single-json`.

use super::models::{
    duration_label, publish_date_label, size_label, view_count_label, FormatOption, MediaSummary,
};
use super::MediaAnalyzer;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors that can occur while probing a source.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Failed to launch analyzer: {0}")]
    Launch(String),

    #[error("Analysis failed: {0}")]
    Failed(String),

    #[error("Analyzer returned malformed data: {0}")]
    Malformed(String),

    #[error("Analysis timed out after {0}s")]
    TimedOut(u64),
}

pub struct YtDlpAnalyzer {
    bin: String,
    timeout: Duration,
}

impl YtDlpAnalyzer {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaAnalyzer for YtDlpAnalyzer {
    async fn analyze(&self, url: &str) -> Result<MediaSummary, AnalyzeError> {
        let probe = Command::new(&self.bin)
            .args([
                "--dump-single-json",
                "--skip-download",
                "--no-warnings",
                "--no-playlist",
            ])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(AnalyzeError::Launch(err.to_string())),
            Err(_) => return Err(AnalyzeError::TimedOut(self.timeout.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output")
                .to_string();
            return Err(AnalyzeError::Failed(reason));
        }

        let info: RawMediaInfo = serde_json::from_slice(&output.stdout)
            .map_err(|err| AnalyzeError::Malformed(err.to_string()))?;

        Ok(summarize(info))
    }
}

/// The subset of the `--dump-single-json` payload we read.
#[derive(Debug, Deserialize)]
struct RawMediaInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    view_count: Option<u64>,
    upload_date: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

fn summarize(info: RawMediaInfo) -> MediaSummary {
    let formats = collect_formats(&info.formats);

    MediaSummary {
        title: info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        duration_label: duration_label(info.duration.unwrap_or(0.0)),
        thumbnail_url: info.thumbnail,
        channel_name: info
            .channel
            .or(info.uploader)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        view_count_label: info.view_count.map(view_count_label),
        publish_date_label: info.upload_date.as_deref().and_then(publish_date_label),
        formats,
    }
}

fn collect_formats(raw: &[RawFormat]) -> Vec<FormatOption> {
    let mut options: Vec<FormatOption> = Vec::new();

    for format in raw {
        let Some(container) = format.ext.as_deref() else {
            continue;
        };
        // Storyboards and other non-media renditions.
        if matches!(container, "mhtml" | "json" | "m3u8" | "mpd") {
            continue;
        }

        let has_video = format.vcodec.as_deref().is_some_and(|c| c != "none");
        let has_audio = format.acodec.as_deref().is_some_and(|c| c != "none");
        let quality_label = if has_video {
            match format.height {
                Some(height) => format!("{}p", height),
                None => continue,
            }
        } else if has_audio {
            "audio".to_string()
        } else {
            continue;
        };

        let bytes = format
            .filesize
            .or_else(|| format.filesize_approx.map(|b| b as u64));
        let size = bytes.map(size_label);

        match options
            .iter_mut()
            .find(|o| o.container == container && o.quality_label == quality_label)
        {
            Some(existing) => {
                if existing.size_label.is_none() {
                    existing.size_label = size;
                }
            }
            None => options.push(FormatOption {
                container: container.to_string(),
                quality_label,
                size_label: size,
            }),
        }
    }

    options
}
