//! Downloads driven by the yt-dlp command line extractor.
//!
//! Two profiles share this implementation: the standard one runs yt-dlp
//! with plain flags, the hardened one adds workarounds for sources that
//! reject the default client. Progress comes from parsing the `--newline`
//! progress lines on stdout.

use crate::download::models::DownloadFormat;
use crate::download::pipeline::{DownloadStrategy, StrategyOutcome, StrategyRequest};
use crate::download::progress::ProgressSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

lazy_static! {
    static ref PROGRESS_RE: Regex =
        Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("invalid progress regex");
}

/// How many trailing stderr lines to keep for failure reasons.
const STDERR_TAIL_LINES: usize = 5;

/// User agent the hardened profile presents instead of yt-dlp's own.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Network retry count for the hardened profile.
const HARDENED_RETRIES: &str = "5";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YtDlpProfile {
    /// Plain invocation.
    Standard,
    /// Extra flags for sources that refuse the default player client.
    Hardened,
}

pub struct YtDlpStrategy {
    bin: String,
    profile: YtDlpProfile,
}

impl YtDlpStrategy {
    pub fn new(bin: impl Into<String>, profile: YtDlpProfile) -> Self {
        Self {
            bin: bin.into(),
            profile,
        }
    }

    fn build_args(&self, request: &StrategyRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--force-overwrites".to_string(),
        ];

        if self.profile == YtDlpProfile::Hardened {
            args.push("--user-agent".to_string());
            args.push(BROWSER_USER_AGENT.to_string());
            args.push("--force-ipv4".to_string());
            args.push("--retries".to_string());
            args.push(HARDENED_RETRIES.to_string());
            args.push("--sleep-requests".to_string());
            args.push("1".to_string());
            args.push("--extractor-args".to_string());
            args.push("youtube:player_client=default,android".to_string());
        }

        args.push("-f".to_string());
        args.push(format_selector(request.format).to_string());

        match request.format {
            DownloadFormat::AudioOnly => {
                args.push("--extract-audio".to_string());
                args.push("--audio-format".to_string());
                args.push("m4a".to_string());
            }
            other => {
                args.push("--merge-output-format".to_string());
                args.push(other.extension().to_string());
            }
        }

        args.push("-o".to_string());
        args.push(request.output_path.to_string_lossy().to_string());
        args.push(request.source_url.clone());

        args
    }

    async fn attempt(
        &self,
        request: &StrategyRequest,
        progress: &ProgressSink,
    ) -> Result<StrategyOutcome> {
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create output directory")?;
        }

        debug!(
            "Job {}: launching {} for {}",
            request.job_id,
            self.bin,
            request.title.as_deref().unwrap_or(&request.source_url)
        );
        let mut child = Command::new(&self.bin)
            .args(self.build_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.bin))?;

        let stderr = child.stderr.take().context("Child has no stderr handle")?;
        let stderr_tail = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() >= STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail
        });

        let stdout = child.stdout.take().context("Child has no stdout handle")?;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read yt-dlp output")?
        {
            if let Some(percent) = parse_progress_line(&line) {
                progress.report(percent);
            }
        }

        let status = child.wait().await.context("Failed to wait for yt-dlp")?;
        let tail = stderr_tail.await.unwrap_or_default();

        if !status.success() {
            return Ok(classify_failure(status.code(), &tail));
        }

        // Exit code zero is not enough, the contract is a file on disk.
        match tokio::fs::metadata(&request.output_path).await {
            Ok(_) => Ok(StrategyOutcome::Success(request.output_path.clone())),
            Err(_) => Ok(StrategyOutcome::Retryable(
                "yt-dlp exited cleanly but produced no output file".to_string(),
            )),
        }
    }
}

#[async_trait]
impl DownloadStrategy for YtDlpStrategy {
    fn name(&self) -> &'static str {
        match self.profile {
            YtDlpProfile::Standard => "yt-dlp",
            YtDlpProfile::Hardened => "yt-dlp-hardened",
        }
    }

    async fn run(&self, request: &StrategyRequest, progress: &ProgressSink) -> StrategyOutcome {
        match self.attempt(request, progress).await {
            Ok(outcome) => outcome,
            Err(err) => StrategyOutcome::Retryable(format!("{:#}", err)),
        }
    }
}

/// Map a requested format onto a yt-dlp `-f` selector.
fn format_selector(format: DownloadFormat) -> &'static str {
    match format {
        DownloadFormat::Mp4UpTo1080 => {
            "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4][height<=1080]/best[height<=1080]"
        }
        DownloadFormat::Mp4UpTo720 => {
            "bestvideo[ext=mp4][height<=720]+bestaudio[ext=m4a]/best[ext=mp4][height<=720]/best[height<=720]"
        }
        DownloadFormat::Mp4UpTo480 => {
            "bestvideo[ext=mp4][height<=480]+bestaudio[ext=m4a]/best[ext=mp4][height<=480]/best[height<=480]"
        }
        DownloadFormat::Mp4Best => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
        DownloadFormat::AudioOnly => "bestaudio[ext=m4a]/bestaudio/best",
        DownloadFormat::Webm => "bestvideo[ext=webm]+bestaudio[ext=webm]/best[ext=webm]",
    }
}

/// Extract the percentage from a `--newline` progress line like
/// `[download]  45.3% of 10.00MiB at 2.50MiB/s ETA 00:02`.
fn parse_progress_line(line: &str) -> Option<f64> {
    PROGRESS_RE
        .captures(line.trim())?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Turn a failed exit into an outcome. Only failures that no other
/// invocation could ever fix are treated as unrecoverable.
fn classify_failure(code: Option<i32>, stderr_tail: &[String]) -> StrategyOutcome {
    let detail = if stderr_tail.is_empty() {
        match code {
            Some(code) => format!("yt-dlp exited with code {}", code),
            None => "yt-dlp was killed by a signal".to_string(),
        }
    } else {
        format!("yt-dlp: {}", stderr_tail.join(" | "))
    };

    let unsupported = stderr_tail
        .iter()
        .any(|line| line.contains("Unsupported URL") || line.contains("is not a valid URL"));
    if unsupported {
        StrategyOutcome::Fatal(detail)
    } else {
        StrategyOutcome::Retryable(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request_with_format(format: DownloadFormat) -> StrategyRequest {
        StrategyRequest {
            job_id: "job-1".to_string(),
            source_url: "https://example.com/watch?v=abc".to_string(),
            format,
            title: None,
            output_path: PathBuf::from("/media/job-1.mp4"),
        }
    }

    #[test]
    fn test_parse_progress_lines() {
        assert_eq!(
            parse_progress_line("[download]  45.3% of 10.00MiB at 2.50MiB/s ETA 00:02"),
            Some(45.3)
        );
        assert_eq!(
            parse_progress_line("[download] 100% of 10.00MiB in 00:04"),
            Some(100.0)
        );
        assert_eq!(parse_progress_line("[download]   0.0% of ~3.50MiB"), Some(0.0));
    }

    #[test]
    fn test_parse_ignores_non_progress_lines() {
        assert_eq!(
            parse_progress_line("[download] Destination: /media/job-1.mp4"),
            None
        );
        assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_format_selectors_cap_resolution() {
        assert!(format_selector(DownloadFormat::Mp4UpTo1080).contains("height<=1080"));
        assert!(format_selector(DownloadFormat::Mp4UpTo720).contains("height<=720"));
        assert!(format_selector(DownloadFormat::Mp4UpTo480).contains("height<=480"));
        assert!(!format_selector(DownloadFormat::Mp4Best).contains("height<="));
        assert!(format_selector(DownloadFormat::AudioOnly).starts_with("bestaudio"));
        assert!(format_selector(DownloadFormat::Webm).contains("ext=webm"));
    }

    #[test]
    fn test_standard_args_carry_selector_and_output() {
        let strategy = YtDlpStrategy::new("yt-dlp", YtDlpProfile::Standard);
        let args = strategy.build_args(&request_with_format(DownloadFormat::Mp4UpTo720));

        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&"-f".to_string()));
        assert!(args.contains(&format_selector(DownloadFormat::Mp4UpTo720).to_string()));
        assert!(args.contains(&"-o".to_string()));
        assert!(args.contains(&"/media/job-1.mp4".to_string()));
        assert_eq!(
            args.last(),
            Some(&"https://example.com/watch?v=abc".to_string())
        );
        assert!(!args.contains(&"--force-ipv4".to_string()));
    }

    #[test]
    fn test_hardened_args_add_workarounds() {
        let strategy = YtDlpStrategy::new("yt-dlp", YtDlpProfile::Hardened);
        let args = strategy.build_args(&request_with_format(DownloadFormat::Mp4UpTo720));

        assert!(args.iter().any(|a| a.starts_with("youtube:player_client=")));
        assert!(args.contains(&"--user-agent".to_string()));
        assert!(args.iter().any(|a| a.starts_with("Mozilla/5.0")));
        assert!(args.contains(&"--force-ipv4".to_string()));
        assert!(args.contains(&"--retries".to_string()));
        assert!(args.contains(&"--sleep-requests".to_string()));
    }

    #[test]
    fn test_audio_only_extracts_audio() {
        let strategy = YtDlpStrategy::new("yt-dlp", YtDlpProfile::Standard);
        let args = strategy.build_args(&request_with_format(DownloadFormat::AudioOnly));

        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"m4a".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn test_unsupported_url_is_fatal() {
        let tail = vec!["ERROR: Unsupported URL: https://example.com/watch?v=abc".to_string()];
        assert!(matches!(
            classify_failure(Some(1), &tail),
            StrategyOutcome::Fatal(_)
        ));
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        let tail = vec!["ERROR: unable to download video data: HTTP Error 403".to_string()];
        match classify_failure(Some(1), &tail) {
            StrategyOutcome::Retryable(reason) => assert!(reason.contains("403")),
            other => panic!("expected retryable outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_death_is_retryable() {
        match classify_failure(None, &[]) {
            StrategyOutcome::Retryable(reason) => assert!(reason.contains("signal")),
            other => panic!("expected retryable outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_retryable() {
        let strategy = YtDlpStrategy::new("definitely-not-a-real-binary", YtDlpProfile::Standard);
        let store = std::sync::Arc::new(
            crate::download::job_store::SqliteJobStore::in_memory().unwrap(),
        );
        let sink = ProgressSink::new("job-1", store);

        let dir = tempfile::tempdir().unwrap();
        let mut request = request_with_format(DownloadFormat::Mp4UpTo720);
        request.output_path = dir.path().join("job-1.mp4");

        match strategy.run(&request, &sink).await {
            StrategyOutcome::Retryable(reason) => {
                assert!(reason.contains("definitely-not-a-real-binary"))
            }
            other => panic!("expected retryable outcome, got {:?}", other),
        }
    }
}
