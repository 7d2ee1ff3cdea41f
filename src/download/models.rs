//! Data models for download jobs.
//!
//! Defines the job record, its status state machine and the requested format.

use serde::{Deserialize, Serialize};

/// Status of a download job.
///
/// Transitions are monotonic: `pending -> downloading -> {completed, failed}`.
/// `downloading` may be re-entered when a new strategy attempt begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Completed, // terminal
    Failed,    // terminal
}

impl JobStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Returns true if the transition to `next` is allowed by the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(next, JobStatus::Downloading | JobStatus::Failed),
            JobStatus::Downloading => matches!(
                next,
                JobStatus::Downloading | JobStatus::Completed | JobStatus::Failed
            ),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "downloading" => Some(JobStatus::Downloading),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Requested output format for a download.
///
/// The `best-mp4-*` variants cap the video height; `best-mp4` takes the best
/// available mp4. Short aliases (`mp4-720p`, `audio`, ...) are accepted on
/// input for convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadFormat {
    #[serde(rename = "best-mp4-1080p", alias = "mp4-1080p")]
    Mp4UpTo1080,
    #[serde(rename = "best-mp4-720p", alias = "mp4-720p")]
    Mp4UpTo720,
    #[serde(rename = "best-mp4-480p", alias = "mp4-480p")]
    Mp4UpTo480,
    #[serde(rename = "best-mp4", alias = "mp4")]
    Mp4Best,
    #[serde(rename = "audio-only", alias = "audio")]
    AudioOnly,
    #[serde(rename = "webm")]
    Webm,
}

impl DownloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadFormat::Mp4UpTo1080 => "best-mp4-1080p",
            DownloadFormat::Mp4UpTo720 => "best-mp4-720p",
            DownloadFormat::Mp4UpTo480 => "best-mp4-480p",
            DownloadFormat::Mp4Best => "best-mp4",
            DownloadFormat::AudioOnly => "audio-only",
            DownloadFormat::Webm => "webm",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "best-mp4-1080p" | "mp4-1080p" => Some(DownloadFormat::Mp4UpTo1080),
            "best-mp4-720p" | "mp4-720p" => Some(DownloadFormat::Mp4UpTo720),
            "best-mp4-480p" | "mp4-480p" => Some(DownloadFormat::Mp4UpTo480),
            "best-mp4" | "mp4" => Some(DownloadFormat::Mp4Best),
            "audio-only" | "audio" => Some(DownloadFormat::AudioOnly),
            "webm" => Some(DownloadFormat::Webm),
            _ => None,
        }
    }

    /// File extension of the produced output.
    pub fn extension(&self) -> &'static str {
        match self {
            DownloadFormat::Mp4UpTo1080
            | DownloadFormat::Mp4UpTo720
            | DownloadFormat::Mp4UpTo480
            | DownloadFormat::Mp4Best => "mp4",
            DownloadFormat::AudioOnly => "m4a",
            DownloadFormat::Webm => "webm",
        }
    }

    /// Upper bound on video height, when the format caps it.
    pub fn max_height(&self) -> Option<u32> {
        match self {
            DownloadFormat::Mp4UpTo1080 => Some(1080),
            DownloadFormat::Mp4UpTo720 => Some(720),
            DownloadFormat::Mp4UpTo480 => Some(480),
            _ => None,
        }
    }
}

/// A download job record: the unit of work and its observable state.
///
/// Created once at submission, mutated in place until terminal, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    /// Unique identifier (UUID), immutable.
    pub id: String,
    /// Input URL, immutable after creation.
    pub source_url: String,
    /// Display title captured at submission; used for the attachment
    /// filename, never for on-disk paths.
    pub title: Option<String>,
    /// Requested output format, immutable.
    pub requested_format: DownloadFormat,
    /// Current status in the state machine.
    pub status: JobStatus,
    /// Percentage 0-100. Non-decreasing within one strategy attempt, reset
    /// to 0 when a new attempt starts.
    pub progress: u8,
    /// Path of the produced file. Present iff status is completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
    /// Reason from the most recent failed attempt, best effort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Number of strategy attempts started so far.
    pub attempts: u32,
    /// When the job was submitted (Unix timestamp).
    pub created_at: i64,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl DownloadJob {
    /// Create a new pending job record.
    pub fn new(id: String, source_url: String, requested_format: DownloadFormat) -> Self {
        Self {
            id,
            source_url,
            title: None,
            requested_format,
            status: JobStatus::Pending,
            progress: 0,
            output_location: None,
            last_error: None,
            attempts: 0,
            created_at: chrono::Utc::now().timestamp(),
            completed_at: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }
}
