//! Analysis response shapes and the label formatting they rely on.

use byte_unit::{Byte, UnitType};
use serde::{Deserialize, Serialize};

/// Human-oriented summary of a source URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub title: String,
    pub duration_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub channel_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date_label: Option<String>,
    pub formats: Vec<FormatOption>,
}

/// One downloadable rendition of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOption {
    /// Container extension, e.g. "mp4".
    pub container: String,
    /// "1080p", "720p" or "audio".
    pub quality_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
}

/// "3:45" below an hour, "1:02:03" above.
pub fn duration_label(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Condensed view counts the way media sites show them: "1.2M views".
pub fn view_count_label(count: u64) -> String {
    let label = if count >= 1_000_000_000 {
        condensed(count as f64 / 1e9, "B")
    } else if count >= 1_000_000 {
        condensed(count as f64 / 1e6, "M")
    } else if count >= 1_000 {
        condensed(count as f64 / 1e3, "K")
    } else {
        count.to_string()
    };
    format!("{} views", label)
}

fn condensed(value: f64, suffix: &str) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}{}", rounded as u64, suffix)
    } else {
        format!("{:.1}{}", rounded, suffix)
    }
}

/// Turn yt-dlp's YYYYMMDD upload date into "Jan 31, 2024".
pub fn publish_date_label(upload_date: &str) -> Option<String> {
    let date = chrono::NaiveDate::parse_from_str(upload_date, "%Y%m%d").ok()?;
    Some(date.format("%b %-d, %Y").to_string())
}

pub fn size_label(bytes: u64) -> String {
    let adjusted = Byte::from(bytes).get_appropriate_unit(UnitType::Decimal);
    format!("{:.1}", adjusted)
}
