mod file_config;

pub use file_config::{DownloadConfig, FileConfig};

use crate::download::DEFAULT_SOURCE_PATTERN;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use regex::Regex;
use std::path::PathBuf;

/// CLI arguments that take part in config resolution. A TOML file, when
/// given, wins over any of these.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub ytdlp_bin: String,
    pub analyze_timeout_sec: u64,
}

/// Knobs for the download pipeline.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub attempt_timeout_secs: u64,
    pub inter_attempt_delay_secs: u64,
    pub allowed_source_pattern: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 900,
            inter_attempt_delay_secs: 2,
            allowed_source_pattern: DEFAULT_SOURCE_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub media_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub ytdlp_bin: String,
    pub analyze_timeout_sec: u64,
    pub download: DownloadSettings,
}

impl AppConfig {
    /// Merge CLI arguments with an optional TOML file, the file winning
    /// wherever it carries a value.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = match file.db_dir {
            Some(dir) => PathBuf::from(dir),
            None => cli.db_dir.clone().ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?,
        };
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let media_dir = match (file.media_dir, cli.media_dir.clone()) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(dir)) => dir,
            (None, None) => db_dir.join("media"),
        };

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let ytdlp_bin = file.ytdlp_bin.unwrap_or_else(|| cli.ytdlp_bin.clone());
        if ytdlp_bin.trim().is_empty() {
            bail!("ytdlp_bin must not be empty");
        }

        let defaults = DownloadSettings::default();
        let dl_file = file.download.unwrap_or_default();
        let download = DownloadSettings {
            attempt_timeout_secs: dl_file
                .attempt_timeout_secs
                .unwrap_or(defaults.attempt_timeout_secs),
            inter_attempt_delay_secs: dl_file
                .inter_attempt_delay_secs
                .unwrap_or(defaults.inter_attempt_delay_secs),
            allowed_source_pattern: dl_file
                .allowed_source_pattern
                .unwrap_or(defaults.allowed_source_pattern),
        };
        // Fail now rather than on the first submission
        Regex::new(&download.allowed_source_pattern)
            .context("Invalid allowed_source_pattern regex")?;

        Ok(Self {
            db_dir,
            media_dir,
            port: file.port.unwrap_or(cli.port),
            metrics_port: file.metrics_port.unwrap_or(cli.metrics_port),
            logging_level,
            frontend_dir_path: file
                .frontend_dir_path
                .or_else(|| cli.frontend_dir_path.clone()),
            ytdlp_bin,
            analyze_timeout_sec: file.analyze_timeout_sec.unwrap_or(cli.analyze_timeout_sec),
            download,
        })
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
