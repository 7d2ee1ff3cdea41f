use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scarica_server::analyzer::YtDlpAnalyzer;
use scarica_server::config;
use scarica_server::download::strategies::default_strategies;
use scarica_server::download::{DownloadService, PipelineSettings, SqliteJobStore, StrategyPipeline};
use scarica_server::server::{metrics, run_server, RequestsLoggingLevel};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let raw = PathBuf::from(s);
    let resolved = match raw.canonicalize() {
        Ok(path) => path,
        // A path that does not exist yet is fine, it may get created later.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => raw,
        Err(err) => return Err(format!("Error resolving path '{}': {}", s, err)),
    };
    if resolved.is_absolute() {
        Ok(resolved)
    } else {
        let cwd =
            std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
        Ok(cwd.join(resolved))
    }
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.is_dir() {
        return Err(format!("Not an existing directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// TOML configuration file. Where it sets a value, it wins over the CLI.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing the jobs database. Can also be specified in the
    /// config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Directory where finished downloads are written. Defaults to
    /// <db_dir>/media.
    #[clap(long, value_parser = parse_path)]
    pub media_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// Port the Prometheus exposition endpoint listens on.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// How much of each HTTP request to log.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Directory to serve statically as the web frontend.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// The yt-dlp binary to invoke for analysis and downloads.
    #[clap(long, default_value = "yt-dlp")]
    pub ytdlp_bin: String,

    /// Timeout in seconds for URL analysis.
    #[clap(long, default_value_t = 30)]
    pub analyze_timeout_sec: u64,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            media_dir: args.media_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            ytdlp_bin: args.ytdlp_bin.clone(),
            analyze_timeout_sec: args.analyze_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  media_dir: {:?}", app_config.media_dir);
    info!("  port: {}", app_config.port);

    std::fs::create_dir_all(&app_config.media_dir).with_context(|| {
        format!(
            "Failed to create media directory {:?}",
            app_config.media_dir
        )
    })?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    if !app_config.jobs_db_path().exists() {
        info!(
            "Creating new jobs database at {:?}",
            app_config.jobs_db_path()
        );
    }
    let store = Arc::new(SqliteJobStore::new(app_config.jobs_db_path())?);

    let shutdown_token = CancellationToken::new();

    let strategies = default_strategies(&app_config.ytdlp_bin);
    let settings = PipelineSettings {
        attempt_timeout: Duration::from_secs(app_config.download.attempt_timeout_secs),
        inter_attempt_delay: Duration::from_secs(app_config.download.inter_attempt_delay_secs),
    };
    let pipeline = Arc::new(StrategyPipeline::new(
        strategies,
        store.clone(),
        settings,
        shutdown_token.child_token(),
    )?);

    let allowed_source = Regex::new(&app_config.download.allowed_source_pattern)
        .context("Invalid allowed_source_pattern regex")?;
    let download_service = Arc::new(DownloadService::new(
        store,
        pipeline,
        app_config.media_dir.clone(),
        allowed_source,
    ));

    // Jobs left mid-flight by a previous process can never finish now.
    download_service.fail_interrupted_jobs()?;

    let analyzer = Arc::new(YtDlpAnalyzer::new(
        app_config.ytdlp_bin.clone(),
        Duration::from_secs(app_config.analyze_timeout_sec),
    ));

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    tokio::select! {
        result = run_server(
            download_service,
            analyzer,
            app_config.logging_level.clone(),
            app_config.port,
            app_config.metrics_port,
            app_config.frontend_dir_path.clone(),
            shutdown_token.clone(),
        ) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give in-flight pipelines a moment to record their state
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
