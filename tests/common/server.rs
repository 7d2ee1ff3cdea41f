//! Test server lifecycle management
//!
//! Spawns a fully wired server on a random port for each test, with its own
//! job database and media directory. The pipeline runs scripted strategies,
//! so tests never touch the network or a real extractor binary.

use super::constants::*;
use super::fixtures::{RefusingStrategy, ScriptedAnalyzer, ScriptedStrategy};
use regex::Regex;
use scarica_server::download::{
    DownloadService, DownloadStrategy, PipelineSettings, SqliteJobStore, StrategyPipeline,
    DEFAULT_SOURCE_PATTERN,
};
use scarica_server::server::state::ServerState;
use scarica_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A running server plus the temp resources backing it. Dropping it shuts
/// the server down and deletes the temp directory.
pub struct TestServer {
    pub base_url: String,
    pub port: u16,
    /// Directory completed downloads land in.
    pub media_dir: PathBuf,
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawn a server on a random port and wait until it answers.
    ///
    /// The pipeline holds a refusing strategy followed by a succeeding one,
    /// so every completed job has exercised the fallback path.
    ///
    /// # Panics
    ///
    /// Panics when any setup step fails or the server does not become
    /// ready within [`SERVER_READY_TIMEOUT_MS`].
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let media_dir = temp_dir.path().join("media");
        std::fs::create_dir_all(&media_dir).expect("Failed to create media dir");

        let store = Arc::new(
            SqliteJobStore::new(temp_dir.path().join("jobs.db"))
                .expect("Failed to create job store"),
        );
        let strategies: Vec<Arc<dyn DownloadStrategy>> =
            vec![Arc::new(RefusingStrategy), Arc::new(ScriptedStrategy)];
        let settings = PipelineSettings {
            attempt_timeout: Duration::from_secs(TEST_ATTEMPT_TIMEOUT_SECS),
            inter_attempt_delay: Duration::from_millis(TEST_INTER_ATTEMPT_DELAY_MS),
        };
        let pipeline = Arc::new(
            StrategyPipeline::new(strategies, store.clone(), settings, CancellationToken::new())
                .expect("Failed to build pipeline"),
        );
        let download_service = Arc::new(DownloadService::new(
            store,
            pipeline,
            media_dir.clone(),
            Regex::new(DEFAULT_SOURCE_PATTERN).expect("Default source pattern is invalid"),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState::new(
            ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                frontend_dir_path: None,
            },
            download_service,
            Arc::new(ScriptedAnalyzer),
            "test-hash".to_string(),
        );
        let app = make_app(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            media_dir,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let deadline = Instant::now() + Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        loop {
            if let Ok(response) = client.get(format!("{}/", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            if Instant::now() > deadline {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
