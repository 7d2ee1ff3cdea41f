use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{error, info};

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::{api_routes, log_requests, metrics, state::ServerState, RequestsLoggingLevel};
use super::ServerConfig;
use crate::analyzer::MediaAnalyzer;
use crate::download::DownloadService;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    let home_router: Router = match state.config.frontend_dir_path.clone() {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let app: Router = home_router.nest("/api", api_routes().with_state(state.clone()));
    app.layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    download_service: Arc<DownloadService>,
    analyzer: Arc<dyn MediaAnalyzer>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    metrics_port: u16,
    frontend_dir_path: Option<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
        frontend_dir_path,
    };
    let state = ServerState::new(
        config,
        download_service,
        analyzer,
        format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
    );
    let app = make_app(state);

    // Metrics are served from their own port so the scrape endpoint never
    // has to be exposed alongside the public API.
    let metrics_app: Router = Router::new().route("/metrics", get(metrics::metrics_handler));
    let metrics_listener =
        tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port)).await?;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let serving = axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await });
        if let Err(err) = serving.await {
            error!("Metrics server error: {}", err);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzeError, MediaSummary};
    use crate::download::{
        DownloadStrategy, PipelineSettings, ProgressSink, SqliteJobStore, StrategyOutcome,
        StrategyPipeline, StrategyRequest, DEFAULT_SOURCE_PATTERN,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use regex::Regex;
    use tower::ServiceExt;

    struct NoOpAnalyzer;

    #[async_trait]
    impl MediaAnalyzer for NoOpAnalyzer {
        async fn analyze(&self, url: &str) -> Result<MediaSummary, AnalyzeError> {
            Err(AnalyzeError::Failed(format!("no analyzer for {}", url)))
        }
    }

    struct NoOpStrategy;

    #[async_trait]
    impl DownloadStrategy for NoOpStrategy {
        fn name(&self) -> &'static str {
            "no-op"
        }

        async fn run(
            &self,
            _request: &StrategyRequest,
            _progress: &ProgressSink,
        ) -> StrategyOutcome {
            StrategyOutcome::Retryable("no-op".to_string())
        }
    }

    fn test_state() -> ServerState {
        let store = Arc::new(SqliteJobStore::in_memory().unwrap());
        let pipeline = StrategyPipeline::new(
            vec![Arc::new(NoOpStrategy)],
            store.clone(),
            PipelineSettings::default(),
            CancellationToken::new(),
        )
        .unwrap();
        let service = DownloadService::new(
            store,
            Arc::new(pipeline),
            std::env::temp_dir(),
            Regex::new(DEFAULT_SOURCE_PATTERN).unwrap(),
        );
        ServerState::new(
            ServerConfig::default(),
            Arc::new(service),
            Arc::new(NoOpAnalyzer),
            "test-hash".to_string(),
        )
    }

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(61)), "0d 00:01:01");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 3600 + 60 + 1)),
            "1d 01:01:01"
        );
    }

    #[tokio::test]
    async fn home_reports_uptime_and_hash() {
        let app = make_app(test_state());

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["hash"], "test-hash");
        assert!(body["uptime"].as_str().unwrap().contains("0d"));
    }

    #[tokio::test]
    async fn api_routes_are_nested_under_api() {
        let app = make_app(test_state());

        let request = Request::builder()
            .uri("/api/downloads")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
