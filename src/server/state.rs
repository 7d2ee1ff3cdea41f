use axum::extract::FromRef;

use crate::analyzer::MediaAnalyzer;
use crate::download::DownloadService;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedDownloadService = Arc<DownloadService>;
pub type GuardedAnalyzer = Arc<dyn MediaAnalyzer>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub download_service: GuardedDownloadService,
    pub analyzer: GuardedAnalyzer,
    pub hash: String,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        download_service: GuardedDownloadService,
        analyzer: GuardedAnalyzer,
        hash: String,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            download_service,
            analyzer,
            hash,
        }
    }
}

impl FromRef<ServerState> for GuardedDownloadService {
    fn from_ref(input: &ServerState) -> Self {
        input.download_service.clone()
    }
}

impl FromRef<ServerState> for GuardedAnalyzer {
    fn from_ref(input: &ServerState) -> Self {
        input.analyzer.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
