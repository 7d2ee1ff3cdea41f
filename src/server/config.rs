use super::RequestsLoggingLevel;

/// Settings the HTTP layer needs at request time.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// When set, the directory is served statically instead of the JSON
    /// home endpoint.
    pub frontend_dir_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 3001,
            requests_logging_level: RequestsLoggingLevel::Path,
            frontend_dir_path: None,
        }
    }
}
