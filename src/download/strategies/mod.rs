//! Concrete download strategies, in the order the pipeline tries them.

mod direct;
mod ytdlp;

pub use direct::DirectFetchStrategy;
pub use ytdlp::{YtDlpProfile, YtDlpStrategy};

use super::pipeline::DownloadStrategy;
use std::sync::Arc;

/// Connect timeout for the direct fetch attempt.
const DIRECT_CONNECT_TIMEOUT_SEC: u64 = 15;

/// The standard strategy ordering: cheapest first, most stubborn last.
pub fn default_strategies(ytdlp_bin: &str) -> Vec<Arc<dyn DownloadStrategy>> {
    vec![
        Arc::new(DirectFetchStrategy::new(DIRECT_CONNECT_TIMEOUT_SEC)),
        Arc::new(YtDlpStrategy::new(ytdlp_bin, YtDlpProfile::Standard)),
        Arc::new(YtDlpStrategy::new(ytdlp_bin, YtDlpProfile::Hardened)),
    ]
}
