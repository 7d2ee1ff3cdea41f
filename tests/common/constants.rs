//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (URLs, fixture payloads, timings),
//! update only this file.

// ============================================================================
// Test Source URLs
// ============================================================================

/// Watch page URL accepted by the default source pattern
pub const WATCH_URL: &str = "https://example.com/watch?v=abc";

/// URL marker that tells every scripted fixture to refuse the request
pub const FAIL_MARKER: &str = "always-fails";

/// URL marker that makes the scripted analyzer report a timeout
pub const SLOW_MARKER: &str = "glacial";

/// Watch page URL on which every download strategy fails
pub const UNREACHABLE_URL: &str = "https://example.com/watch?v=always-fails";

/// Watch page URL on which analysis times out
pub const SLOW_ANALYZE_URL: &str = "https://example.com/watch?v=glacial";

// ============================================================================
// Scripted Fixture Payloads
// ============================================================================

/// Bytes the succeeding strategy writes as the output file
pub const TEST_MEDIA_BYTES: &[u8] = b"scripted media payload";

/// Title the scripted analyzer reports
pub const ANALYZED_TITLE: &str = "Scripted Clip";

/// Channel name the scripted analyzer reports
pub const ANALYZED_CHANNEL: &str = "Fixture Channel";

/// Duration label the scripted analyzer reports
pub const ANALYZED_DURATION: &str = "3:45";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a job to reach a terminal status (milliseconds)
pub const JOB_TERMINAL_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for a job to finish (milliseconds)
pub const JOB_POLL_INTERVAL_MS: u64 = 25;

/// Pause the test pipeline takes between strategy attempts (milliseconds)
///
/// Kept long enough that a request fired right after submission reliably
/// observes the job before it completes.
pub const TEST_INTER_ATTEMPT_DELAY_MS: u64 = 250;

/// Per-attempt timeout for the test pipeline (seconds)
pub const TEST_ATTEMPT_TIMEOUT_SECS: u64 = 5;
