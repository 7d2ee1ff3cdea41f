//! Shared end-to-end test infrastructure
//!
//! Test files import everything through this module; the submodules stay
//! private.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer, WATCH_URL};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_submit_download() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.submit_download(WATCH_URL, "best-mp4-720p").await;
//!     assert_eq!(response.status(), StatusCode::ACCEPTED);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use server::TestServer;
