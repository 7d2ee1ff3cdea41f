//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Analyze Endpoint
    // ========================================================================

    /// POST /api/analyze
    pub async fn analyze(&self, url: &str) -> Response {
        self.client
            .post(format!("{}/api/analyze", self.base_url))
            .json(&json!({ "url": url }))
            .send()
            .await
            .expect("Analyze request failed")
    }

    /// POST /api/analyze with an arbitrary JSON body
    pub async fn analyze_raw(&self, body: serde_json::Value) -> Response {
        self.client
            .post(format!("{}/api/analyze", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Analyze request failed")
    }

    // ========================================================================
    // Download Endpoints
    // ========================================================================

    /// POST /api/download
    pub async fn submit_download(&self, url: &str, format: &str) -> Response {
        self.client
            .post(format!("{}/api/download", self.base_url))
            .json(&json!({ "sourceUrl": url, "format": format }))
            .send()
            .await
            .expect("Submit download request failed")
    }

    /// POST /api/download with a display title
    pub async fn submit_download_titled(&self, url: &str, format: &str, title: &str) -> Response {
        self.client
            .post(format!("{}/api/download", self.base_url))
            .json(&json!({ "sourceUrl": url, "format": format, "title": title }))
            .send()
            .await
            .expect("Submit download request failed")
    }

    /// GET /api/download/{id}
    pub async fn get_download(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/api/download/{}", self.base_url, id))
            .send()
            .await
            .expect("Get download request failed")
    }

    /// GET /api/downloads
    pub async fn list_downloads(&self) -> Response {
        self.client
            .get(format!("{}/api/downloads", self.base_url))
            .send()
            .await
            .expect("List downloads request failed")
    }

    /// GET /api/download/{id}/file
    pub async fn get_download_file(&self, id: &str) -> Response {
        self.client
            .get(format!("{}/api/download/{}/file", self.base_url, id))
            .send()
            .await
            .expect("Get download file request failed")
    }

    // ========================================================================
    // Health Check / System Endpoints
    // ========================================================================

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Get home request failed")
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Submits a download and returns the job id from the accepted response.
    ///
    /// # Panics
    ///
    /// Panics if submission is not accepted with 202.
    pub async fn submit_download_id(&self, url: &str, format: &str) -> String {
        let response = self.submit_download(url, format).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::ACCEPTED,
            "Download submission failed: {:?}",
            response.text().await
        );
        let job: serde_json::Value = response.json().await.expect("Job response was not JSON");
        job["id"]
            .as_str()
            .expect("Job response carried no id")
            .to_string()
    }

    /// Polls GET /api/download/{id} until the job reaches a terminal status.
    ///
    /// # Panics
    ///
    /// Panics if the job is still running after the polling timeout.
    pub async fn wait_for_terminal(&self, id: &str) -> serde_json::Value {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(JOB_TERMINAL_TIMEOUT_MS);

        loop {
            let response = self.get_download(id).await;
            assert_eq!(
                response.status(),
                reqwest::StatusCode::OK,
                "Job {} lookup failed while polling",
                id
            );
            let job: serde_json::Value = response.json().await.expect("Job response was not JSON");
            let status = job["status"].as_str().unwrap_or_default();
            if status == "completed" || status == "failed" {
                return job;
            }
            if start.elapsed() > timeout {
                panic!(
                    "Job {} still '{}' after {}ms",
                    id, status, JOB_TERMINAL_TIMEOUT_MS
                );
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }
    }
}
