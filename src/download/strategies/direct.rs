//! Plain HTTP download for URLs that point straight at a media file.
//!
//! This is the cheapest strategy so it runs first. It only accepts
//! responses that actually carry media; a watch page serving HTML makes it
//! bail out quickly so the pipeline can move on to an extractor.

use crate::download::pipeline::{DownloadStrategy, StrategyOutcome, StrategyRequest};
use crate::download::progress::ProgressSink;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub struct DirectFetchStrategy {
    client: reqwest::Client,
}

impl DirectFetchStrategy {
    pub fn new(connect_timeout_sec: u64) -> Self {
        // No total request timeout: large files take as long as they take,
        // the pipeline's attempt timeout is the overall bound.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    async fn fetch(&self, request: &StrategyRequest, progress: &ProgressSink) -> Result<PathBuf> {
        let response = self
            .client
            .get(&request.source_url)
            .send()
            .await
            .context("Failed to connect to source")?;

        if !response.status().is_success() {
            bail!("Source responded with status {}", response.status());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_media_content_type(&content_type) {
            bail!("Source returned '{}', not a media file", content_type);
        }

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create output directory")?;
        }

        let part_path = request.output_path.with_extension("part");
        if let Err(err) = self.stream_to_file(response, &part_path, progress).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(err);
        }

        tokio::fs::rename(&part_path, &request.output_path)
            .await
            .context("Failed to move output file into place")?;

        Ok(request.output_path.clone())
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        dest: &Path,
        progress: &ProgressSink,
    ) -> Result<()> {
        let total_bytes = response.content_length();

        let mut file = File::create(dest)
            .await
            .context("Failed to create output file")?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut first_chunk = true;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed while reading response body")?;

            // Content type headers lie often enough to be worth a sniff.
            if first_chunk {
                if let Some(kind) = infer::get(&chunk) {
                    match kind.matcher_type() {
                        infer::MatcherType::Video | infer::MatcherType::Audio => {}
                        _ => bail!("Payload looks like {} rather than media", kind.mime_type()),
                    }
                }
                first_chunk = false;
            }

            file.write_all(&chunk)
                .await
                .context("Failed to write output file")?;
            written += chunk.len() as u64;

            if let Some(total) = total_bytes {
                if total > 0 {
                    progress.report(written as f64 * 100.0 / total as f64);
                }
            }
        }

        file.flush().await.context("Failed to flush output file")?;
        Ok(())
    }
}

#[async_trait]
impl DownloadStrategy for DirectFetchStrategy {
    fn name(&self) -> &'static str {
        "direct-fetch"
    }

    async fn run(&self, request: &StrategyRequest, progress: &ProgressSink) -> StrategyOutcome {
        match self.fetch(request, progress).await {
            Ok(path) => StrategyOutcome::Success(path),
            Err(err) => StrategyOutcome::Retryable(format!("direct fetch: {:#}", err)),
        }
    }
}

fn is_media_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("video/")
        || essence.starts_with("audio/")
        || essence == "application/octet-stream"
}
