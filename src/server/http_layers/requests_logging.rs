//! Request logging middleware
//!
//! Wraps every route and, depending on the configured level, logs the
//! request line, the headers, and small bodies. Logged bodies are buffered
//! and replayed so downstream handlers see them untouched.

use crate::server::metrics::record_http_request;
use crate::server::state::ServerState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::middleware::Next;
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    Path,
    Headers,
    Body,
}

impl Default for RequestsLoggingLevel {
    fn default() -> Self {
        Self::Path
    }
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Bodies at or above this size are summarized instead of logged.
const MAX_LOGGED_BODY_BYTES: usize = 1024;

fn declared_body_size(headers: &HeaderMap) -> Result<usize, &'static str> {
    let value = headers
        .get(CONTENT_LENGTH)
        .ok_or("Content-length not set.")?;
    let text = value.to_str().map_err(|_| "Content-length is not readable.")?;
    text.parse().map_err(|_| "Content-length is not a number.")
}

fn log_headers(direction: &str, headers: &HeaderMap) {
    info!("  {} Headers:", direction);
    for (name, value) in headers.iter() {
        info!("    {:?}: {:?}", name, value);
    }
}

fn server_error() -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::from("Internal Server Error"))
        .unwrap()
}

pub async fn log_requests(
    State(state): State<ServerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let level = state.config.requests_logging_level.clone();
    let started = Instant::now();

    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, uri);
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers("Req", request.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        match declared_body_size(request.headers()) {
            Err(reason) => info!("  Req Body: {}", reason),
            Ok(size) if size >= MAX_LOGGED_BODY_BYTES => {
                info!(
                    "  Req Body: Too big to log ({:#})",
                    byte_unit::Byte::from(size)
                );
            }
            Ok(size) => {
                let (parts, body) = request.into_parts();
                let bytes = match axum::body::to_bytes(body, size).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!("Failed to read request body: {:?}", err);
                        return server_error();
                    }
                };
                info!("  Req Body:\n{}", String::from_utf8_lossy(&bytes));
                request = Request::from_parts(parts, Body::from(bytes));
            }
        }
    }

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", response.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        match declared_body_size(response.headers()) {
            Err(reason) => info!("  Resp Body: {}", reason),
            Ok(size) if size >= MAX_LOGGED_BODY_BYTES => {
                info!(
                    "  Resp Body: Too big to log ({:#})",
                    byte_unit::Byte::from(size)
                );
            }
            Ok(size) => {
                let (parts, body) = response.into_parts();
                let bytes = match axum::body::to_bytes(body, size).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!("Failed to read response body: {:?}", err);
                        return server_error();
                    }
                };
                info!("  Resp Body:\n{}", String::from_utf8_lossy(&bytes));
                response = Response::from_parts(parts, Body::from(bytes));
            }
        }
    }

    let status = response.status().as_u16();
    let elapsed = started.elapsed();

    if level > RequestsLoggingLevel::None {
        info!("<<< {} ({}ms)", status, elapsed.as_millis());
    }

    // The path without the query string keeps metric label cardinality bounded.
    record_http_request(&method, &path, status, elapsed);

    response
}
