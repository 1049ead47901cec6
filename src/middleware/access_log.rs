//! Request logger.
//!
//! Logs one event when the request enters the chain and one when its
//! response has been fully handed off. The exit event comes after the
//! descriptor is written, so file and stream bodies are included in the
//! duration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::context;
use crate::http::request_id::RequestId;
use crate::http::writer;
use crate::middleware::{Middleware, Next};

/// Headers worth logging. Everything else (cookies, auth) stays out of the log.
const LOGGED_HEADERS: &[&str] = &[
    "host",
    "referer",
    "referrer",
    "user-agent",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-forwarded-for",
];

static REQUEST_COUNT: AtomicU64 = AtomicU64::new(0);

/// Logs entry and exit of every request passing through.
pub fn access_log() -> impl Middleware {
    |next: Next| async move {
        let ctx = context::current()?;
        let request = ctx.request();
        let id = REQUEST_COUNT.fetch_add(1, Ordering::Relaxed);

        let headers: Vec<(&str, &str)> = LOGGED_HEADERS
            .iter()
            .filter_map(|name| request.header_str(*name).map(|value| (*name, value)))
            .collect();
        let request_id = request.request_id().unwrap_or("-");

        tracing::info!(
            id,
            request_id,
            method = %request.method,
            uri = %request.uri,
            version = ?request.version,
            headers = ?headers,
            "Request started"
        );

        let start = Instant::now();
        let result = match next.run().await {
            Ok(()) => writer::write(&ctx).await,
            Err(err) => Err(err),
        };
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let response = ctx.response();
        match &result {
            Ok(()) => tracing::info!(
                id,
                request_id,
                status = response.status().as_u16(),
                committed = response.headers_sent(),
                duration_ms,
                "Request finished"
            ),
            Err(err) => tracing::info!(
                id,
                request_id,
                status = err.status().as_u16(),
                error = %err,
                duration_ms,
                "Request finished with error"
            ),
        }
        result
    }
}
