//! Outbound response handle.
//!
//! # Responsibilities
//! - Hold status and headers while application code is still deciding
//! - Commit exactly one `Response` to the server
//!
//! # Design Decisions
//! - "Headers sent" means the response was handed to the server; there is
//!   no partial write state
//! - The handle is owned by one request context and never shared across requests

use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::body::Body;
use axum::http::header::AsHeaderName;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    sink: Option<oneshot::Sender<Response<Body>>>,
}

/// Mutable status/header staging area with a single-shot commit.
pub struct ResponseHandle {
    state: Mutex<ResponseState>,
}

impl ResponseHandle {
    pub(crate) fn new(sink: oneshot::Sender<Response<Body>>) -> Self {
        Self {
            state: Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                sink: Some(sink),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> StatusCode {
        self.state().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.state().status = status;
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.state().headers.get(name).cloned()
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<String> {
        self.header(name)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    pub fn has_header<K: AsHeaderName>(&self, name: K) -> bool {
        self.state().headers.contains_key(name)
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.state().headers.insert(name, value);
    }

    /// Sets the header only when the application has not set it already.
    /// Returns whether the value was written.
    pub fn set_header_if_absent(&self, name: HeaderName, value: HeaderValue) -> bool {
        let mut state = self.state();
        if state.headers.contains_key(&name) {
            return false;
        }
        state.headers.insert(name, value);
        true
    }

    pub fn remove_header<K: AsHeaderName>(&self, name: K) {
        self.state().headers.remove(name);
    }

    pub fn clear_headers(&self) {
        self.state().headers.clear();
    }

    /// Snapshot of the staged headers.
    pub fn headers(&self) -> HeaderMap {
        self.state().headers.clone()
    }

    pub fn headers_sent(&self) -> bool {
        self.state().sink.is_none()
    }

    /// Commit status, headers and `body` to the client.
    ///
    /// Fails with [`Error::HeadersSent`] on a second call.
    pub fn send(&self, body: Body) -> Result<()> {
        let mut state = self.state();
        let sink = state.sink.take().ok_or(Error::HeadersSent)?;

        let mut response = Response::new(body);
        *response.status_mut() = state.status;
        *response.headers_mut() = state.headers.clone();

        if sink.send(response).is_err() {
            tracing::debug!(status = %state.status, "Client went away before the response was committed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ResponseHandle")
            .field("status", &state.status)
            .field("headers", &state.headers)
            .field("headers_sent", &state.sink.is_none())
            .finish()
    }
}
