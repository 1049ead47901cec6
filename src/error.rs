//! Error taxonomy shared by every subsystem.
//!
//! # Design Decisions
//! - One enum for the whole request path so middleware can match on kind
//! - `Clone` so a memoized body result can be handed to every caller
//! - Not-found is kept apart from forbidden: it lets an outer router fall through

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};

/// Errors raised while handling a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed request path or header.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Path escapes the root, denied dotfile, or directory access.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing file. Callers with a continuation should fall through on this.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed")]
    PreconditionFailed,

    /// `Range` header cannot be satisfied for a representation of `length` bytes.
    #[error("range not satisfiable (length {length})")]
    RangeNotSatisfiable { length: u64 },

    #[error("request entity too large (limit {limit} bytes)")]
    EntityTooLarge { limit: usize },

    #[error("unsupported content-encoding {0}")]
    UnsupportedMediaEncoding(String),

    #[error("unsupported charset \"{0}\"")]
    UnsupportedCharset(String),

    /// The application asked for a response charset the writer cannot encode.
    #[error("cannot encode response as \"{0}\"")]
    UnencodableCharset(String),

    /// Declared `Content-Length` does not match the bytes received.
    #[error("request size did not match content length (expected {expected}, received {received})")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("request aborted")]
    Aborted,

    /// Body could not be decoded or parsed.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The response was already committed to the client.
    #[error("headers already sent")]
    HeadersSent,

    #[error("no request context is bound to the current task")]
    NoContext,

    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("i/o error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("json error: {0}")]
    Json(#[source] Arc<serde_json::Error>),
}

impl Error {
    /// HTTP status an error boundary should answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::InvalidBody(_) | Error::SizeMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Error::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UnsupportedMediaEncoding(_) | Error::UnsupportedCharset(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            // 400 is what a client sees when its own connection dropped mid-body.
            Error::Aborted => StatusCode::BAD_REQUEST,
            Error::HeadersSent
            | Error::NoContext
            | Error::InvalidPattern { .. }
            | Error::UnencodableCharset(_)
            | Error::Internal(_)
            | Error::Io(_)
            | Error::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for the not-found class that lets a router try its next alternative.
    pub fn is_fallthrough(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Extra headers the error response must carry.
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        match self {
            Error::RangeNotSatisfiable { length } => {
                match HeaderValue::from_str(&format!("bytes */{length}")) {
                    Ok(value) => vec![(header::CONTENT_RANGE, value)],
                    Err(_) => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::EntityTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::UnsupportedCharset("latin1".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(Error::HeadersSent.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            Error::UnencodableCharset("koi8-r".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_only_not_found_falls_through() {
        assert!(Error::NotFound("a".into()).is_fallthrough());
        assert!(!Error::Forbidden("a".into()).is_fallthrough());
        assert!(!Error::BadRequest("a".into()).is_fallthrough());
    }

    #[test]
    fn test_range_error_carries_content_range() {
        let headers = Error::RangeNotSatisfiable { length: 100 }.headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, header::CONTENT_RANGE);
        assert_eq!(headers[0].1, "bytes */100");
    }

    #[test]
    fn test_io_error_is_cloneable() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
