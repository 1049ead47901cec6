//! Pending response description.
//!
//! Application code records *what* to send through the setters below; the
//! writer turns it into bytes once the chain has finished. Setting a new
//! payload replaces the previous one.

use std::fmt;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::TryStream;
use serde::Serialize;

use crate::context;
use crate::error::Result;
use crate::static_files::SendOptions;

/// What the response body should be.
pub enum Payload {
    Text(String),
    Html(String),
    Buffer(Bytes),
    Json(serde_json::Value),
    /// Redirect target, sent as `Location` with an empty body.
    Redirect(String),
    /// Body streamed as-is, never buffered or tagged.
    Stream(Body),
    File { path: PathBuf, options: SendOptions },
    /// Headers only.
    Empty,
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Html(_) => "html",
            Payload::Buffer(_) => "buffer",
            Payload::Json(_) => "json",
            Payload::Redirect(_) => "redirect",
            Payload::Stream(_) => "stream",
            Payload::File { .. } => "file",
            Payload::Empty => "empty",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(s) | Payload::Html(s) | Payload::Redirect(s) => {
                f.debug_tuple(self.kind()).field(s).finish()
            }
            Payload::Buffer(b) => f.debug_tuple("buffer").field(&b.len()).finish(),
            Payload::Json(v) => f.debug_tuple("json").field(v).finish(),
            Payload::Stream(_) => f.write_str("stream"),
            Payload::File { path, .. } => f.debug_tuple("file").field(path).finish(),
            Payload::Empty => f.write_str("empty"),
        }
    }
}

/// Accumulated response description for one request.
#[derive(Debug, Default)]
pub struct ResponseDescriptor {
    /// `None` leaves the response to whoever already wrote it.
    pub payload: Option<Payload>,
    /// Charset for text payloads and the `Content-Type` parameter.
    pub charset: Option<String>,
    /// Pretty-print JSON with two-space indent.
    pub pretty: bool,
    pub disable_etag: bool,
    /// Status applied right before writing.
    pub status: Option<StatusCode>,
}

fn update(f: impl FnOnce(&mut ResponseDescriptor)) -> Result<()> {
    let ctx = context::current()?;
    f(&mut ctx.descriptor());
    Ok(())
}

fn set_payload(payload: Payload) -> Result<()> {
    update(|d| d.payload = Some(payload))
}

pub fn set_text(text: impl Into<String>) -> Result<()> {
    set_payload(Payload::Text(text.into()))
}

pub fn set_html(html: impl Into<String>) -> Result<()> {
    set_payload(Payload::Html(html.into()))
}

pub fn set_buffer(bytes: impl Into<Bytes>) -> Result<()> {
    set_payload(Payload::Buffer(bytes.into()))
}

/// Serializes `value` now so later mutations of the caller's data don't leak in.
pub fn set_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    set_payload(Payload::Json(value))
}

/// Streams `stream` to the client without buffering.
pub fn set_stream<S>(stream: S) -> Result<()>
where
    S: TryStream + Send + 'static,
    S::Ok: Into<Bytes>,
    S::Error: Into<axum::BoxError>,
{
    set_payload(Payload::Stream(Body::from_stream(stream)))
}

pub fn set_body(body: Body) -> Result<()> {
    set_payload(Payload::Stream(body))
}

/// Redirects to `location` with `status` (302 when `None`).
pub fn set_redirect(location: impl Into<String>, status: Option<StatusCode>) -> Result<()> {
    let location = location.into();
    update(|d| {
        d.payload = Some(Payload::Redirect(location));
        d.status = Some(status.unwrap_or(StatusCode::FOUND));
    })
}

/// Sends the file at `path` once the chain completes.
pub fn set_file(path: impl Into<PathBuf>, options: SendOptions) -> Result<()> {
    set_payload(Payload::File {
        path: path.into(),
        options,
    })
}

pub fn set_empty() -> Result<()> {
    set_payload(Payload::Empty)
}

pub fn set_status(status: StatusCode) -> Result<()> {
    update(|d| d.status = Some(status))
}

pub fn set_charset(charset: impl Into<String>) -> Result<()> {
    let charset = charset.into();
    update(|d| d.charset = Some(charset))
}

pub fn set_pretty(pretty: bool) -> Result<()> {
    update(|d| d.pretty = pretty)
}

pub fn disable_etag(disabled: bool) -> Result<()> {
    update(|d| d.disable_etag = disabled)
}

/// Forgets the payload so the writer leaves the response alone.
pub fn clear() -> Result<()> {
    update(|d| d.payload = None)
}
