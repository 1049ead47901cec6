//! Final write pass: descriptor → committed response.
//!
//! # Responsibilities
//! - Default `Content-Type` per payload kind, never overriding the application
//! - Serialize text and JSON payloads into the requested charset
//! - ETag + 304 for in-memory bodies
//! - 204/205 and `HEAD` header-only responses
//!
//! # Design Decisions
//! - File payloads are delegated to the static file sender untouched
//! - Streams are handed to the server as-is; no ETag, no buffering

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use bytes::Bytes;

use crate::context::{RequestContext, ResponseHandle};
use crate::error::{Error, Result};
use crate::http::conditional::is_fresh_etag;
use crate::http::descriptor::Payload;
use crate::http::etag::entity_tag;
use crate::static_files;

enum Serialized {
    Buffer(Bytes),
    Stream(Body),
    Nothing,
}

/// Writes the context's descriptor to its response. Runs once per request.
pub async fn write(ctx: &Arc<RequestContext>) -> Result<()> {
    let descriptor = ctx.take_descriptor();
    let Some(payload) = descriptor.payload else {
        return Ok(());
    };

    let response = ctx.response();
    let request = ctx.request();
    let charset = descriptor.charset.as_deref();

    if let Some(status) = descriptor.status {
        response.set_status(status);
    }

    tracing::trace!(kind = payload.kind(), uri = %request.uri, "Writing response");

    let serialized = match payload {
        Payload::Text(text) => {
            set_default_content_type(response, "text/plain", charset)?;
            Serialized::Buffer(encode_text(&text, charset)?)
        }
        Payload::Html(html) => {
            set_default_content_type(response, "text/html", charset)?;
            Serialized::Buffer(encode_text(&html, charset)?)
        }
        Payload::Buffer(bytes) => {
            set_default_content_type(response, "application/octet-stream", charset)?;
            Serialized::Buffer(bytes)
        }
        Payload::Json(value) => {
            set_default_content_type(response, "application/json", charset)?;
            let text = if descriptor.pretty {
                serde_json::to_string_pretty(&value)?
            } else {
                serde_json::to_string(&value)?
            };
            Serialized::Buffer(encode_text(&text, charset)?)
        }
        Payload::Redirect(location) => {
            let location = HeaderValue::from_str(&location)
                .map_err(|_| Error::Internal(format!("invalid redirect location {location:?}")))?;
            response.set_header(header::LOCATION, location);
            Serialized::Buffer(Bytes::new())
        }
        Payload::Stream(body) => {
            set_default_content_type(response, "application/octet-stream", charset)?;
            Serialized::Stream(body)
        }
        Payload::File { path, options } => {
            return static_files::send_path(ctx, &path, &options).await;
        }
        Payload::Empty => Serialized::Nothing,
    };

    if response.headers_sent() {
        tracing::debug!(uri = %request.uri, "Response already committed by the handler");
        return Ok(());
    }

    match response.status() {
        StatusCode::NO_CONTENT => {
            response.remove_header(header::CONTENT_TYPE);
            response.remove_header(header::CONTENT_LENGTH);
            response.remove_header(header::TRANSFER_ENCODING);
            return response.send(Body::empty());
        }
        StatusCode::RESET_CONTENT => {
            response.set_header(header::CONTENT_LENGTH, HeaderValue::from(0));
            response.remove_header(header::TRANSFER_ENCODING);
            return response.send(Body::empty());
        }
        _ => {}
    }

    match serialized {
        Serialized::Buffer(bytes) => {
            response.set_header(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

            if !descriptor.disable_etag {
                let etag = entity_tag(&bytes);
                let value = HeaderValue::from_str(&etag)
                    .map_err(|e| Error::Internal(e.to_string()))?;
                response.set_header(header::ETAG, value);

                if is_fresh_etag(&request.headers, &etag) {
                    response.remove_header(header::CONTENT_TYPE);
                    response.remove_header(header::CONTENT_LENGTH);
                    response.remove_header(header::TRANSFER_ENCODING);
                    response.set_status(StatusCode::NOT_MODIFIED);
                    return response.send(Body::empty());
                }
            }

            if request.is_head() {
                response.send(Body::empty())
            } else {
                response.send(Body::from(bytes))
            }
        }
        Serialized::Stream(body) => {
            if request.is_head() {
                response.send(Body::empty())
            } else {
                response.send(body)
            }
        }
        Serialized::Nothing => response.send(Body::empty()),
    }
}

fn set_default_content_type(
    response: &ResponseHandle,
    content_type: &str,
    charset: Option<&str>,
) -> Result<()> {
    if response.headers_sent() || response.has_header(header::CONTENT_TYPE) {
        return Ok(());
    }
    let value = match charset {
        Some(charset) => format!("{content_type}; charset={charset}"),
        None => content_type.to_string(),
    };
    let value = HeaderValue::from_str(&value)
        .map_err(|_| Error::Internal(format!("invalid content-type {value:?}")))?;
    response.set_header(header::CONTENT_TYPE, value);
    Ok(())
}

/// Encodes `text` in `charset` (UTF-8 when unset).
pub fn encode_text(text: &str, charset: Option<&str>) -> Result<Bytes> {
    let Some(charset) = charset else {
        return Ok(Bytes::copy_from_slice(text.as_bytes()));
    };

    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(Bytes::copy_from_slice(text.as_bytes())),
        "utf-16le" | "utf16le" | "ucs-2" | "ucs2" => {
            Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
        }
        "utf-16be" | "utf16be" => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
        _ => Err(Error::UnencodableCharset(charset.to_string())),
    }
}
