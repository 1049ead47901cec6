//! Single file responses with conditional GET and Range support.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};

use crate::context::{self, RequestContext, ResponseHandle};
use crate::error::{Error, Result};
use crate::http::conditional::{is_conditional, is_fresh, is_precondition_failure, is_range_fresh};
use crate::http::etag::stat_tag;
use crate::http::header::format_http_date;
use crate::http::range::{is_bytes_range, parse_range, RangeSet};
use crate::observability::metrics;
use crate::static_files::path::{contains_dotfile, resolve, resolve_path, ResolvedPath};
use crate::static_files::stream::{self, StreamOutcome};
use crate::static_files::{mime, DotfilesPolicy, SendOptions, MAX_MAX_AGE_MS};

/// Sends `pathname` for the request bound to the current task.
pub async fn send(pathname: &str, options: &SendOptions) -> Result<()> {
    let ctx = context::current()?;
    send_file(&ctx, pathname, options).await
}

/// Sends the file at `pathname` (plain, not percent-encoded) as the response.
///
/// Resolves once the body has been fully handed to the client, or the
/// client went away. A missing file is [`Error::NotFound`] and nothing is
/// written, so the caller can try something else.
pub async fn send_file(ctx: &RequestContext, pathname: &str, options: &SendOptions) -> Result<()> {
    let resolved = resolve(pathname, options.root.as_deref())?;
    send_resolved(ctx, resolved, pathname, pathname.ends_with('/'), options).await
}

/// Like [`send_file`] for a filesystem path, which need not be UTF-8.
pub async fn send_path(ctx: &RequestContext, path: &Path, options: &SendOptions) -> Result<()> {
    let resolved = resolve_path(path, options.root.as_deref())?;
    let label = path.to_string_lossy();
    send_resolved(ctx, resolved, &label, false, options).await
}

async fn send_resolved(
    ctx: &RequestContext,
    resolved: ResolvedPath,
    pathname: &str,
    trailing_slash: bool,
    options: &SendOptions,
) -> Result<()> {
    if contains_dotfile(&resolved.parts) {
        match options.dotfiles {
            DotfilesPolicy::Allow => {}
            DotfilesPolicy::Deny => {
                tracing::debug!(pathname, "Denied dotfile");
                return Err(Error::Forbidden(format!("dotfile {pathname:?}")));
            }
            DotfilesPolicy::Ignore => {
                tracing::debug!(pathname, "Ignored dotfile");
                return Err(Error::NotFound(pathname.to_string()));
            }
        }
    }

    if trailing_slash {
        return Err(Error::Forbidden(format!("directory {pathname:?}")));
    }

    let metadata = match tokio::fs::metadata(&resolved.path).await {
        Ok(metadata) => metadata,
        Err(err) if is_missing(&err) => {
            metrics::record_static_file("not_found");
            return Err(Error::NotFound(pathname.to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    if metadata.is_dir() {
        return Err(Error::Forbidden(format!("directory {pathname:?}")));
    }

    let response = ctx.response();
    let request = ctx.request();
    if response.headers_sent() {
        tracing::warn!(pathname, "Headers already sent, cannot send file");
        return Err(Error::HeadersSent);
    }

    let size = metadata.len();
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);

    if !options.disable_accept_ranges {
        set_if_absent(response, header::ACCEPT_RANGES, "bytes")?;
    }
    if !options.disable_cache_control {
        let max_age = options.max_age_ms.min(MAX_MAX_AGE_MS) / 1000;
        let mut value = format!("public, max-age={max_age}");
        if options.immutable {
            value.push_str(", immutable");
        }
        set_if_absent(response, header::CACHE_CONTROL, &value)?;
    }
    if !options.disable_last_modified {
        set_if_absent(response, header::LAST_MODIFIED, &format_http_date(modified))?;
    }
    if !options.disable_etag {
        set_if_absent(response, header::ETAG, &stat_tag(size, modified))?;
    }
    let content_type = mime::content_type_for_path(&resolved.path)
        .unwrap_or_else(|| "application/octet-stream".to_string());
    set_if_absent(response, header::CONTENT_TYPE, &content_type)?;

    let etag = response.header_str(header::ETAG);
    let last_modified = response.header_str(header::LAST_MODIFIED);

    if is_conditional(&request.headers) {
        if is_precondition_failure(&request.headers, etag.as_deref(), last_modified.as_deref()) {
            return Err(Error::PreconditionFailed);
        }

        let status = response.status();
        let cacheable = status.is_success() || status == StatusCode::NOT_MODIFIED;
        if cacheable && is_fresh(&request.headers, etag.as_deref(), last_modified.as_deref()) {
            tracing::debug!(pathname, "Not modified");
            for name in [
                header::CONTENT_ENCODING,
                header::CONTENT_LANGUAGE,
                header::CONTENT_LENGTH,
                header::CONTENT_RANGE,
                header::CONTENT_TYPE,
            ] {
                response.remove_header(name);
            }
            response.set_status(StatusCode::NOT_MODIFIED);
            metrics::record_static_file("not_modified");
            return response.send(Body::empty());
        }
    }

    let mut offset = options.start.unwrap_or(0);
    let mut len = size.saturating_sub(offset);
    if let Some(end) = options.end {
        len = len.min(end.saturating_add(1).saturating_sub(offset));
    }

    if !options.disable_accept_ranges {
        if let Some(range) = request.header_str(header::RANGE).filter(|r| is_bytes_range(r)) {
            let parsed = parse_range(len, range);

            if !is_range_fresh(&request.headers, etag.as_deref(), last_modified.as_deref()) {
                tracing::debug!(pathname, "Range is stale, sending the full file");
            } else {
                match parsed {
                    RangeSet::Unsatisfiable => {
                        return Err(Error::RangeNotSatisfiable { length: len });
                    }
                    RangeSet::Ranges(ranges) if ranges.len() == 1 => {
                        let range = ranges[0];
                        response.set_status(StatusCode::PARTIAL_CONTENT);
                        response.set_header(
                            header::CONTENT_RANGE,
                            header_value(&format!("bytes {}-{}/{}", range.start, range.end, len))?,
                        );
                        offset += range.start;
                        len = range.end - range.start + 1;
                    }
                    // Several ranges or a malformed header: the full body.
                    _ => {}
                }
            }
        }
    }

    response.set_header(header::CONTENT_LENGTH, HeaderValue::from(len));

    if request.is_head() || len == 0 {
        metrics::record_static_file("sent");
        return response.send(Body::empty());
    }

    let (body, done) = match stream::open(&resolved.path, offset, len).await {
        Ok(opened) => opened,
        Err(err) if is_missing(&err) => return Err(Error::NotFound(pathname.to_string())),
        Err(err) => return Err(err.into()),
    };
    response.send(Body::from_stream(body))?;
    metrics::record_static_file("sent");

    match done.await {
        Ok(StreamOutcome::Finished) => Ok(()),
        Ok(StreamOutcome::Failed(err)) => {
            tracing::error!(pathname, error = %err, "File stream failed");
            Err(err.into())
        }
        Ok(StreamOutcome::Aborted) | Err(_) => {
            tracing::debug!(pathname, "Client went away before the file was sent");
            Ok(())
        }
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::Internal(e.to_string()))
}

fn set_if_absent(response: &ResponseHandle, name: HeaderName, value: &str) -> Result<()> {
    if !response.has_header(&name) {
        response.set_header(name, header_value(value)?);
    }
    Ok(())
}
