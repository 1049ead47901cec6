//! Turns errors that escaped the chain into an HTML error page.

use axum::body::Body;
use axum::http::{header, HeaderValue};

use crate::context::{self, RequestContext};
use crate::error::{Error, Result};
use crate::middleware::{Middleware, Next};

/// Catches errors from the rest of the chain and renders them.
pub fn error_boundary() -> impl Middleware {
    |next: Next| async move {
        match next.run().await {
            Ok(()) => Ok(()),
            Err(err) => {
                let ctx = context::current()?;
                render_error(&ctx, &err)
            }
        }
    }
}

fn document(status_line: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Error</title>\n</head>\n<body>\n<pre>{status_line}</pre>\n</body>\n</html>\n"
    )
}

/// Writes `err` as the response unless one was already committed.
///
/// Staged headers are discarded, except those the error itself requires
/// (`Content-Range` for 416).
pub fn render_error(ctx: &RequestContext, err: &Error) -> Result<()> {
    let status = err.status();
    let uri = &ctx.request().uri;
    if status.is_server_error() {
        tracing::error!(uri = %uri, status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::debug!(uri = %uri, status = status.as_u16(), error = %err, "Request rejected");
    }

    let response = ctx.response();
    if response.headers_sent() {
        tracing::warn!(uri = %uri, "Cannot render error, response already committed");
        return Ok(());
    }
    ctx.descriptor().payload = None;

    response.clear_headers();
    for (name, value) in err.headers() {
        response.set_header(name, value);
    }
    response.set_status(status);

    let reason = status.canonical_reason().unwrap_or("Error");
    let body = document(&format!("{} {}", status.as_u16(), reason));
    response.set_header(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    response.set_header(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.set_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response.set_header(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    if ctx.request().is_head() {
        response.send(Body::empty())
    } else {
        response.send(Body::from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextDefaults;
    use crate::middleware::Chain;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_error_renders_html_page() {
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let (ctx, rx) = RequestContext::new(request, &ContextDefaults::default());
        let chain = Chain::new()
            .with(error_boundary())
            .with(|_next: Next| async { Err::<(), _>(Error::Forbidden("nope".into())) });

        ctx.run(chain.run()).await.unwrap();
        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "default-src 'none'");
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("403 Forbidden"));
    }

    #[tokio::test]
    async fn test_range_error_keeps_content_range() {
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let (ctx, rx) = RequestContext::new(request, &ContextDefaults::default());
        ctx.response()
            .set_header(header::ETAG, HeaderValue::from_static("\"x\""));

        render_error(&ctx, &Error::RangeNotSatisfiable { length: 42 }).unwrap();
        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */42");
        assert!(response.headers().get(header::ETAG).is_none());
    }

    #[tokio::test]
    async fn test_committed_response_is_left_alone() {
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let (ctx, _rx) = RequestContext::new(request, &ContextDefaults::default());
        ctx.response().send(Body::empty()).unwrap();
        render_error(&ctx, &Error::Internal("late".into())).unwrap();
    }

    #[tokio::test]
    async fn test_descriptor_is_discarded() {
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let (ctx, rx) = RequestContext::new(request, &ContextDefaults::default());
        let chain = Chain::new().with(error_boundary()).with(|_next: Next| async {
            crate::http::descriptor::set_text("half done")?;
            Err::<(), _>(Error::Internal("boom".into()))
        });

        ctx.run(chain.run()).await.unwrap();
        let response = rx.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    }
}
