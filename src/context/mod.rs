//! Per-request context propagation.
//!
//! # Data Flow
//! ```text
//! server accepts request
//!     → RequestContext::new (request head, body, response handle, descriptor)
//!     → RequestContext::run(chain)
//!         → task-local binding visible to every await point in the chain
//!         → context::spawn re-binds it inside spawned tasks
//!     → single ResponseWriter pass over the accumulated descriptor
//! ```
//!
//! # Design Decisions
//! - Binding is task-scoped (`tokio::task_local!`), never a global
//! - The descriptor is read exactly once, by the writer, at the end of `run`
//! - A writer failure never masks the chain's own error

pub mod response;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Body;
use axum::http::header::AsHeaderName;
use axum::http::{HeaderMap, Method, Request, Response, Uri, Version};
use bytes::Bytes;
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;

use crate::body::BodyOptions;
use crate::error::{Error, Result};
use crate::http::descriptor::ResponseDescriptor;
use crate::http::writer;

pub use response::ResponseHandle;

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
}

/// Immutable view of the inbound request line and headers.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Header value as `&str`. Repeated headers are joined with `", "`
    /// when the request is built, so one lookup sees all of them.
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
}

/// Server-level defaults every new context starts from.
#[derive(Debug, Clone, Default)]
pub struct ContextDefaults {
    pub body: BodyOptions,
    pub json_pretty: bool,
    pub disable_etag: bool,
}

/// Everything one in-flight request owns.
pub struct RequestContext {
    request: Arc<RequestHead>,
    response: Arc<ResponseHandle>,
    descriptor: Mutex<ResponseDescriptor>,
    body: Mutex<Option<Body>>,
    body_cache: OnceCell<Result<Option<Bytes>>>,
    body_defaults: BodyOptions,
}

impl RequestContext {
    /// Build a context for `request`. The receiver yields the committed response.
    pub fn new(
        request: Request<Body>,
        defaults: &ContextDefaults,
    ) -> (Arc<Self>, oneshot::Receiver<Response<Body>>) {
        let (parts, body) = request.into_parts();
        let (tx, rx) = oneshot::channel();

        let ctx = Self {
            request: Arc::new(RequestHead {
                method: parts.method,
                uri: parts.uri,
                version: parts.version,
                headers: join_repeated_headers(parts.headers),
            }),
            response: Arc::new(ResponseHandle::new(tx)),
            descriptor: Mutex::new(ResponseDescriptor {
                pretty: defaults.json_pretty,
                disable_etag: defaults.disable_etag,
                ..Default::default()
            }),
            body: Mutex::new(Some(body)),
            body_cache: OnceCell::new(),
            body_defaults: defaults.body.clone(),
        };
        (Arc::new(ctx), rx)
    }

    pub fn request(&self) -> &Arc<RequestHead> {
        &self.request
    }

    pub fn response(&self) -> &Arc<ResponseHandle> {
        &self.response
    }

    /// Mutable access to the pending descriptor.
    pub fn descriptor(&self) -> MutexGuard<'_, ResponseDescriptor> {
        self.descriptor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_descriptor(&self) -> ResponseDescriptor {
        std::mem::take(&mut *self.descriptor())
    }

    pub(crate) fn take_body(&self) -> Option<Body> {
        self.body.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) fn body_cache(&self) -> &OnceCell<Result<Option<Bytes>>> {
        &self.body_cache
    }

    pub(crate) fn body_defaults(&self) -> &BodyOptions {
        &self.body_defaults
    }

    /// Run `body` with this context bound, then write the response once.
    ///
    /// The chain's error wins over a writer error. A writer error alone
    /// propagates unless it is `HeadersSent`, which only gets logged.
    pub async fn run<F, T>(self: &Arc<Self>, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome = CURRENT.scope(Arc::clone(self), body).await;
        let written = CURRENT.scope(Arc::clone(self), writer::write(self)).await;

        match (outcome, written) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(value), Err(Error::HeadersSent)) => {
                tracing::warn!(uri = %self.request.uri, "Response already committed, skipping write");
                Ok(value)
            }
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(write_err)) => {
                tracing::warn!(uri = %self.request.uri, error = %write_err, "Response write failed after handler error");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// The context bound to the current task.
pub fn current() -> Result<Arc<RequestContext>> {
    CURRENT.try_with(Arc::clone).map_err(|_| Error::NoContext)
}

/// The request bound to the current task.
pub fn request() -> Result<Arc<RequestHead>> {
    CURRENT
        .try_with(|ctx| Arc::clone(&ctx.request))
        .map_err(|_| Error::NoContext)
}

/// The response bound to the current task.
pub fn response() -> Result<Arc<ResponseHandle>> {
    CURRENT
        .try_with(|ctx| Arc::clone(&ctx.response))
        .map_err(|_| Error::NoContext)
}

/// Spawn `future` on the runtime with the current request still bound.
pub fn spawn<F>(future: F) -> Result<JoinHandle<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let ctx = current()?;
    Ok(tokio::spawn(CURRENT.scope(ctx, future)))
}

/// Collapse repeated header fields into one comma-joined value.
fn join_repeated_headers(headers: HeaderMap) -> HeaderMap {
    let mut joined = HeaderMap::with_capacity(headers.keys_len());
    for name in headers.keys() {
        let mut values = headers.get_all(name).iter();
        let Some(first) = values.next() else { continue };
        let mut value = first.clone();
        for next in values {
            let mut buf = value.as_bytes().to_vec();
            buf.extend_from_slice(b", ");
            buf.extend_from_slice(next.as_bytes());
            if let Ok(merged) = axum::http::HeaderValue::from_bytes(&buf) {
                value = merged;
            }
        }
        joined.insert(name.clone(), value);
    }
    joined
}
