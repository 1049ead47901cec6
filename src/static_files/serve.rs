//! Directory mount: serves files under a root for `GET` and `HEAD`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;

use crate::context;
use crate::error::Error;
use crate::middleware::{Middleware, Next};
use crate::static_files::{send_file, SendOptions};

/// Where a static mount lives and how its files are sent.
#[derive(Debug, Clone, Default)]
pub struct StaticOptions {
    /// Directory the request path is resolved against.
    pub root: PathBuf,
    /// URL prefix stripped before resolving, e.g. `/assets`. Empty mounts at `/`.
    pub prefix: String,
    pub send: SendOptions,
}

impl StaticOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }
}

/// Remainder of `path` under `prefix`, always starting with `/`.
fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    match rest {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

/// Serves files from `options.root`. Missing files and directory paths
/// continue the chain; every other failure is returned.
pub fn serve(options: StaticOptions) -> impl Middleware {
    let mut send_options = options.send.clone();
    send_options.root = Some(options.root.clone());
    let mount = Arc::new((options.prefix, send_options));

    move |next: Next| {
        let mount = Arc::clone(&mount);
        async move {
            let ctx = context::current()?;
            let request = ctx.request();
            if request.method != Method::GET && request.method != Method::HEAD {
                return next.run().await;
            }

            let (prefix, send_options) = &*mount;
            let Some(rest) = strip_mount(request.uri.path(), prefix) else {
                return next.run().await;
            };
            let pathname = urlencoding::decode(rest)
                .map_err(|_| Error::BadRequest(format!("undecodable path {rest:?}")))?;
            if pathname.ends_with('/') {
                return next.run().await;
            }

            match send_file(&ctx, &pathname, send_options).await {
                Err(err) if err.is_fallthrough() => next.run().await,
                result => result,
            }
        }
    }
}
