//! Middleware chain.
//!
//! # Data Flow
//! ```text
//! Chain [m0, m1, m2]
//!     → m0(next₁)
//!         → next₁.run() → m1(next₂)
//!             → next₂.run() → m2(next₃)
//!                 → next₃.run() → Ok(()) (end of chain)
//! ```
//!
//! # Design Decisions
//! - A middleware decides whether to continue by calling `next.run()`
//! - Request and response are reached through the task-bound context, not arguments
//! - The stack is frozen into an `Arc<[_]>` so every request shares it without copying

pub mod access_log;
pub mod error_boundary;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::http::descriptor;

pub use access_log::access_log;
pub use error_boundary::{error_boundary, render_error};

/// One link in the request chain.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, next: Next) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, next: Next) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(next))
    }
}

type Stack = Arc<[Arc<dyn Middleware>]>;

/// Continuation handed to each middleware.
#[derive(Clone)]
pub struct Next {
    stack: Stack,
    index: usize,
}

impl Next {
    /// Runs the rest of the chain. Past the last middleware this is a no-op.
    pub async fn run(self) -> Result<()> {
        let Some(middleware) = self.stack.get(self.index).cloned() else {
            return Ok(());
        };
        middleware
            .call(Next {
                stack: self.stack,
                index: self.index + 1,
            })
            .await
    }

    /// A continuation that does nothing.
    pub fn end() -> Self {
        Self {
            stack: Arc::from(Vec::new()),
            index: 0,
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.stack.len().saturating_sub(self.index))
            .finish()
    }
}

/// Ordered middleware list, built once at startup.
#[derive(Clone)]
pub struct Chain {
    stack: Stack,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            stack: Arc::from(Vec::new()),
        }
    }

    /// Appends `middleware` to the end of the chain.
    pub fn with(self, middleware: impl Middleware) -> Self {
        let mut stack = self.stack.to_vec();
        stack.push(Arc::new(middleware));
        Self {
            stack: stack.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Runs the chain from the first middleware. Call inside a bound context.
    pub fn run(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        Next {
            stack: Arc::clone(&self.stack),
            index: 0,
        }
        .run()
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("len", &self.stack.len()).finish()
    }
}

/// Catch-all that answers `404` with a short HTML body.
pub fn not_found() -> impl Middleware {
    |_next: Next| async {
        descriptor::set_html("not found")?;
        descriptor::set_status(axum::http::StatusCode::NOT_FOUND)
    }
}

/// Catch-all that fails with [`Error::NotFound`], leaving the answer to an error boundary.
pub fn fail_not_found() -> impl Middleware {
    |_next: Next| async { Err::<(), _>(Error::NotFound("no route matched".into())) }
}
