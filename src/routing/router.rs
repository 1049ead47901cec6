//! Method-scoped route tables.
//!
//! # Responsibilities
//! - Hold `(pattern, handler)` pairs in declaration order
//! - Dispatch to the first pattern that matches the request path
//! - Fall through to the rest of the chain on method mismatch or no match
//!
//! # Design Decisions
//! - First match wins; `/users/:id` registered before `/users/new` shadows it
//! - A handler receives `next` and may continue the chain itself
//! - Patterns are compiled on first use through the shared cache

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::context;
use crate::error::Result;
use crate::middleware::{Middleware, Next};
use crate::routing::pattern::{self, MatchOptions};

/// What a route handler receives.
#[derive(Debug)]
pub struct RouteMatch {
    /// The part of the path the pattern covered.
    pub matched: String,
    pub params: HashMap<String, String>,
    /// Continues the chain after this router.
    pub next: Next,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A route endpoint.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, route: RouteMatch) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(RouteMatch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, route: RouteMatch) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(route))
    }
}

#[derive(Clone)]
struct Route {
    pattern: String,
    handler: Arc<dyn Handler>,
}

/// Ordered route table, usable as a middleware.
#[derive(Clone)]
pub struct Router {
    /// `None` accepts every method.
    method: Option<Method>,
    prefix: String,
    options: MatchOptions,
    routes: Arc<Vec<Route>>,
}

impl Router {
    /// Routes for requests with `method` only.
    pub fn method(method: Method) -> Self {
        Self::with_method(Some(method))
    }

    /// Routes for any method.
    pub fn all() -> Self {
        Self::with_method(None)
    }

    pub fn get() -> Self {
        Self::method(Method::GET)
    }

    pub fn head() -> Self {
        Self::method(Method::HEAD)
    }

    pub fn post() -> Self {
        Self::method(Method::POST)
    }

    pub fn put() -> Self {
        Self::method(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::method(Method::DELETE)
    }

    pub fn connect() -> Self {
        Self::method(Method::CONNECT)
    }

    pub fn options() -> Self {
        Self::method(Method::OPTIONS)
    }

    pub fn trace() -> Self {
        Self::method(Method::TRACE)
    }

    pub fn patch() -> Self {
        Self::method(Method::PATCH)
    }

    fn with_method(method: Option<Method>) -> Self {
        Self {
            method,
            prefix: String::new(),
            options: MatchOptions::default(),
            routes: Arc::new(Vec::new()),
        }
    }

    /// Literal text prepended to every pattern.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn match_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends a route. Earlier routes take precedence.
    pub fn route(mut self, pattern: impl Into<String>, handler: impl Handler) -> Self {
        Arc::make_mut(&mut self.routes).push(Route {
            pattern: pattern.into(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    async fn dispatch(self, next: Next) -> Result<()> {
        let request = context::request()?;
        if let Some(method) = &self.method {
            if request.method != *method {
                return next.run().await;
            }
        }

        let pathname = request.uri.path();
        for route in self.routes.iter() {
            let full = format!("{}{}", self.prefix, route.pattern);
            if let Some(found) = pattern::match_pattern(pathname, &full, self.options)? {
                tracing::trace!(pattern = %full, path = pathname, "Route matched");
                let handler = Arc::clone(&route.handler);
                return handler
                    .call(RouteMatch {
                        matched: found.matched,
                        params: found.params,
                        next,
                    })
                    .await;
            }
        }
        next.run().await
    }
}

impl Middleware for Router {
    fn call(&self, next: Next) -> BoxFuture<'static, Result<()>> {
        Box::pin(self.clone().dispatch(next))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<&str> = self.routes.iter().map(|r| r.pattern.as_str()).collect();
        f.debug_struct("Router")
            .field("method", &self.method)
            .field("prefix", &self.prefix)
            .field("patterns", &patterns)
            .finish()
    }
}
