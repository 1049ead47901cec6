//! Minimal HTTP server toolkit.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, request ID, timeout)
//!                         │  one RequestContext per request, bound to its task
//!                         ▼
//!                     middleware::Chain
//!                         │  access_log → error_boundary → routers → static files → not_found
//!                         │  handlers read body::* and set http::descriptor::*
//!                         ▼
//!                     http::writer (ETag, 304, HEAD, file payloads)
//!                         │
//!     Client Response ◀───┘  ResponseHandle::send commits exactly once
//! ```
//!
//! Cross-cutting: `config` (TOML), `observability` (tracing + metrics),
//! `lifecycle` (signals, graceful shutdown), `error` (one error type with
//! an HTTP status).

pub mod body;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod routing;
pub mod static_files;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use middleware::{Chain, Middleware, Next};
pub use routing::Router;
