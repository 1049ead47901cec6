//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, one task per request)
//!     → middleware chain (descriptor.rs setters, body readers, routers)
//!     → writer.rs (descriptor → response; etag.rs + conditional.rs for 304)
//!     → range.rs / conditional.rs for static files
//!     → Send to client
//! ```

pub mod conditional;
pub mod descriptor;
pub mod etag;
pub mod header;
pub mod range;
pub mod request_id;
pub mod server;
pub mod writer;

pub use request_id::{RequestId, UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
