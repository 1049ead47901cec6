//! Request body subsystem.
//!
//! # Data Flow
//! ```text
//! Content-Length / Transfer-Encoding check (no body → None)
//!     → reader.rs (decode Content-Encoding, enforce limit, check length)
//!     → memoized per request in the context
//!     → parse.rs (media type gate, charset, JSON / text / form decoding)
//! ```
//!
//! # Design Decisions
//! - The first read decides the limit; later callers get the memoized result
//! - A media type mismatch is `Ok(None)`, not an error
//! - Only UTF charsets are accepted for text-bearing bodies

pub mod parse;
pub mod reader;

use serde::{Deserialize, Serialize};

pub use parse::{json, json_value, query, raw, text, url, urlencoded, with_limit, Reader};
pub use reader::{read_body, read_buffer, read_buffer_with};

/// Default body size limit: 100 KiB.
pub const DEFAULT_LIMIT: usize = 100 * 1024;

/// Limits applied while reading a request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyOptions {
    /// Maximum decoded body size in bytes.
    pub limit: usize,
}

impl Default for BodyOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
        }
    }
}
