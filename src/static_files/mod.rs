//! Static file serving subsystem.
//!
//! # Data Flow
//! ```text
//! pathname (already percent-decoded)
//!     → path.rs (NUL, traversal, dotfile and trailing-slash checks)
//!     → send.rs (stat, caching headers, conditional GET, Range)
//!     → stream.rs (bounded file read with guaranteed cleanup)
//!     → ResponseHandle::send
//! ```
//!
//! # Design Decisions
//! - A missing file is `Error::NotFound` so an outer router can fall through
//! - No directory listing, index files, or redirect-to-slash
//! - File tags are stat based; the file is never read to compute an ETag

pub mod mime;
pub mod path;
pub mod send;
pub mod serve;
pub mod stream;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use send::{send, send_file, send_path};
pub use serve::{serve, StaticOptions};

/// One year, the largest `max-age` ever emitted.
pub const MAX_MAX_AGE_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// What to do with paths that have a segment starting with `.`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DotfilesPolicy {
    Allow,
    Deny,
    /// Behave as if the file did not exist.
    #[default]
    Ignore,
}

/// Per-call file sending options. `Default` enables every header.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Directory `pathname` is resolved against. Without it the process
    /// working directory is used.
    pub root: Option<PathBuf>,
    pub dotfiles: DotfilesPolicy,
    /// First byte of the file to serve.
    pub start: Option<u64>,
    /// Last byte of the file to serve, inclusive.
    pub end: Option<u64>,
    pub disable_accept_ranges: bool,
    pub disable_last_modified: bool,
    pub disable_etag: bool,
    pub disable_cache_control: bool,
    /// `Cache-Control` max-age in milliseconds, clamped to one year.
    pub max_age_ms: u64,
    pub immutable: bool,
}

impl SendOptions {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Default::default()
        }
    }
}
