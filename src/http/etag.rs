//! Entity tag generation.
//!
//! Two algorithms are kept on purpose:
//! - buffers are tagged by content hash (`"{len_hex}-{sha1_base64[..27]}"`)
//! - files are tagged by stat (`"{size_hex}-{mtime_ms_hex}"`) so the file is never read to tag it

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// Tag for a zero-length entity: SHA-1 of the empty string, truncated to 27 base64 chars.
pub const EMPTY_ENTITY_TAG: &str = "\"0-2jmj7l5rSw0yVb/vlWAYkK/YBwk\"";

/// Strong entity tag for an in-memory body.
pub fn entity_tag(buf: &[u8]) -> String {
    if buf.is_empty() {
        return EMPTY_ENTITY_TAG.to_string();
    }

    let digest = STANDARD.encode(Sha1::digest(buf));
    format!("\"{:x}-{}\"", buf.len(), &digest[..27])
}

/// Cheap entity tag derived from file metadata.
pub fn stat_tag(size: u64, modified: SystemTime) -> String {
    let mtime_ms = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("\"{size:x}-{mtime_ms:x}\"")
}
