//! Conditional request evaluation (RFC 9110 §13).
//!
//! # Responsibilities
//! - Freshness for 304 responses (`If-None-Match`, `If-Modified-Since`)
//! - Preconditions for 412 responses (`If-Match`, `If-Unmodified-Since`)
//! - `If-Range` validation for partial responses
//!
//! # Design Decisions
//! - `Cache-Control: no-cache` on the request always means stale
//! - `If-None-Match` takes precedence over `If-Modified-Since`
//! - An unparseable `If-Unmodified-Since` is no constraint at all

use std::sync::LazyLock;

use axum::http::{header, HeaderMap};
use regex::Regex;

use crate::http::header::parse_http_date;

static NO_CACHE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|,)\s*?no-cache\s*?(?:,|$)").expect("static regex")
});

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Splits a comma separated header into tokens, dropping spaces before each token.
pub fn parse_token_list(value: &str) -> Vec<&str> {
    let bytes = value.as_bytes();
    let mut list = Vec::new();
    let (mut start, mut end) = (0, 0);

    for (i, b) in bytes.iter().enumerate() {
        match b {
            b' ' => {
                if start == end {
                    start = i + 1;
                    end = i + 1;
                }
            }
            b',' => {
                list.push(&value[start..end]);
                start = i + 1;
                end = i + 1;
            }
            _ => end = i + 1,
        }
    }
    list.push(&value[start..end]);
    list
}

/// Exact or weak (`W/`) equivalence in either direction.
fn etag_matches(token: &str, etag: &str) -> bool {
    token == etag
        || token.strip_prefix("W/") == Some(etag)
        || etag.strip_prefix("W/") == Some(token)
}

fn forces_reload(request: &HeaderMap) -> bool {
    header_str(request, header::CACHE_CONTROL).is_some_and(|cc| NO_CACHE.is_match(cc))
}

/// True when any validator header is present on the request.
pub fn is_conditional(request: &HeaderMap) -> bool {
    [
        header::IF_MATCH,
        header::IF_UNMODIFIED_SINCE,
        header::IF_NONE_MATCH,
        header::IF_MODIFIED_SINCE,
    ]
    .into_iter()
    .any(|name| header_str(request, name).is_some())
}

/// Full freshness check against the response's validators.
pub fn is_fresh(request: &HeaderMap, etag: Option<&str>, last_modified: Option<&str>) -> bool {
    let modified_since = header_str(request, header::IF_MODIFIED_SINCE);
    let none_match = header_str(request, header::IF_NONE_MATCH);

    if modified_since.is_none() && none_match.is_none() {
        return false;
    }
    if forces_reload(request) {
        return false;
    }

    if let Some(none_match) = none_match {
        if none_match == "*" {
            return true;
        }
        let Some(etag) = etag else { return false };
        return parse_token_list(none_match)
            .into_iter()
            .any(|token| etag_matches(token, etag));
    }

    match (modified_since.and_then(parse_http_date), last_modified.and_then(parse_http_date)) {
        (Some(since), Some(modified)) => modified <= since,
        _ => false,
    }
}

/// Freshness against `If-None-Match` only, as used for in-memory bodies.
pub fn is_fresh_etag(request: &HeaderMap, etag: &str) -> bool {
    let Some(none_match) = header_str(request, header::IF_NONE_MATCH) else {
        return false;
    };
    if forces_reload(request) {
        return false;
    }
    if none_match == "*" {
        return true;
    }
    parse_token_list(none_match)
        .into_iter()
        .any(|token| etag_matches(token, etag))
}

/// True when `If-Match` or `If-Unmodified-Since` rules out this representation.
pub fn is_precondition_failure(
    request: &HeaderMap,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> bool {
    if let Some(if_match) = header_str(request, header::IF_MATCH) {
        let Some(etag) = etag else { return true };
        if if_match == "*" {
            return false;
        }
        return !if_match
            .split(',')
            .map(str::trim)
            .any(|token| etag_matches(token, etag));
    }

    if let Some(since) = header_str(request, header::IF_UNMODIFIED_SINCE).and_then(parse_http_date) {
        let Some(last_modified) = last_modified else { return false };
        return match parse_http_date(last_modified) {
            Some(modified) => modified > since,
            None => true,
        };
    }

    false
}

/// Whether a `Range` request may be honored given `If-Range`.
pub fn is_range_fresh(request: &HeaderMap, etag: Option<&str>, last_modified: Option<&str>) -> bool {
    let Some(if_range) = header_str(request, header::IF_RANGE) else {
        return true;
    };

    if if_range.contains('"') {
        return etag.is_some_and(|etag| if_range.contains(etag));
    }

    let Some(last_modified) = last_modified else { return true };
    match (parse_http_date(last_modified), parse_http_date(if_range)) {
        (Some(modified), Some(since)) => modified <= since,
        _ => false,
    }
}
