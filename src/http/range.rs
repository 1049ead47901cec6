//! `Range` header parsing.
//!
//! Ranges are clamped to the representation size, invalid entries are
//! dropped, and overlapping or adjacent ranges are merged while keeping
//! the order in which the client listed them.

use crate::http::header::parse_int;

/// Inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Outcome of parsing a `Range` header against a known size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSet {
    /// Header is not a range request at all.
    Malformed,
    /// Syntactically fine but no range overlaps the representation.
    Unsatisfiable,
    Ranges(Vec<ByteRange>),
}

/// True when the header names the `bytes` unit.
pub fn is_bytes_range(value: &str) -> bool {
    value.trim_start_matches(' ').starts_with("bytes=")
}

/// Parses `value` for a representation of `size` bytes, merging overlaps.
pub fn parse_range(size: u64, value: &str) -> RangeSet {
    let Some((_, specs)) = value.split_once('=') else {
        return RangeSet::Malformed;
    };

    let size = size as i64;
    let mut ranges = Vec::new();

    for spec in specs.split(',') {
        let mut bounds = spec.splitn(2, '-');
        let first = bounds.next().and_then(parse_int);
        let second = bounds.next().and_then(parse_int);

        let (start, mut end) = match (first, second) {
            // -nnn: the last nnn bytes
            (None, Some(suffix)) => (size - suffix, size - 1),
            // nnn-: to the end
            (Some(start), None) => (start, size - 1),
            (Some(start), Some(end)) => (start, end),
            (None, None) => continue,
        };

        if end > size - 1 {
            end = size - 1;
        }
        if start < 0 || start > end {
            continue;
        }

        ranges.push(ByteRange {
            start: start as u64,
            end: end as u64,
        });
    }

    if ranges.is_empty() {
        return RangeSet::Unsatisfiable;
    }
    RangeSet::Ranges(combine(ranges))
}

fn combine(ranges: Vec<ByteRange>) -> Vec<ByteRange> {
    let mut ordered: Vec<(usize, ByteRange)> = ranges.into_iter().enumerate().collect();
    ordered.sort_by_key(|(_, r)| r.start);

    let mut merged: Vec<(usize, ByteRange)> = Vec::with_capacity(ordered.len());
    for (index, range) in ordered {
        match merged.last_mut() {
            Some((current_index, current)) if range.start <= current.end + 1 => {
                if range.end > current.end {
                    current.end = range.end;
                    *current_index = (*current_index).min(index);
                }
            }
            _ => merged.push((index, range)),
        }
    }

    merged.sort_by_key(|(index, _)| *index);
    merged.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(set: RangeSet) -> Vec<(u64, u64)> {
        match set {
            RangeSet::Ranges(r) => r.into_iter().map(|r| (r.start, r.end)).collect(),
            other => panic!("expected ranges, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_range() {
        assert_eq!(ranges(parse_range(100, "bytes=10-19")), vec![(10, 19)]);
    }

    #[test]
    fn test_end_is_clamped() {
        assert_eq!(ranges(parse_range(100, "bytes=90-200")), vec![(90, 99)]);
    }

    #[test]
    fn test_suffix_and_open_ranges() {
        assert_eq!(ranges(parse_range(100, "bytes=-10")), vec![(90, 99)]);
        assert_eq!(ranges(parse_range(100, "bytes=95-")), vec![(95, 99)]);
    }

    #[test]
    fn test_unsatisfiable() {
        assert_eq!(parse_range(100, "bytes=200-300"), RangeSet::Unsatisfiable);
        assert_eq!(parse_range(100, "bytes=20-10"), RangeSet::Unsatisfiable);
        assert_eq!(parse_range(0, "bytes=0-"), RangeSet::Unsatisfiable);
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse_range(100, "bytes"), RangeSet::Malformed);
        assert!(!is_bytes_range("items=0-1"));
        assert!(is_bytes_range("  bytes=0-1"));
    }

    #[test]
    fn test_overlapping_ranges_merge_in_request_order() {
        assert_eq!(
            ranges(parse_range(100, "bytes=50-60, 0-4, 55-70, 5-9")),
            vec![(50, 70), (0, 9)]
        );
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        assert_eq!(ranges(parse_range(100, "bytes=abc, 0-1")), vec![(0, 1)]);
    }
}
