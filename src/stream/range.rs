//! HTTP `Range` header handling
//!
//! Only single `bytes=start-[end]` ranges are honoured. Anything else,
//! suffix and multi-range requests included, is treated as if no range had
//! been requested, so the caller falls back to a full response.

/// A single `bytes=start-` or `bytes=start-end` range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

/// Outcome of applying a range to content of known size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Inclusive byte span to serve with 206
    Partial { start: u64, end: u64 },
    /// Nothing to serve: 416 with `Content-Range: bytes */size`
    Unsatisfiable,
}

impl ByteRange {
    /// Parse a `Range` header value, `None` when malformed, suffix or multi-range
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (unit, spec) = header.split_once('=')?;
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return None;
        }

        let spec = spec.trim();
        if spec.contains(',') {
            return None;
        }

        let (start_str, end_str) = spec.split_once('-')?;
        let (start_str, end_str) = (start_str.trim(), end_str.trim());

        let start = start_str.parse::<u64>().ok()?;
        let end = if end_str.is_empty() {
            None
        } else {
            let end = end_str.parse::<u64>().ok()?;
            if end < start {
                return None;
            }
            Some(end)
        };

        Some(ByteRange { start, end })
    }

    /// Clamp the range against the content size
    pub fn resolve(&self, size: u64) -> RangeOutcome {
        if self.start >= size {
            return RangeOutcome::Unsatisfiable;
        }
        let last = size - 1;
        let end = self.end.map_or(last, |e| e.min(last));
        RangeOutcome::Partial {
            start: self.start,
            end,
        }
    }
}

impl RangeOutcome {
    /// Number of bytes in a partial response
    pub fn len(&self) -> u64 {
        match self {
            RangeOutcome::Partial { start, end } => end - start + 1,
            RangeOutcome::Unsatisfiable => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Content-Range` value for a served span
pub fn content_range(start: u64, end: u64, size: u64) -> String {
    format!("bytes {}-{}/{}", start, end, size)
}

/// `Content-Range` value for a 416 response
pub fn unsatisfied_range(size: u64) -> String {
    format!("bytes */{}", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_closed_range() {
        assert_eq!(
            ByteRange::parse("bytes=500-699"),
            Some(ByteRange { start: 500, end: Some(699) })
        );
    }

    #[test]
    fn test_parse_open_range() {
        assert_eq!(
            ByteRange::parse("bytes=1024-"),
            Some(ByteRange { start: 1024, end: None })
        );
    }

    #[test]
    fn test_parse_suffix_range_is_ignored() {
        assert_eq!(ByteRange::parse("bytes=-500"), None);
        assert_eq!(ByteRange::parse("bytes= -500"), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(ByteRange::parse("invalid"), None);
        assert_eq!(ByteRange::parse("items=0-10"), None);
        assert_eq!(ByteRange::parse("bytes=abc-def"), None);
        assert_eq!(ByteRange::parse("bytes=10-5"), None);
        assert_eq!(ByteRange::parse("bytes=0-1,5-9"), None);
        assert_eq!(ByteRange::parse("bytes=-"), None);
    }

    #[test]
    fn test_resolve_clamps_end() {
        let range = ByteRange { start: 900, end: Some(5000) };
        assert_eq!(range.resolve(1000), RangeOutcome::Partial { start: 900, end: 999 });

        let open = ByteRange { start: 10, end: None };
        assert_eq!(open.resolve(1000), RangeOutcome::Partial { start: 10, end: 999 });
    }

    #[test]
    fn test_resolve_start_past_end() {
        let range = ByteRange { start: 1000, end: None };
        assert_eq!(range.resolve(1000), RangeOutcome::Unsatisfiable);
        assert_eq!(range.resolve(0), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn test_outcome_len() {
        assert_eq!(RangeOutcome::Partial { start: 500, end: 699 }.len(), 200);
        assert!(RangeOutcome::Unsatisfiable.is_empty());
    }

    #[test]
    fn test_header_values() {
        assert_eq!(content_range(500, 699, 1000), "bytes 500-699/1000");
        assert_eq!(unsatisfied_range(1000), "bytes */1000");
    }
}
