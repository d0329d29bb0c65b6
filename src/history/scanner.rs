//! Anchor search and the unrolled log view
//!
//! A ring-buffer history memory starts wherever the write cursor last
//! wrapped. The first structurally valid timestamp marks that point; the log
//! is read from there to the end of memory and continues from the start of
//! memory up to the anchor. No rotated copy is made: `LogView` maps logical
//! positions onto the two physical ranges.

use std::borrow::Cow;

use chrono::NaiveDateTime;
use tracing::debug;

use super::variant::{DecoderVariant, TagKind, TagTable};

/// First valid timestamp in the raw memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Physical offset of the timestamp's escape sequence
    pub offset: usize,
    pub time: NaiveDateTime,
}

/// Find the first complete timestamp record with plausible fields
///
/// Plausible means a real calendar date and, when the layout carries one, a
/// save-type byte the variant knows.
pub fn find_anchor(raw: &[u8], variant: &DecoderVariant, table: &TagTable) -> Option<Anchor> {
    let escape = variant.escape.as_slice();
    if escape.is_empty() || raw.len() <= escape.len() {
        return None;
    }

    for offset in 0..raw.len() - escape.len() {
        if !raw[offset..].starts_with(escape) {
            continue;
        }
        let tag_at = offset + escape.len();
        let Some(TagKind::Timestamp(layout)) = table.escaped(raw[tag_at]) else {
            continue;
        };
        let Some(payload) = raw.get(tag_at + 1..tag_at + 1 + layout.payload_len()) else {
            continue;
        };
        if !layout.trailer_matches(payload) {
            continue;
        }
        if let Some(code) = layout.save_code(payload) {
            if variant.save_mode(code).is_none() {
                continue;
            }
        }
        if let Some(time) = layout.parse_time(payload) {
            debug!(offset, %time, "anchor found");
            return Some(Anchor { offset, time });
        }
    }
    None
}

/// Position where reading starts for a given anchor
///
/// Wrapping memories start at the anchor. Linear logs start at their first
/// escape sequence so that settings stored ahead of the first timestamp are
/// not lost.
pub fn read_start(raw: &[u8], variant: &DecoderVariant, anchor: &Anchor) -> usize {
    if variant.wraps {
        return anchor.offset;
    }
    let escape = variant.escape.as_slice();
    raw.windows(escape.len())
        .position(|w| w == escape)
        .filter(|&p| p <= anchor.offset)
        .unwrap_or(anchor.offset)
}

/// Logical view of the log: `raw[start..]` followed by `raw[..start]` when
/// the memory wraps, with trailing fill bytes dropped
#[derive(Debug, Clone, Copy)]
pub struct LogView<'a> {
    head: &'a [u8],
    tail: &'a [u8],
    start: usize,
    len: usize,
}

impl<'a> LogView<'a> {
    pub fn new(raw: &'a [u8], start: usize, wraps: bool, fill: Option<u8>) -> Self {
        let start = start.min(raw.len());
        let head = &raw[start..];
        let tail: &[u8] = if wraps { &raw[..start] } else { &[] };
        let mut view = Self {
            head,
            tail,
            start,
            len: head.len() + tail.len(),
        };
        if let Some(fill) = fill {
            while view.len > 0 && view.get(view.len - 1) == Some(fill) {
                view.len -= 1;
            }
        }
        if !view.tail.is_empty() {
            debug!(start, len = view.len, "log unrolled at anchor");
        }
        view
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes left from `pos` to the end of the log
    pub fn available(&self, pos: usize) -> usize {
        self.len.saturating_sub(pos)
    }

    pub fn get(&self, pos: usize) -> Option<u8> {
        if pos >= self.len {
            return None;
        }
        if pos < self.head.len() {
            Some(self.head[pos])
        } else {
            self.tail.get(pos - self.head.len()).copied()
        }
    }

    /// `n` bytes from `pos`; borrowed unless the range spans the wrap point
    pub fn slice(&self, pos: usize, n: usize) -> Option<Cow<'a, [u8]>> {
        let end = pos.checked_add(n)?;
        if end > self.len {
            return None;
        }
        let split = self.head.len();
        if end <= split {
            Some(Cow::Borrowed(&self.head[pos..end]))
        } else if pos >= split {
            Some(Cow::Borrowed(&self.tail[pos - split..end - split]))
        } else {
            let mut joined = Vec::with_capacity(n);
            joined.extend_from_slice(&self.head[pos..]);
            joined.extend_from_slice(&self.tail[..end - split]);
            Some(Cow::Owned(joined))
        }
    }

    /// True if `pattern` starts at `pos`
    pub fn starts_with(&self, pos: usize, pattern: &[u8]) -> bool {
        self.slice(pos, pattern.len())
            .is_some_and(|bytes| bytes.as_ref() == pattern)
    }

    /// Offset of a logical position in the unrolled log
    pub fn index_of(&self, pos: usize) -> u32 {
        u32::try_from(self.start + pos).unwrap_or(u32::MAX)
    }
}
