//! History memory decoder
//!
//! Turns the raw history memory of a Geiger counter into time-stamped
//! records.
//!
//! # Pipeline
//! ```text
//! raw bytes ──> scanner (anchor, unrolled view) ──> dispatcher ──> records
//!                                                      │
//!                                 clock + rolling CPM window + channel
//! ```
//!
//! # Design Principles (KISS)
//! - Pure function of the buffer and the variant; no global state
//! - Device differences live in `DecoderVariant` tables only
//! - Damage in the log becomes issues next to the records, never a panic

pub mod clock;
pub mod codec;
pub mod common;
pub mod cpm;
pub mod dispatcher;
pub mod normalizer;
pub mod scanner;
pub mod variant;

use tracing::{info, warn};

pub use codec::CountCodec;
pub use common::{
    Annotation, ChannelSelector, DecodeResult, DecodedRecord, Measurement, RawLog, Sampling,
};
pub use normalizer::{normalize, CommentRow, HistoryRow, NormalizedHistory};
pub use variant::{DecoderVariant, DumpFormat, SaveMode, TagEntry, TagKind};

use crate::common::DecodeError;
use dispatcher::Dispatcher;
use scanner::{find_anchor, read_start, LogView};

/// Decode a complete history buffer
///
/// Fails only for an empty buffer or a variant whose tag map is inconsistent.
/// A buffer without any valid timestamp yields an empty result carrying a
/// `NoAnchorFound` issue.
pub fn decode(raw: &[u8], variant: &DecoderVariant) -> Result<DecodeResult, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::EmptyInput);
    }
    let table = variant.compile()?;

    let Some(anchor) = find_anchor(raw, variant, &table) else {
        warn!(
            variant = %variant.name,
            scanned = raw.len(),
            "no anchor found, no history available"
        );
        return Ok(DecodeResult::no_anchor(raw.len()));
    };

    let start = read_start(raw, variant, &anchor);
    let view = LogView::new(raw, start, variant.wraps, variant.fill);
    let output = Dispatcher::new(variant, &table, view, anchor.time).run();

    info!(
        variant = %variant.name,
        anchor = anchor.offset,
        records = output.records.len(),
        issues = output.issues.len(),
        truncated = output.truncated,
        "history decoded"
    );

    Ok(DecodeResult {
        records: output.records,
        truncated: output.truncated,
        anchor_offset: u32::try_from(anchor.offset).ok(),
        issues: output.issues,
    })
}

/// Decode a `RawLog`
pub fn decode_log(log: &RawLog, variant: &DecoderVariant) -> Result<DecodeResult, DecodeError> {
    decode(log.as_bytes(), variant)
}
