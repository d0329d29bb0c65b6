//! Error types for history decoding
//!
//! # Design Principles (KISS)
//! - Fatal errors (`DecodeError`) are reserved for caller mistakes: an empty
//!   buffer or a variant whose tag map cannot be resolved unambiguously
//! - Everything the device itself can get wrong is a `DecodeIssue`, collected
//!   alongside the records instead of aborting the decode
//! - Use thiserror for ergonomic error handling

use serde::Serialize;
use thiserror::Error;

/// Errors that abort a decode before any byte is interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Caller handed over a zero-length buffer
    #[error("Empty input: history buffer has no bytes")]
    EmptyInput,

    /// Two record kinds claim the same discriminator or bare code
    #[error("Inconsistent tag map: code 0x{code:02X} mapped to both {first} and {second}")]
    InconsistentTagMap {
        code: u8,
        first: String,
        second: String,
    },

    /// Variant definition is unusable for another reason
    #[error("Invalid variant '{variant}': {reason}")]
    InvalidVariant { variant: String, reason: String },
}

impl DecodeError {
    /// Create an inconsistent tag map error
    pub fn conflict(code: u8, first: impl Into<String>, second: impl Into<String>) -> Self {
        Self::InconsistentTagMap {
            code,
            first: first.into(),
            second: second.into(),
        }
    }

    /// Create an invalid variant error
    pub fn invalid_variant(variant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVariant {
            variant: variant.into(),
            reason: reason.into(),
        }
    }
}

/// Recoverable conditions met while decoding
///
/// None of these stop the decode from returning records. Offsets are positions
/// in the unrolled log, the same axis as `DecodedRecord::index`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum DecodeIssue {
    /// No structurally valid timestamp anywhere in the buffer
    #[error("No anchor found: no valid timestamp record in {scanned} bytes")]
    NoAnchorFound { scanned: usize },

    /// Log ends in the middle of a record
    #[error("Truncated record at #{offset}: needs {needed} bytes, {available} available")]
    Truncated {
        offset: u32,
        needed: usize,
        available: usize,
    },

    /// Escape discriminator unknown to the active variant
    #[error("Invalid tag at #{offset}: discriminator 0x{code:02X}")]
    InvalidTag { offset: u32, code: u8 },

    /// Decoded count above the variant's count ceiling
    #[error("Arithmetic overflow at #{offset}: raw count {raw} clamped to {clamped}")]
    ArithmeticOverflow { offset: u32, raw: u64, clamped: u64 },

    /// Length field points past the end of the buffer
    #[error("Out of bounds read at #{offset}: length field claims {claimed} bytes, {available} available")]
    OutOfBoundsRead {
        offset: u32,
        claimed: usize,
        available: usize,
    },
}

impl DecodeIssue {
    /// True for issues that end the decode pass
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoAnchorFound { .. } | Self::Truncated { .. } | Self::OutOfBoundsRead { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_error() {
        let err = DecodeError::EmptyInput;
        assert!(err.to_string().contains("Empty input"));
    }

    #[test]
    fn test_conflict_error() {
        let err = DecodeError::conflict(0x04, "Annotation", "Data(4)");
        let msg = err.to_string();
        assert!(msg.contains("0x04"));
        assert!(msg.contains("Annotation"));
        assert!(msg.contains("Data(4)"));
    }

    #[test]
    fn test_invalid_variant_error() {
        let err = DecodeError::invalid_variant("gmc", "empty escape sequence");
        assert!(err.to_string().contains("gmc"));
        assert!(err.to_string().contains("empty escape"));
    }

    #[test]
    fn test_issue_display() {
        let issue = DecodeIssue::InvalidTag {
            offset: 42,
            code: 0x07,
        };
        assert_eq!(issue.to_string(), "Invalid tag at #42: discriminator 0x07");

        let issue = DecodeIssue::Truncated {
            offset: 10,
            needed: 5,
            available: 2,
        };
        assert!(issue.to_string().contains("needs 5 bytes"));
    }

    #[test]
    fn test_terminal_issues() {
        assert!(DecodeIssue::NoAnchorFound { scanned: 0 }.is_terminal());
        assert!(DecodeIssue::Truncated {
            offset: 0,
            needed: 1,
            available: 0
        }
        .is_terminal());
        assert!(!DecodeIssue::InvalidTag { offset: 0, code: 0 }.is_terminal());
        assert!(!DecodeIssue::ArithmeticOverflow {
            offset: 0,
            raw: 1,
            clamped: 0
        }
        .is_terminal());
    }

    #[test]
    fn test_issue_serializes_with_kind() {
        let issue = DecodeIssue::InvalidTag { offset: 3, code: 9 };
        let json = serde_json::to_string(&issue).unwrap();
        assert!(json.contains("\"kind\":\"InvalidTag\""));
        assert!(json.contains("\"offset\":3"));
    }
}
