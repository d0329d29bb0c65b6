//! Value codecs for history count records
//!
//! Pure functions turning raw byte groups into counts. None of them hold state,
//! so each is testable on its own.
//!
//! # Exponent-mantissa words
//!
//! Gamma-Scout stores counts as a 16-bit word: the top 5 bits are an exponent,
//! the low 11 bits a mantissa, and the count is `mantissa << exponent`.
//! The largest word, 0xFFFF, is 2047 * 2^31 which needs 42 bits, so counts are
//! computed in `u64` and never round.

use serde::{Deserialize, Serialize};

mod constants {
    pub const EXPONENT_SHIFT: u32 = 11;
    pub const EXPONENT_MASK: u16 = 0x1F;
    pub const MANTISSA_MASK: u16 = 0x07FF;
    pub const MAX_INTEGER_WIDTH: usize = 8;
    pub const EXP_MANTISSA_WIDTH: usize = 2;
}

/// Encoding of a count record payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountCodec {
    /// Unsigned integer, most significant byte first
    BigEndian,
    /// Unsigned integer, least significant byte first
    LittleEndian,
    /// Big-endian 16-bit word, 5-bit exponent and 11-bit mantissa
    ExpMantissa,
}

/// A decoded count and the number of payload bytes it occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub value: u64,
    pub consumed: usize,
}

impl CountCodec {
    /// Decode `width` bytes from the front of `bytes`
    ///
    /// Returns None when fewer than `width` bytes are present or the width is
    /// not representable by this codec.
    pub fn decode(&self, bytes: &[u8], width: usize) -> Option<Decoded> {
        if !self.supports_width(width) || bytes.len() < width {
            return None;
        }
        let payload = &bytes[..width];
        let value = match self {
            CountCodec::BigEndian => read_uint_be(payload),
            CountCodec::LittleEndian => read_uint_le(payload),
            CountCodec::ExpMantissa => exp_mantissa(u16::from_be_bytes([payload[0], payload[1]])),
        };
        Some(Decoded {
            value,
            consumed: width,
        })
    }

    /// Whether `width` is a legal payload size for this codec
    pub fn supports_width(&self, width: usize) -> bool {
        match self {
            CountCodec::BigEndian | CountCodec::LittleEndian => {
                (1..=constants::MAX_INTEGER_WIDTH).contains(&width)
            }
            CountCodec::ExpMantissa => width == constants::EXP_MANTISSA_WIDTH,
        }
    }
}

/// Read an unsigned big-endian integer of up to 8 bytes
#[inline]
pub fn read_uint_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Read an unsigned little-endian integer of up to 8 bytes
#[inline]
pub fn read_uint_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Decode an exponent-mantissa word into an exact count
#[inline]
pub fn exp_mantissa(word: u16) -> u64 {
    let exponent = u32::from((word >> constants::EXPONENT_SHIFT) & constants::EXPONENT_MASK);
    let mantissa = u64::from(word & constants::MANTISSA_MASK);
    mantissa << exponent
}

/// Pack an exponent and mantissa into a word; out-of-range bits are masked off
#[inline]
pub fn encode_exp_mantissa(exponent: u8, mantissa: u16) -> u16 {
    ((u16::from(exponent) & constants::EXPONENT_MASK) << constants::EXPONENT_SHIFT)
        | (mantissa & constants::MANTISSA_MASK)
}

/// Clamp a count to `max`, reporting whether clamping happened
#[inline]
pub fn clamp_count(value: u64, max: u64) -> (u64, bool) {
    if value > max {
        (max, true)
    } else {
        (value, false)
    }
}

/// Packed BCD byte to its decimal value (0x37 -> 37)
#[inline]
pub fn bcd(byte: u8) -> u8 {
    10 * (byte >> 4) + (byte & 0x0F)
}

/// True if both nibbles are decimal digits
#[inline]
pub fn is_bcd(byte: u8) -> bool {
    (byte >> 4) <= 9 && (byte & 0x0F) <= 9
}
