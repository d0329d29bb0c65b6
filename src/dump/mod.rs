//! History dump files
//!
//! Saved history memories come in two shapes:
//!
//! ```text
//! GMC *.bin                           Gamma-Scout *.dat
//! ┌──────────────────────────────┐    ┌─────────────────────────────────┐
//! │ "DataOrigin: ..." (optional, │    │ free text ...                   │
//! │  128 bytes, space padded)    │    │ GAMMA-SCOUT Protokoll ...       │
//! ├──────────────────────────────┤    │ f5ef3012100124...<checksum>     │
//! │ raw memory image             │    │ <hex pairs>...<checksum>        │
//! └──────────────────────────────┘    └─────────────────────────────────┘
//! ```
//!
//! Loaders return the raw memory as a `RawLog` plus whatever they noticed on
//! the way; damage inside the data is reported, not fatal.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::history::{DumpFormat, RawLog};

mod constants {
    pub const ORIGIN_LABEL: &[u8] = b"DataOrigin:";
    pub const ORIGIN_HEADER_LEN: usize = 128;
    /// The device answers a failed read with this text instead of memory
    pub const DEVICE_ERROR: &[u8] = b"ERROR";
    pub const DEVICE_ERROR_WINDOW: usize = 6;
    /// Largest GMC memory
    pub const MAX_MEMORY: usize = 1 << 20;
    /// Memory size of the older GMC counters
    pub const SMALL_MEMORY: usize = 1 << 16;

    pub const PROTOCOL_LINE: &str = "GAMMA-SCOUT Protokoll";
    pub const DATA_LINE_START: &str = "f5";
    pub const MAX_LINE_LEN: usize = 66;
    /// Stored in place of an unreadable hex pair
    pub const BAD_PAIR_VALUE: u8 = 0xFA;
}

/// Dump loading errors
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No protocol data: no line starting with 'f5' found")]
    NoProtocolData,

    #[error("Device error instead of history: {0}")]
    DeviceError(String),
}

/// GMC binary dump
#[derive(Debug, Clone)]
pub struct GmcDump {
    /// Text of the `DataOrigin:` header, if present
    pub origin: Option<String>,
    pub log: RawLog,
    /// Bytes removed beyond the memory size
    pub clipped: usize,
}

/// Split a GMC binary dump into origin label and memory image
///
/// Without an origin header the image is clipped to the memory size: files
/// written by the vendor viewer carry one page too many. A file holding the
/// device's error reply is rejected.
pub fn load_gmc_bin(mut bytes: Vec<u8>) -> Result<GmcDump, DumpError> {
    let window = &bytes[..bytes.len().min(constants::DEVICE_ERROR_WINDOW)];
    if window
        .windows(constants::DEVICE_ERROR.len())
        .any(|w| w == constants::DEVICE_ERROR)
    {
        let reply = String::from_utf8_lossy(&bytes).trim_end().to_string();
        return Err(DumpError::DeviceError(reply));
    }

    if bytes.starts_with(constants::ORIGIN_LABEL) {
        let header_end = bytes.len().min(constants::ORIGIN_HEADER_LEN);
        let label = &bytes[constants::ORIGIN_LABEL.len()..header_end];
        let origin = String::from_utf8_lossy(label)
            .trim_end_matches(|c| c == ' ' || c == '\0')
            .to_string();
        debug!(origin = %origin, "origin header found");
        let data = bytes.split_off(header_end);
        return Ok(GmcDump {
            origin: Some(origin),
            log: RawLog::new(data),
            clipped: 0,
        });
    }

    let memory = if bytes.len() > constants::MAX_MEMORY {
        constants::MAX_MEMORY
    } else {
        constants::SMALL_MEMORY
    };
    let clipped = bytes.len().saturating_sub(memory);
    if clipped > 0 {
        debug!(clipped, memory, "clipped bytes beyond memory size");
        bytes.truncate(memory);
    }
    Ok(GmcDump {
        origin: None,
        log: RawLog::new(bytes),
        clipped,
    })
}

/// Unreadable hex pair in a `.dat` file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BadPair {
    /// 1-based line number
    pub line: usize,
    /// 0-based character column
    pub column: usize,
}

/// Gamma-Scout ASCII-hex dump
#[derive(Debug, Clone)]
pub struct ScoutDump {
    pub log: RawLog,
    /// Lines whose trailing checksum did not match (1-based)
    pub checksum_errors: Vec<usize>,
    pub bad_pairs: Vec<BadPair>,
    /// Overlong lines that were ignored (1-based)
    pub skipped_lines: Vec<usize>,
    /// Lines with non-ASCII characters that were ignored (1-based)
    pub non_ascii_lines: Vec<usize>,
}

/// Extract protocol bytes from the text of a Gamma-Scout `.dat` dump
pub fn parse_scout_dat(text: &str) -> Result<ScoutDump, DumpError> {
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();
    let protocol = lines
        .iter()
        .position(|l| l.starts_with(constants::PROTOCOL_LINE))
        .unwrap_or(0);
    let first = lines[protocol..]
        .iter()
        .position(|l| l.starts_with(constants::DATA_LINE_START))
        .map(|p| protocol + p)
        .ok_or(DumpError::NoProtocolData)?;

    let mut dump = ScoutDump {
        log: RawLog::new(Vec::new()),
        checksum_errors: Vec::new(),
        bad_pairs: Vec::new(),
        skipped_lines: Vec::new(),
        non_ascii_lines: Vec::new(),
    };
    let mut data = Vec::new();

    for (n, line) in lines.iter().enumerate().skip(first) {
        let line_no = n + 1;
        if line.len() > constants::MAX_LINE_LEN {
            warn!(line = line_no, len = line.len(), "overlong line skipped");
            dump.skipped_lines.push(line_no);
            continue;
        }
        if !line.is_ascii() {
            warn!(line = line_no, "non-ASCII line skipped");
            dump.non_ascii_lines.push(line_no);
            continue;
        }
        if line.len() < 2 {
            continue;
        }

        let (body, checksum) = line.split_at(line.len() - 2);
        let mut sum: u8 = 0;
        for (column, pair) in body.as_bytes().chunks(2).enumerate().map(|(i, p)| (i * 2, p)) {
            let byte = match std::str::from_utf8(pair)
                .ok()
                .filter(|p| p.len() == 2)
                .and_then(|p| u8::from_str_radix(p, 16).ok())
            {
                Some(byte) => byte,
                None => {
                    warn!(line = line_no, column, "bad hex pair replaced by 0xFA");
                    dump.bad_pairs.push(BadPair {
                        line: line_no,
                        column,
                    });
                    constants::BAD_PAIR_VALUE
                }
            };
            sum = sum.wrapping_add(byte);
            data.push(byte);
        }

        if u8::from_str_radix(checksum, 16).ok() != Some(sum) {
            warn!(line = line_no, "checksum mismatch");
            dump.checksum_errors.push(line_no);
        }
    }

    debug!(bytes = data.len(), first_line = first + 1, "protocol data extracted");
    dump.log = RawLog::new(data);
    Ok(dump)
}

/// A dump file of either shape, reduced to what decoding needs
#[derive(Debug, Clone)]
pub struct LoadedDump {
    pub origin: Option<String>,
    pub log: RawLog,
    /// Problems noticed while loading
    pub warnings: Vec<String>,
}

/// Read a dump file in the given format
pub fn read_dump(path: impl AsRef<Path>, format: DumpFormat) -> Result<LoadedDump, DumpError> {
    let bytes = std::fs::read(path.as_ref())?;
    match format {
        DumpFormat::Binary => {
            let dump = load_gmc_bin(bytes)?;
            let mut warnings = Vec::new();
            if dump.origin.is_none() {
                warnings.push("No Data-Origin label found".to_string());
            }
            if dump.clipped > 0 {
                warnings.push(format!(
                    "Removed {} bytes beyond memory size",
                    dump.clipped
                ));
            }
            Ok(LoadedDump {
                origin: dump.origin,
                log: dump.log,
                warnings,
            })
        }
        DumpFormat::AsciiHex => {
            let text = String::from_utf8_lossy(&bytes);
            let dump = parse_scout_dat(&text)?;
            let mut warnings = Vec::new();
            for line in &dump.skipped_lines {
                warnings.push(format!("Line {}: too long, skipped", line));
            }
            for line in &dump.non_ascii_lines {
                warnings.push(format!("Line {}: non-ASCII characters, skipped", line));
            }
            for bad in &dump.bad_pairs {
                warnings.push(format!(
                    "Line {} column {}: bad hex pair replaced by 0xFA",
                    bad.line, bad.column
                ));
            }
            for line in &dump.checksum_errors {
                warnings.push(format!("Line {}: checksum mismatch", line));
            }
            Ok(LoadedDump {
                origin: None,
                log: dump.log,
                warnings,
            })
        }
    }
}

/// Fill-byte statistics of a raw memory image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    /// Total byte count
    pub total: usize,
    /// Byte count after clipping trailing fill bytes
    pub data_len: usize,
    pub fill_total: usize,
    pub fill_trailing: usize,
    /// Fill bytes inside the data
    pub fill_within: usize,
}

impl HistoryStats {
    pub fn of(raw: &[u8], fill: Option<u8>) -> Self {
        let Some(fill) = fill else {
            return Self {
                total: raw.len(),
                data_len: raw.len(),
                fill_total: 0,
                fill_trailing: 0,
                fill_within: 0,
            };
        };
        let data_len = raw
            .iter()
            .rposition(|&b| b != fill)
            .map_or(0, |p| p + 1);
        let fill_within = raw[..data_len].iter().filter(|&&b| b == fill).count();
        let fill_trailing = raw.len() - data_len;
        Self {
            total: raw.len(),
            data_len,
            fill_total: fill_within + fill_trailing,
            fill_trailing,
            fill_within,
        }
    }
}

impl std::fmt::Display for HistoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Binary data total byte count:     {} Bytes", self.total)?;
        writeln!(f, "Count of data bytes:              {} Bytes", self.data_len)?;
        writeln!(f, "Count of FF bytes - Total:        {} Bytes", self.fill_total)?;
        writeln!(f, "Count of FF bytes - Trailing:     {} Bytes", self.fill_trailing)?;
        write!(f, "Count of FF bytes - Within data:  {} Bytes", self.fill_within)
    }
}
