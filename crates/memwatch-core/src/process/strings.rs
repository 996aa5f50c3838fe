//! Null-terminated string decoding for bounded reads from foreign memory.
//!
//! A string read always fetches a fixed byte budget and then looks for the
//! terminator inside it, so decoding works on an already-copied buffer and
//! never touches the target process.

use encoding_rs::{UTF_8, UTF_16LE};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

/// How the bytes of a string in the target process are encoded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ReadStringType {
    /// Guess between UTF-16 and UTF-8 from the leading bytes.
    #[default]
    AutoDetect,
    /// Single-byte ASCII; bytes above 0x7F decode as `?`.
    Ascii,
    /// Single-byte code units.
    Utf8,
    /// Little-endian double-byte code units.
    Utf16,
}

impl ReadStringType {
    /// Size in bytes of one null code unit for this encoding.
    pub fn terminator_width(self) -> usize {
        match self {
            ReadStringType::Utf16 => 2,
            _ => 1,
        }
    }
}

/// A decoded string together with whether the terminator was missing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadString {
    pub value: String,
    /// `true` when the whole budget was consumed without finding a null unit.
    pub truncated: bool,
}

impl ReadString {
    pub fn into_string(self) -> String {
        self.value
    }
}

/// Pick UTF-16 when the buffer starts with a non-zero byte followed by a
/// zero high byte, UTF-8 otherwise.
pub fn detect_string_type(bytes: &[u8]) -> ReadStringType {
    if bytes.len() >= 2 && bytes[0] != 0 && bytes[1] == 0 {
        ReadStringType::Utf16
    } else {
        ReadStringType::Utf8
    }
}

/// Decode `bytes` up to the first null unit of the chosen encoding.
pub fn decode_string(bytes: &[u8], kind: ReadStringType) -> ReadString {
    let kind = match kind {
        ReadStringType::AutoDetect => detect_string_type(bytes),
        other => other,
    };

    let (end, truncated) = match kind.terminator_width() {
        2 => match bytes.chunks_exact(2).position(|unit| unit == [0, 0]) {
            Some(index) => (index * 2, false),
            None => (bytes.len() - bytes.len() % 2, true),
        },
        _ => match bytes.iter().position(|&b| b == 0) {
            Some(index) => (index, false),
            None => (bytes.len(), true),
        },
    };
    let bytes = &bytes[..end];

    let value = match kind {
        ReadStringType::Ascii => bytes
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect(),
        ReadStringType::Utf16 => {
            let (decoded, had_errors) = UTF_16LE.decode_without_bom_handling(bytes);
            if had_errors {
                debug!("UTF-16 decoding replaced invalid units in {} bytes", bytes.len());
            }
            decoded.into_owned()
        }
        _ => {
            let (decoded, had_errors) = UTF_8.decode_without_bom_handling(bytes);
            if had_errors {
                debug!(
                    "UTF-8 decoding had errors for bytes: {:?}",
                    &bytes[..bytes.len().min(20)]
                );
            }
            decoded.into_owned()
        }
    };

    ReadString { value, truncated }
}
