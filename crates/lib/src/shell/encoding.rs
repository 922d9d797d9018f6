//! Decoding of shell output.
//!
//! Windows PowerShell writes redirected text as UTF-16LE with a byte-order
//! mark, every other supported shell writes UTF-8. Detection looks at the
//! bytes first and only then at the configured default, so swapping the host
//! shell does not require a configuration change.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// How to decode shell output that carries no byte-order mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputEncoding {
  /// Guess from the byte pattern: NUL bytes in odd positions mean UTF-16LE.
  #[default]
  Auto,
  Utf8,
  Utf16Le,
}

impl FromStr for OutputEncoding {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "auto" => Ok(Self::Auto),
      "utf8" | "utf-8" => Ok(Self::Utf8),
      "utf16le" | "utf-16le" | "utf16" | "utf-16" => Ok(Self::Utf16Le),
      other => Err(format!("unknown encoding '{}'", other)),
    }
  }
}

/// Decode raw shell output to a string.
///
/// A leading BOM always wins and is stripped. Invalid sequences are replaced
/// with U+FFFD instead of failing.
pub fn decode(bytes: &[u8], encoding: OutputEncoding) -> String {
  if let Some(rest) = bytes.strip_prefix(&UTF16LE_BOM) {
    return decode_utf16le(rest);
  }
  if let Some(rest) = bytes.strip_prefix(&UTF8_BOM) {
    return String::from_utf8_lossy(rest).into_owned();
  }

  match encoding {
    OutputEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
    OutputEncoding::Utf16Le => decode_utf16le(bytes),
    OutputEncoding::Auto if looks_like_utf16le(bytes) => decode_utf16le(bytes),
    OutputEncoding::Auto => String::from_utf8_lossy(bytes).into_owned(),
  }
}

fn decode_utf16le(bytes: &[u8]) -> String {
  let units = bytes
    .chunks(2)
    .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]));
  char::decode_utf16(units)
    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
    .collect()
}

/// ASCII-heavy UTF-16LE text has a zero high byte in nearly every code unit.
fn looks_like_utf16le(bytes: &[u8]) -> bool {
  if bytes.len() < 2 {
    return false;
  }
  let sample = &bytes[..bytes.len().min(512)];
  let units = sample.len() / 2;
  let zero_high = sample.chunks_exact(2).filter(|pair| pair[1] == 0 && pair[0] != 0).count();
  zero_high * 2 > units
}
