//! Helpers shared by the ASCII protocols: sentinel scanning, line
//! assembly and fixed-width numeric fields.

use hud_core::checksum::{parse_hex2, sum8};
use hud_core::source::{ByteSource, SourceError};

/// Result of scanning for a frame-start marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Found(u8),
    /// The source timed out or ran dry
    Idle,
    /// Scan limit reached without a marker
    Limit,
}

/// Skip bytes until one of `markers` shows up
pub fn scan_for(source: &mut dyn ByteSource, markers: &[u8], max_scan: usize) -> Result<Scan, SourceError> {
    for _ in 0..max_scan {
        match source.read_byte()? {
            None => return Ok(Scan::Idle),
            Some(b) if markers.contains(&b) => return Ok(Scan::Found(b)),
            Some(_) => {}
        }
    }
    Ok(Scan::Limit)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Bytes up to (not including) the end-of-line byte
    Complete(Vec<u8>),
    /// Timed out before the end of line
    Short(Vec<u8>),
    /// No end of line within the allowed length
    Overlong,
}

/// Read until `eol`. A trailing CR is stripped when `eol` is LF so that
/// CRLF captures replay with either setting.
pub fn read_line(source: &mut dyn ByteSource, eol: u8, max_len: usize) -> Result<Line, SourceError> {
    let mut line = Vec::with_capacity(max_len);
    loop {
        match source.read_byte()? {
            None => return Ok(Line::Short(line)),
            Some(b) if b == eol => {
                if eol == b'\n' && line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Line::Complete(line));
            }
            Some(b) => {
                if line.len() >= max_len {
                    return Ok(Line::Overlong);
                }
                line.push(b);
            }
        }
    }
}

/// Signed decimal integer from a fixed-width field.
///
/// Leading/trailing spaces are ignored and a sign is optional. Fields
/// holding `_` (Garmin / Dynon "not available") or anything non-numeric
/// yield `None`.
pub fn field_int(bytes: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(bytes).ok()?.trim();
    let (neg, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let v: i64 = digits.parse().ok()?;
    Some(if neg { -v } else { v })
}

/// Check a sentence ending in two hex digits of the additive sum-8 of
/// every preceding byte
pub fn sum8_valid(sentence: &[u8]) -> bool {
    if sentence.len() < 3 {
        return false;
    }
    let (body, digits) = sentence.split_at(sentence.len() - 2);
    parse_hex2(digits) == Some(sum8(body))
}

/// Append the two hex digit sum-8 checksum, for building fixtures
pub fn with_sum8(body: &[u8]) -> Vec<u8> {
    let mut v = body.to_vec();
    v.extend_from_slice(&hud_core::checksum::to_hex2(sum8(body)));
    v
}
