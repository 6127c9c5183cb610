//! Record extraction from raw sensor output.

use crate::literal::{self, Literal, LiteralError};
use crate::source::split_lines;

/// Lines opening with this character carry a structured record.
pub const RECORD_OPEN: char = '{';

/// One successfully parsed record line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// The line exactly as received (trimmed).
    pub raw: String,
    pub record: Literal,
}

/// Everything one poll produced.
#[derive(Debug, Default)]
pub struct Extracted {
    /// Every non-blank line, for echoing.
    pub lines: Vec<String>,
    pub readings: Vec<Reading>,
    /// Record lines that failed to parse.
    pub rejected: Vec<(String, LiteralError)>,
}

/// Split raw output into lines and evaluate the record lines. Bad lines are
/// collected, never fatal.
pub fn extract(raw: &str) -> Extracted {
    let mut out = Extracted::default();
    for line in split_lines(raw) {
        out.lines.push(line.to_string());
        if !line.starts_with(RECORD_OPEN) {
            continue;
        }
        match parse_record(line) {
            Ok(record) => out.readings.push(Reading {
                raw: line.to_string(),
                record,
            }),
            Err(e) => out.rejected.push((line.to_string(), e)),
        }
    }
    out
}

fn parse_record(line: &str) -> Result<Literal, LiteralError> {
    let value = literal::parse(line)?;
    if value.is_map() {
        Ok(value)
    } else {
        Err(LiteralError::Malformed {
            offset: 0,
            reason: "record is not a mapping".to_string(),
        })
    }
}
