//! Parsing of observation streams.
//!
//! Plain streams hold numbers separated by whitespace or commas, any number per
//! line. Timed streams hold one `<timestamp_ms> <value>` pair per line. In both,
//! blank lines and lines starting with `#` are skipped.

use std::io::BufRead;

use crate::error::{QEstimateError, Result};

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(is_separator).filter(|token| !token.is_empty())
}

fn content_lines<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .map(|(index, line)| {
            line.map(|line| (index + 1, line))
                .map_err(QEstimateError::from)
        })
        .filter(|entry| match entry {
            Ok((_, line)) => {
                let trimmed = line.trim();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            }
            Err(_) => true,
        })
}

fn parse_value(token: &str, line: usize) -> Result<f64> {
    token.parse::<f64>().map_err(|e| QEstimateError::Parse {
        line,
        message: format!("invalid value '{token}': {e}"),
    })
}

/// Calls `observe` for every value in a plain stream, returning how many were read.
///
/// # Errors
///
/// Returns `QEstimateError::Parse` with the 1-based line number of the first
/// token that is not a number, or `QEstimateError::Io` if reading fails.
pub fn for_each_value<R, F>(reader: R, mut observe: F) -> Result<u64>
where
    R: BufRead,
    F: FnMut(f64),
{
    let mut read = 0;
    for entry in content_lines(reader) {
        let (line_number, line) = entry?;
        for token in tokens(&line) {
            observe(parse_value(token, line_number)?);
            read += 1;
        }
    }

    Ok(read)
}

/// Calls `observe` with `(timestamp_ms, value)` for every line of a timed stream.
///
/// # Errors
///
/// Returns `QEstimateError::Parse` if a line does not hold exactly a
/// millisecond timestamp followed by a value.
pub fn for_each_timed_value<R, F>(reader: R, mut observe: F) -> Result<u64>
where
    R: BufRead,
    F: FnMut(u64, f64),
{
    let mut read = 0;
    for entry in content_lines(reader) {
        let (line_number, line) = entry?;
        let fields: Vec<&str> = tokens(&line).collect();

        let [timestamp, value] = fields.as_slice() else {
            return Err(QEstimateError::Parse {
                line: line_number,
                message: format!("expected '<timestamp_ms> <value>', found {} fields", fields.len()),
            });
        };

        let timestamp = timestamp.parse::<u64>().map_err(|e| QEstimateError::Parse {
            line: line_number,
            message: format!("invalid timestamp '{timestamp}': {e}"),
        })?;
        observe(timestamp, parse_value(value, line_number)?);
        read += 1;
    }

    Ok(read)
}
