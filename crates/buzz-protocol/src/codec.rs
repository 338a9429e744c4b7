//! Codec for IRC lines.
//!
//! Lines are UTF-8, terminated by `\r\n` (a bare `\n` is accepted on input).

use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::message::IrcMessage;

/// Maximum line size: 8 KiB of tags plus a classic 512 byte IRC line.
pub const MAX_LINE_SIZE: usize = 8192 + 512;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Line exceeds maximum size.
    #[error("Line size {0} exceeds maximum {MAX_LINE_SIZE}")]
    LineTooLong(usize),

    /// Line is not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Malformed line or unencodable message.
    #[error("Invalid message: {0}")]
    Invalid(String),
}

/// Encode a message as a `\r\n` terminated line.
///
/// # Errors
///
/// Returns an error if a field would break the line structure or the line
/// is too long.
pub fn encode(message: &IrcMessage) -> Result<Bytes, ProtocolError> {
    let mut line = String::new();

    if !message.tags.is_empty() {
        line.push('@');
        let tags: Vec<String> = message
            .tags
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={}", escape_tag_value(v))
                }
            })
            .collect();
        line.push_str(&tags.join(";"));
        line.push(' ');
    }

    if let Some(prefix) = &message.prefix {
        check_token("prefix", prefix)?;
        line.push(':');
        line.push_str(prefix);
        line.push(' ');
    }

    check_token("command", &message.command)?;
    line.push_str(&message.command);

    if let Some((last, middle)) = message.params.split_last() {
        for param in middle {
            check_token("parameter", param)?;
            if param.starts_with(':') {
                return Err(ProtocolError::Invalid(format!(
                    "parameter {param:?} starts with ':'"
                )));
            }
            line.push(' ');
            line.push_str(param);
        }
        check_no_line_break("parameter", last)?;
        line.push(' ');
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            line.push(':');
        }
        line.push_str(last);
    }

    line.push_str("\r\n");
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLong(line.len()));
    }
    Ok(Bytes::from(line))
}

/// Decode a single line (with or without its terminator).
///
/// # Errors
///
/// Returns an error if the line is empty or malformed.
pub fn decode(line: &str) -> Result<IrcMessage, ProtocolError> {
    let mut rest = line.trim_end_matches(['\r', '\n']);
    if rest.trim().is_empty() {
        return Err(ProtocolError::Invalid("empty line".into()));
    }

    let mut tags = BTreeMap::new();
    if let Some(tagged) = rest.strip_prefix('@') {
        let (raw_tags, after) = tagged
            .split_once(' ')
            .ok_or_else(|| ProtocolError::Invalid("tags without command".into()))?;
        for tag in raw_tags.split(';').filter(|t| !t.is_empty()) {
            let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
            tags.insert(key.to_string(), unescape_tag_value(value));
        }
        rest = after.trim_start_matches(' ');
    }

    let mut prefix = None;
    if let Some(prefixed) = rest.strip_prefix(':') {
        let (source, after) = prefixed
            .split_once(' ')
            .ok_or_else(|| ProtocolError::Invalid("prefix without command".into()))?;
        prefix = Some(source.to_string());
        rest = after.trim_start_matches(' ');
    }

    let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
    if command.is_empty() {
        return Err(ProtocolError::Invalid("missing command".into()));
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        let (param, after) = rest.split_once(' ').unwrap_or((rest, ""));
        params.push(param.to_string());
        rest = after;
    }

    Ok(IrcMessage {
        tags,
        prefix,
        command: command.to_string(),
        params,
    })
}

/// Try to decode a line from a buffer, advancing it if successful.
///
/// Blank lines are skipped. Returns `Ok(None)` if no complete line is
/// buffered yet.
///
/// # Errors
///
/// Returns an error if a line is too long, not UTF-8, or malformed. The
/// offending line is consumed.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<IrcMessage>, ProtocolError> {
    loop {
        let Some(end) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > MAX_LINE_SIZE {
                return Err(ProtocolError::LineTooLong(buf.len()));
            }
            return Ok(None);
        };

        let line = buf.split_to(end + 1);
        if line.len() > MAX_LINE_SIZE {
            return Err(ProtocolError::LineTooLong(line.len()));
        }
        let text = std::str::from_utf8(&line)?;
        if text.trim().is_empty() {
            continue;
        }
        return decode(text).map(Some);
    }
}

fn check_no_line_break(what: &str, value: &str) -> Result<(), ProtocolError> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(ProtocolError::Invalid(format!("{what} contains a line break")));
    }
    Ok(())
}

fn check_token(what: &str, value: &str) -> Result<(), ProtocolError> {
    check_no_line_break(what, value)?;
    if value.is_empty() || value.contains(' ') {
        return Err(ProtocolError::Invalid(format!(
            "{what} {value:?} is empty or contains a space"
        )));
    }
    Ok(())
}

fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // A lone trailing backslash is dropped.
            None => {}
        }
    }
    out
}
