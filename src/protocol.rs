//! Line protocol framing and response generation.
//!
//! ```text
//! Request:  <line>\n
//! Response: Server received: <line>\n
//!
//! Example:
//! Request:  hello\n
//! Response: Server received: hello\n
//! ```
//!
//! Lines longer than the configured limit are answered with
//! `ERROR line too long\n` and the connection is closed.

use bytes::BytesMut;

/// Prefix written in front of every echoed line.
pub const RESPONSE_PREFIX: &[u8] = b"Server received: ";

/// Sent to the peer before closing a connection whose line exceeded the cap.
pub const LINE_TOO_LONG_RESPONSE: &[u8] = b"ERROR line too long\n";

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// A full line is buffered.
    Complete {
        /// Length of the line, excluding the `\n`.
        line_len: usize,
        /// Bytes to consume from the buffer, terminator included.
        consumed: usize,
    },
    /// No newline yet.
    Incomplete,
    /// The line exceeds `max_line_length`.
    TooLong,
}

/// Look for one newline-terminated line at the start of `input`.
///
/// `scanned` is how many leading bytes are already known to hold no `\n`,
/// so repeated calls on a growing buffer only look at the new bytes.
/// `max_line_length` bounds the bytes before the `\n`. Only the `\n`
/// itself is stripped; a `\r` before it is part of the line.
pub fn parse_line(input: &[u8], scanned: usize, max_line_length: usize) -> ParseResult {
    let from = scanned.min(input.len());
    match find_newline(&input[from..]).map(|pos| from + pos) {
        Some(pos) if pos > max_line_length => ParseResult::TooLong,
        Some(pos) => ParseResult::Complete {
            line_len: pos,
            consumed: pos + 1,
        },
        None if input.len() > max_line_length => ParseResult::TooLong,
        None => ParseResult::Incomplete,
    }
}

/// Append the echo response for `line` to `output`.
pub fn write_response(line: &[u8], output: &mut BytesMut) {
    output.reserve(RESPONSE_PREFIX.len() + line.len() + 1);
    output.extend_from_slice(RESPONSE_PREFIX);
    output.extend_from_slice(line);
    output.extend_from_slice(b"\n");
}

fn find_newline(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|&b| b == b'\n')
}
