//! Pattern buffer with tail-search optimization.
//!
//! Prompt patterns are only searched for in the last N bytes of the
//! accumulated output rather than the whole buffer. `show` commands on a
//! switch with many interfaces can return tens of kilobytes; the prompt is
//! always at the end.

use std::fmt;
use std::ops::Range;

use bytes::BytesMut;
use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Buffer for accumulating device output and searching it for prompts.
///
/// Incoming bytes are run through a VT parser so colour codes and cursor
/// movement never reach the prompt regexes. The parser keeps state across
/// calls, so an escape sequence split over two reads is still removed.
pub struct PatternBuffer {
    /// The accumulated, escape-free output.
    buffer: BytesMut,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,

    /// Escape sequence parser.
    parser: Parser,
}

/// Collects printable output from the VT parser.
struct Printable<'a> {
    out: &'a mut BytesMut,
}

impl Perform for Printable<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.extend_from_slice(&[byte]);
        }
    }
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    ///
    /// # Arguments
    ///
    /// * `search_depth` - Number of bytes from the end to search for patterns.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with raw channel data, stripping escape sequences.
    pub fn extend(&mut self, data: &[u8]) {
        let mut printable = Printable {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut printable, data);
    }

    /// Search only the tail of the buffer for the pattern.
    ///
    /// Returns the byte range of the match relative to the start of the
    /// whole buffer.
    pub fn find_in_tail(&self, pattern: &Regex) -> Option<Range<usize>> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        pattern
            .find(&self.buffer[start..])
            .map(|m| (start + m.start())..(start + m.end()))
    }

    /// Remove and return everything up to `end`, keeping the remainder.
    pub fn take_through(&mut self, end: usize) -> Vec<u8> {
        let end = end.min(self.buffer.len());
        self.buffer.split_to(end).to_vec()
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extend() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"Hello, world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
    }

    #[test]
    fn test_ansi_stripping() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"\x1b[32mGreen text\x1b[0m");
        assert_eq!(buffer.as_slice(), b"Green text");
    }

    #[test]
    fn test_ansi_sequence_split_across_reads() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"[admin@MikroTik] \x1b[");
        buffer.extend(b"9999B> ");
        assert_eq!(buffer.as_slice(), b"[admin@MikroTik] > ");
    }

    #[test]
    fn test_clear_keeps_escape_state() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"late output \x1b[");
        buffer.clear();
        buffer.extend(b"9999BSwitch57#");
        assert_eq!(buffer.as_slice(), b"Switch57#");
    }

    #[test]
    fn test_line_endings_kept() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"line1\r\nline2\n\x07");
        assert_eq!(buffer.as_slice(), b"line1\r\nline2\n");
    }

    #[test]
    fn test_tail_search() {
        let mut buffer = PatternBuffer::new(20);
        buffer.extend(&[b'x'; 100]);
        buffer.extend(b"\nswitch#");

        let pattern = Regex::new(r"switch#").unwrap();
        assert_eq!(buffer.find_in_tail(&pattern), Some(101..108));
    }

    #[test]
    fn test_tail_search_not_in_tail() {
        let mut buffer = PatternBuffer::new(10);
        buffer.extend(b"switch#");
        buffer.extend(&[b'x'; 100]);

        let pattern = Regex::new(r"switch#").unwrap();
        assert!(buffer.find_in_tail(&pattern).is_none());
    }

    #[test]
    fn test_take_through_keeps_remainder() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"output\nswitch#trailing");
        let taken = buffer.take_through(14);
        assert_eq!(taken, b"output\nswitch#");
        assert_eq!(buffer.as_slice(), b"trailing");
    }
}
