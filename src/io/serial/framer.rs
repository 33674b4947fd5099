// src/io/serial/framer.rs
//
// Newline framing for the gateway's NDJSON stream.
//
// Bytes arrive in arbitrary chunks from timed reads; the framer buffers them
// and yields one frame per `\n`. A trailing `\r` is stripped. Lines longer than
// `max_length` are split and marked oversized so the reader can count and drop
// them instead of handing half a JSON object to the parser.

/// Default longest line accepted from the gateway.
pub const DEFAULT_MAX_LINE: usize = 4096;

const NEWLINE: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// A complete line extracted from the serial stream
#[derive(Debug, Clone, PartialEq)]
pub struct LineFrame {
    /// Line bytes without the terminator
    pub bytes: Vec<u8>,
    /// The line hit `max_length` before its terminator arrived
    pub oversized: bool,
    /// Produced by `flush()` and may be incomplete
    pub incomplete: bool,
}

/// Stateful line framer for streaming data.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_length: usize,
    /// Discarding the remainder of an oversized line
    skipping: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl LineFramer {
    pub fn new(max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::new(),
            max_length: max_length.max(1),
            skipping: false,
        }
    }

    /// Feed raw bytes into the framer.
    /// Returns any complete lines that were parsed. Empty lines are skipped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<LineFrame> {
        let mut frames = Vec::new();

        for &byte in data {
            if byte == NEWLINE {
                if self.skipping {
                    self.skipping = false;
                    self.buffer.clear();
                    continue;
                }
                if self.buffer.last() == Some(&CARRIAGE_RETURN) {
                    self.buffer.pop();
                }
                if !self.buffer.is_empty() {
                    frames.push(LineFrame {
                        bytes: std::mem::take(&mut self.buffer),
                        oversized: false,
                        incomplete: false,
                    });
                }
                continue;
            }

            if self.skipping {
                continue;
            }

            self.buffer.push(byte);

            // Force split on max length, then drop bytes until the next newline
            if self.buffer.len() >= self.max_length {
                frames.push(LineFrame {
                    bytes: std::mem::take(&mut self.buffer),
                    oversized: true,
                    incomplete: false,
                });
                self.skipping = true;
            }
        }

        frames
    }

    /// Flush any remaining buffered data as a frame.
    /// Call when the stream ends.
    pub fn flush(&mut self) -> Option<LineFrame> {
        self.skipping = false;
        if self.buffer.is_empty() {
            return None;
        }
        Some(LineFrame {
            bytes: std::mem::take(&mut self.buffer),
            oversized: false,
            incomplete: true,
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Encode one outgoing line (JSON text plus `\n`).
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 1);
    out.extend_from_slice(line.as_bytes());
    out.push(NEWLINE);
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_framing() {
        let mut framer = LineFramer::default();
        let frames = framer.feed(b"{\"id\":1}\n{\"id\":2}\r\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].bytes, b"{\"id\":1}".to_vec());
        assert_eq!(frames[1].bytes, b"{\"id\":2}".to_vec());
    }

    #[test]
    fn test_split_across_reads() {
        let mut framer = LineFramer::default();
        assert!(framer.feed(b"{\"id\":").is_empty());
        assert_eq!(framer.buffered(), 6);
        let frames = framer.feed(b"2}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"{\"id\":2}".to_vec());
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut framer = LineFramer::default();
        let frames = framer.feed(b"\n\r\n\nabc\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes, b"abc".to_vec());
    }

    #[test]
    fn test_oversized_line_dropped_until_newline() {
        let mut framer = LineFramer::new(5);
        let frames = framer.feed(b"12345678\nok\n");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].oversized);
        assert_eq!(frames[0].bytes, b"12345".to_vec());
        assert!(!frames[1].oversized);
        assert_eq!(frames[1].bytes, b"ok".to_vec());
    }

    #[test]
    fn test_flush_marks_incomplete() {
        let mut framer = LineFramer::default();
        framer.feed(b"partial");
        let flushed = framer.flush().unwrap();
        assert!(flushed.incomplete);
        assert_eq!(flushed.bytes, b"partial".to_vec());
        assert!(framer.flush().is_none());
    }

    #[test]
    fn test_encode_line() {
        assert_eq!(encode_line("{}"), b"{}\n".to_vec());
    }
}
