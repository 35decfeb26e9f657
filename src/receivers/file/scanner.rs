// SPDX-License-Identifier: Apache-2.0

use std::io::{self, BufRead};

use tracing::warn;

/// Default cap on the bytes kept for a single line
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// A complete line pulled from a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    /// Line content without the delimiter (and without a trailing `\r`)
    pub text: String,
    /// Raw bytes the line occupies in the file, delimiter included
    pub consumed: u64,
}

/// Splits a reader into newline-delimited records.
///
/// Only complete lines are returned. Bytes after the last `\n` stay buffered and are
/// completed by later reads, so a line that is still being written is never split in
/// two. At most `max_line_bytes` of a line are kept; the rest is skipped and the
/// line is delivered truncated, while `consumed` still covers every raw byte.
pub struct LineScanner<R> {
    reader: R,
    pending: Vec<u8>,
    skipped: u64,
    max_line_bytes: usize,
}

impl<R: BufRead> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line_bytes(reader, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            skipped: 0,
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Pull the next complete line, `None` when only a fragment (or nothing) is left.
    pub fn next_line(&mut self) -> io::Result<Option<ScannedLine>> {
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(None);
            }

            let (used, terminated) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            let keep = used.min(self.max_line_bytes.saturating_sub(self.pending.len()));
            self.pending.extend_from_slice(&available[..keep]);
            if keep < used {
                if self.skipped == 0 {
                    warn!(
                        max_line_bytes = self.max_line_bytes,
                        "Line exceeds the maximum length, truncating"
                    );
                }
                self.skipped += (used - keep) as u64;
            }
            self.reader.consume(used);

            if terminated {
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> ScannedLine {
        let consumed = self.pending.len() as u64 + self.skipped;
        let truncated = self.skipped > 0;
        self.skipped = 0;

        let mut bytes = std::mem::take(&mut self.pending);
        if !truncated {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }

        let text = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        ScannedLine { text, consumed }
    }

    /// Bytes of the unterminated fragment seen so far, kept or skipped
    #[cfg(test)]
    fn pending_len(&self) -> u64 {
        self.pending.len() as u64 + self.skipped
    }
}
