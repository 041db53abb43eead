//! Line-oriented front end to the input stream.
//!
//! Normalizes platform line endings, strips trailing blanks and the DOS
//! EOF sentinel (`0x1A`), and enforces a maximum line length so a
//! malformed or binary input cannot make the encoder buffer an
//! unbounded amount of data before failing.
use std::io::{BufRead, Read};

use crate::error::Error;

/// Longest line the encoder will accept. RINEX observation lines never
/// come close to this; it exists purely as a sanity bound.
pub const MAX_LINE: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    EndOfFile,
}

pub struct LineSource<R> {
    reader: R,
    pub line_no: u64,
    /// Set once if the file ends in one or more NUL bytes with no
    /// newline and no other content -- some writers pad a file's last
    /// block this way. Treated as a harmless end of file rather than a
    /// truncation error, but still surfaced as a warning.
    pub trailing_nulls: bool,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            trailing_nulls: false,
        }
    }

    /// Reads the next physical line, stripping the terminator, a
    /// trailing `\r`, and trailing spaces.
    pub fn read_line(&mut self) -> Result<LineEvent, Error> {
        self.line_no += 1;
        let mut buf = Vec::new();
        {
            let mut limited = (&mut self.reader).take(MAX_LINE as u64);
            limited.read_until(b'\n', &mut buf)?;
        }
        if buf.is_empty() {
            return Ok(LineEvent::EndOfFile);
        }
        let had_newline = buf.last() == Some(&b'\n');
        if !had_newline {
            let more = !self.reader.fill_buf()?.is_empty();
            if more {
                return Err(Error::LineTooLong(self.line_no));
            }
            if buf == [0x1A] {
                return Ok(LineEvent::EndOfFile);
            }
            if !buf.is_empty() && buf.iter().all(|&b| b == 0) {
                self.trailing_nulls = true;
                return Ok(LineEvent::EndOfFile);
            }
            return Err(Error::Truncated(self.line_no));
        }
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        while buf.last() == Some(&b' ') {
            buf.pop();
        }
        Ok(LineEvent::Line(String::from_utf8_lossy(&buf).into_owned()))
    }
}
