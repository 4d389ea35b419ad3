//! Line and byte cursor over a buffered stream.
//!
//! Sequence files mix text headers with (optionally) binary bodies, so the
//! cursor works on bytes and only decodes a line to UTF-8 once it has been
//! split off.

use std::io::{self, BufRead, Read};

/// Cursor yielding lines and raw byte runs from a buffered reader.
pub struct LineCursor<R> {
    reader: R,
    line: u64,
    offset: u64,
    /// Reused buffer for line splitting.
    scratch: Vec<u8>,
}

impl<R: BufRead> LineCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            offset: 0,
            scratch: Vec::new(),
        }
    }

    /// Read the next line without its terminator (`\n` or `\r\n`).
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        self.scratch.clear();
        let read = self.reader.read_until(b'\n', &mut self.scratch)?;
        if read == 0 {
            return Ok(None);
        }
        self.offset += read as u64;
        self.line += 1;

        if self.scratch.last() == Some(&b'\n') {
            self.scratch.pop();
            if self.scratch.last() == Some(&b'\r') {
                self.scratch.pop();
            }
        }

        match std::str::from_utf8(&self.scratch) {
            Ok(text) => Ok(Some(text.to_owned())),
            Err(e) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Line {} is not valid UTF-8: {}", self.line, e),
            )),
        }
    }

    /// Read exactly `len` raw bytes.
    ///
    /// The buffer grows with the data actually read, so a bogus length in a
    /// header cannot force a huge allocation up front.
    pub fn read_exact(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        self.offset += read as u64;
        if read < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, stream ended after {}", len, read),
            ));
        }
        Ok(buf)
    }

    /// Number of the last line read (1-based, 0 before the first read).
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Bytes consumed from the stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
