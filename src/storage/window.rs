//! Fixed-size window reader used by the snapshot and report parsers.
//!
//! The reader pulls `window_size` bytes at a time from the underlying
//! source and keeps only the unread part in memory. After the header has
//! been consumed, `start_body` resets the cursor so positions are relative
//! to the start of the body, which is what header offsets refer to.

use std::io::{self, Read};

use tracing::debug;

use crate::codec::VarInt;
use crate::error::{FormatError, Result};

/// Default streaming window, 64 KiB.
pub const DEFAULT_WINDOW: usize = 64 * 1024;

pub struct WindowReader<R: Read> {
    reader: R,
    window_size: usize,
    /// Unread bytes; `buffer[0]` sits at position `cursor`.
    buffer: Vec<u8>,
    cursor: u64,
    eof: bool,
}

impl<R: Read> WindowReader<R> {
    pub fn new(reader: R, window_size: usize) -> Self {
        Self {
            reader,
            window_size: window_size.max(1),
            buffer: Vec::new(),
            cursor: 0,
            eof: false,
        }
    }

    /// Position of the next unread byte.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Makes the next unread byte position 0.
    pub fn start_body(&mut self) {
        self.cursor = 0;
    }

    /// Reads one more window. Returns `false` at end of input.
    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let start = self.buffer.len();
        self.buffer.resize(start + self.window_size, 0);
        let mut read = 0;
        // A single `read` may return less than a window; keep going until
        // the window is full or the source is exhausted.
        while read < self.window_size {
            match self.reader.read(&mut self.buffer[start + read..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start + read);
                    return Err(e);
                }
            }
        }
        self.buffer.truncate(start + read);
        Ok(read > 0)
    }

    /// Buffers at least `n` unread bytes.
    fn ensure(&mut self, n: usize) -> Result<()> {
        while self.buffer.len() < n {
            if !self.fill()? {
                return Err(FormatError::Truncated {
                    needed: n,
                    available: self.buffer.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn consume(&mut self, n: usize) -> Vec<u8> {
        self.cursor += n as u64;
        let rest = self.buffer.split_off(n);
        std::mem::replace(&mut self.buffer, rest)
    }

    /// Advances to `offset`, skipping any padding in between.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        if offset < self.cursor {
            return Err(FormatError::CursorOvershoot {
                cursor: self.cursor,
                offset,
            }
            .into());
        }
        let mut gap = offset - self.cursor;
        if gap > 0 {
            debug!(cursor = self.cursor, offset, "skipping padding");
        }
        while gap > 0 {
            if self.buffer.is_empty() {
                self.ensure(1)?;
            }
            let step = gap.min(self.buffer.len() as u64) as usize;
            self.consume(step);
            gap -= step as u64;
        }
        Ok(())
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.consume(1)[0])
    }

    pub fn take_varint(&mut self) -> Result<u64> {
        self.ensure(1)?;
        let len = VarInt::length_of(self.buffer[0]);
        self.ensure(len)?;
        let (value, used) = VarInt::decode(&self.buffer)?;
        self.consume(used);
        Ok(value.value())
    }

    /// Takes exactly `n` bytes, reading more windows as needed.
    pub fn take(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        Ok(self.consume(n))
    }

    /// Takes everything up to end of input.
    pub fn take_to_end(&mut self) -> Result<Vec<u8>> {
        while self.fill()? {}
        let n = self.buffer.len();
        Ok(self.consume(n))
    }

    /// Number of bytes left, reading the source to its end.
    pub fn remaining(&mut self) -> Result<usize> {
        while self.fill()? {}
        Ok(self.buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;

    fn reader(data: &[u8], window: usize) -> WindowReader<&[u8]> {
        WindowReader::new(data, window)
    }

    #[test]
    fn test_take_across_windows() {
        let data: Vec<u8> = (0..=99).collect();
        let mut r = reader(&data, 7);
        assert_eq!(r.take(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(r.take(20).unwrap(), (3..23).collect::<Vec<u8>>());
        assert_eq!(r.cursor(), 23);
        assert_eq!(r.remaining().unwrap(), 77);
    }

    #[test]
    fn test_varint_straddling_window_boundary() {
        let data = [0x00, 0x23, 0xe9, 0x05];
        let mut r = reader(&data, 2);
        assert_eq!(r.take_u8().unwrap(), 0);
        assert_eq!(r.take_varint().unwrap(), 1001);
        assert_eq!(r.take_varint().unwrap(), 5);
        assert_eq!(r.remaining().unwrap(), 0);
    }

    #[test]
    fn test_seek_skips_padding() {
        let data = [9, 9, 9, 9, 42];
        let mut r = reader(&data, 1);
        r.seek_to(4).unwrap();
        assert_eq!(r.take_u8().unwrap(), 42);
    }

    #[test]
    fn test_seek_backwards_overshoots() {
        let data = [1, 2, 3];
        let mut r = reader(&data, 4);
        r.take(2).unwrap();
        let err = r.seek_to(1).unwrap_err();
        assert!(matches!(
            err,
            AuditError::Format(FormatError::CursorOvershoot {
                cursor: 2,
                offset: 1
            })
        ));
    }

    #[test]
    fn test_start_body_resets_cursor() {
        let data = [1, 2, 3, 4];
        let mut r = reader(&data, 4);
        r.take(2).unwrap();
        r.start_body();
        assert_eq!(r.cursor(), 0);
        r.seek_to(1).unwrap();
        assert_eq!(r.take_u8().unwrap(), 4);
    }

    #[test]
    fn test_truncated_input() {
        let data = [1, 2];
        let mut r = reader(&data, 8);
        assert!(matches!(
            r.take(5),
            Err(AuditError::Format(FormatError::Truncated {
                needed: 5,
                available: 2
            }))
        ));
        let mut r = reader(&data, 8);
        assert!(r.seek_to(10).is_err());
    }

    #[test]
    fn test_take_to_end() {
        let data: Vec<u8> = (0..50).collect();
        let mut r = reader(&data, 16);
        r.take(10).unwrap();
        assert_eq!(r.take_to_end().unwrap(), (10..50).collect::<Vec<u8>>());
        assert_eq!(r.cursor(), 50);
    }
}
