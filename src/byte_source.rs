//! Byte source abstraction (§4.A, §6). The reader is written against this
//! trait rather than `std::fs::File` directly so tests and callers can hand
//! it an in-memory buffer, while still describing the file as something
//! seekable with a known size.

use std::io::{self, Read, Seek, SeekFrom};

use crate::Result;

/// A seekable, sized source of PDF bytes.
pub trait ByteSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn size(&self) -> u64;
}

/// The common case: the whole file has already been read into memory.
/// The teacher's reader operates directly on a `&[u8]`; this wraps that
/// buffer behind the trait without changing how the reader actually reads.
#[derive(Debug, Clone)]
pub struct BufferSource {
    buffer: Vec<u8>,
}

impl BufferSource {
    pub fn new(buffer: Vec<u8>) -> Self {
        BufferSource { buffer }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        Ok(BufferSource { buffer })
    }
}

impl ByteSource for BufferSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.buffer.len() {
            return Ok(0);
        }
        let end = (offset + buf.len()).min(self.buffer.len());
        let n = end - offset;
        buf[..n].copy_from_slice(&self.buffer[offset..end]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.buffer.len() as u64
    }
}

/// Where a [`BufferedReader`] seek is relative to.
#[derive(Debug, Clone, Copy)]
pub enum SeekPos {
    Start(u64),
    End(i64),
    Current(i64),
}

/// A buffered, cursor-tracking reader over a [`ByteSource`] (§4.A):
/// `peek`/`read_byte`/`unread_byte`/`read_into`/`skip`/`seek` plus
/// `current_offset`, the logical position accounting for whatever's been
/// read into the internal buffer but not yet consumed. A `seek` always
/// invalidates the buffer and re-fills from the new position on next read.
pub struct BufferedReader<S: ByteSource> {
    source: S,
    buf: Vec<u8>,
    buf_start: u64,
    cursor: usize,
}

const FILL_SIZE: usize = 8192;

impl<S: ByteSource> BufferedReader<S> {
    pub fn new(source: S) -> Self {
        BufferedReader { source, buf: Vec::new(), buf_start: 0, cursor: 0 }
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }

    /// The logical file position: the underlying offset of the buffer minus
    /// whatever in it hasn't been consumed yet.
    pub fn current_offset(&self) -> u64 {
        self.buf_start + self.cursor as u64
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    fn fill(&mut self) -> Result<()> {
        if self.cursor < self.buf.len() {
            return Ok(());
        }
        let start = self.buf_start + self.buf.len() as u64;
        let mut chunk = vec![0u8; FILL_SIZE];
        let n = self.source.read_at(start, &mut chunk)?;
        chunk.truncate(n);
        self.buf_start = start;
        self.buf = chunk;
        self.cursor = 0;
        Ok(())
    }

    /// Looks at the next `n` bytes without consuming them, reading more of
    /// the underlying source if the buffer doesn't already hold that many.
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        while self.remaining().len() < n {
            let before = self.buf.len();
            let start = self.buf_start + self.buf.len() as u64;
            let mut chunk = vec![0u8; FILL_SIZE.max(n)];
            let read = self.source.read_at(start, &mut chunk)?;
            if read == 0 {
                break;
            }
            chunk.truncate(read);
            if self.cursor > 0 {
                self.buf.drain(..self.cursor);
                self.buf_start += self.cursor as u64;
                self.cursor = 0;
            }
            self.buf.extend_from_slice(&chunk);
            if self.buf.len() == before {
                break;
            }
        }
        Ok(&self.remaining()[..n.min(self.remaining().len())])
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        self.fill()?;
        if self.cursor >= self.buf.len() {
            return Ok(None);
        }
        let b = self.buf[self.cursor];
        self.cursor += 1;
        Ok(Some(b))
    }

    /// Pushes the logical cursor back by one byte; only valid immediately
    /// after a `read_byte` that has not itself crossed a `seek`.
    pub fn unread_byte(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        } else if self.buf_start > 0 {
            self.buf_start -= 1;
        }
    }

    pub fn read_into(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < out.len() {
            self.fill()?;
            let available = self.remaining();
            if available.is_empty() {
                break;
            }
            let take = available.len().min(out.len() - written);
            out[written..written + take].copy_from_slice(&available[..take]);
            self.cursor += take;
            written += take;
        }
        Ok(written)
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.seek(SeekPos::Current(n as i64))
    }

    /// Invalidates the buffer and repositions to an absolute, end-relative,
    /// or current-relative offset.
    pub fn seek(&mut self, pos: SeekPos) -> Result<u64> {
        let new_pos = match pos {
            SeekPos::Start(n) => n,
            SeekPos::End(n) => (self.source.size() as i64 + n).max(0) as u64,
            SeekPos::Current(n) => (self.current_offset() as i64 + n).max(0) as u64,
        };
        self.buf.clear();
        self.buf_start = new_pos;
        self.cursor = 0;
        Ok(new_pos)
    }
}

/// Adapter letting any `ByteSource` be used through `std::io::{Read, Seek}`,
/// for the handful of call sites (e.g. `flate2`'s `Decoder`) that want a
/// standard reader rather than the core's own trait.
pub struct SeekableReader<'a, S: ByteSource> {
    source: &'a mut S,
    position: u64,
}

impl<'a, S: ByteSource> SeekableReader<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        SeekableReader { source, position: 0 }
    }
}

impl<S: ByteSource> Read for SeekableReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .source
            .read_at(self.position, buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: ByteSource> Seek for SeekableReader<'_, S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::End(n) => (self.source.size() as i64 + n).max(0) as u64,
            SeekFrom::Current(n) => (self.position as i64 + n).max(0) as u64,
        };
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_at_clamps_to_buffer_end() {
        let mut source = BufferSource::new(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 10];
        let n = source.read_at(3, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn read_at_past_end_returns_zero() {
        let mut source = BufferSource::new(vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        assert_eq!(source.read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut reader = BufferedReader::new(BufferSource::new(b"hello world".to_vec()));
        assert_eq!(reader.peek(5).unwrap(), b"hello");
        assert_eq!(reader.peek(5).unwrap(), b"hello");
        assert_eq!(reader.current_offset(), 0);
    }

    #[test]
    fn read_byte_advances_current_offset() {
        let mut reader = BufferedReader::new(BufferSource::new(b"abc".to_vec()));
        assert_eq!(reader.read_byte().unwrap(), Some(b'a'));
        assert_eq!(reader.read_byte().unwrap(), Some(b'b'));
        assert_eq!(reader.current_offset(), 2);
        assert_eq!(reader.read_byte().unwrap(), Some(b'c'));
        assert_eq!(reader.read_byte().unwrap(), None);
    }

    #[test]
    fn unread_byte_rewinds_one_position() {
        let mut reader = BufferedReader::new(BufferSource::new(b"abc".to_vec()));
        reader.read_byte().unwrap();
        reader.read_byte().unwrap();
        reader.unread_byte();
        assert_eq!(reader.current_offset(), 1);
        assert_eq!(reader.read_byte().unwrap(), Some(b'b'));
    }

    #[test]
    fn seek_invalidates_buffered_bytes() {
        let mut reader = BufferedReader::new(BufferSource::new(b"0123456789".to_vec()));
        reader.peek(4).unwrap();
        reader.seek(SeekPos::Start(6)).unwrap();
        assert_eq!(reader.current_offset(), 6);
        assert_eq!(reader.read_byte().unwrap(), Some(b'6'));
    }

    #[test]
    fn skip_moves_forward_relative_to_current_offset() {
        let mut reader = BufferedReader::new(BufferSource::new(b"0123456789".to_vec()));
        reader.read_byte().unwrap();
        reader.skip(3).unwrap();
        assert_eq!(reader.current_offset(), 4);
        assert_eq!(reader.read_byte().unwrap(), Some(b'4'));
    }

    #[test]
    fn read_into_fills_buffer_across_refills() {
        let mut reader = BufferedReader::new(BufferSource::new(b"0123456789".to_vec()));
        let mut out = [0u8; 6];
        let n = reader.read_into(&mut out).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&out, b"012345");
        assert_eq!(reader.current_offset(), 6);
    }
}
