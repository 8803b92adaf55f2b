use std::io::{self, Read};

/// Reader with explicit lookahead. Board and channel discovery inspect a
/// tag and push it back when it does not match, which must work on plain
/// `Read` sources without relying on `Seek`.
pub(crate) struct PeekReader<R: Read> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        PeekReader {
            inner,
            buffer: Vec::new(),
        }
    }

    /// Returns up to `count` bytes without consuming them. Fewer bytes are
    /// returned only when the stream ends first.
    pub(crate) fn peek(&mut self, count: usize) -> io::Result<&[u8]> {
        let mut chunk = [0u8; 16];
        while self.buffer.len() < count {
            let want = (count - self.buffer.len()).min(chunk.len());
            let got = self.inner.read(&mut chunk[..want])?;
            if got == 0 {
                break;
            }
            self.buffer.extend_from_slice(&chunk[..got]);
        }
        Ok(&self.buffer[..self.buffer.len().min(count)])
    }

    /// Discards `count` previously peeked bytes.
    pub(crate) fn consume(&mut self, count: usize) {
        self.buffer.drain(..count.min(self.buffer.len()));
    }

    /// Reads exactly `buf.len()` bytes, draining any peeked bytes first.
    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let buffered = self.buffer.len().min(buf.len());
        buf[..buffered].copy_from_slice(&self.buffer[..buffered]);
        self.buffer.drain(..buffered);
        self.inner.read_exact(&mut buf[buffered..])
    }
}
