//! A buffered byte stream (≥8 KiB) with 2-byte pushback. Nothing in this
//! engine needs more than a couple of bytes of lookahead (e.g. `\r\n`
//! confirmation), so pushback is a tiny stack rather than a general unread
//! buffer.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

pub struct ByteStream<R> {
    inner: BufReader<R>,
    pushback: Vec<u8>,
}

impl<R: AsyncRead + Unpin> ByteStream<R> {
    pub fn new(inner: R, capacity: usize) -> Self {
        ByteStream {
            inner: BufReader::with_capacity(capacity, inner),
            pushback: Vec::with_capacity(2),
        }
    }

    /// Reads one byte, returning `Ok(None)` on a clean EOF.
    pub async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.pushback.pop() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        let n = self.inner.read(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(buf[0]))
        }
    }

    /// Pushes a byte back so the next `read_byte`/`read_exact` sees it
    /// again. At most 2 bytes may be pending at once.
    pub fn push_back(&mut self, byte: u8) {
        debug_assert!(self.pushback.len() < 2, "pushback buffer overflow");
        self.pushback.push(byte);
    }

    /// Fills `buf` completely, returning `UnexpectedEof` if the peer closes
    /// partway through.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        for slot in buf.iter_mut() {
            match self.read_byte().await? {
                Some(b) => *slot = b,
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-frame",
                    ))
                }
            }
        }
        Ok(())
    }

    /// Like `read_exact`, but returns `Ok(false)` instead of erroring when
    /// EOF is hit before the very first byte — used to distinguish a clean
    /// stream end from a truncated one.
    pub async fn try_read_exact(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        if buf.is_empty() {
            return Ok(true);
        }
        let first = match self.read_byte().await? {
            Some(b) => b,
            None => return Ok(false),
        };
        buf[0] = first;
        if buf.len() > 1 {
            self.read_exact(&mut buf[1..]).await?;
        }
        Ok(true)
    }

    /// Reads up to `buf.len()` bytes, returning `0` on EOF. Used by body
    /// readers, where bulk reads matter for throughput.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.pushback.pop() {
            buf[0] = b;
            return Ok(1);
        }
        self.inner.read(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushback_is_replayed_before_the_stream() {
        let mut stream = ByteStream::new(std::io::Cursor::new(b"bc".to_vec()), 16);
        stream.push_back(b'a');
        let mut buf = [0u8; 3];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn try_read_exact_reports_clean_eof() {
        let mut stream = ByteStream::new(std::io::Cursor::new(Vec::<u8>::new()), 16);
        let mut buf = [0u8; 2];
        assert!(!stream.try_read_exact(&mut buf).await.unwrap());
    }

    #[tokio::test]
    async fn read_exact_errors_on_truncated_stream() {
        let mut stream = ByteStream::new(std::io::Cursor::new(vec![1u8]), 16);
        let mut buf = [0u8; 2];
        let err = stream.read_exact(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
