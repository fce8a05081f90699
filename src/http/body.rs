//! Body streams: fixed-length and chunked readable adapters. Both
//! leave the underlying connection open and, on `close`, drain any unread
//! remainder so the next pipelined request starts at a clean byte offset.

use crate::error::ReadRequestError;
use crate::http::header::HeaderList;
use crate::http::input::{read_chunk, BodyMode, HttpRequest};
use crate::http::stream::ByteStream;
use tokio::io::AsyncRead;

struct FixedLengthBody {
    remaining: u64,
}

impl FixedLengthBody {
    async fn read<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut ByteStream<R>,
        buf: &mut [u8],
    ) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (buf.len() as u64).min(self.remaining) as usize;
        let n = reader.read_some(&mut buf[..max]).await?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

struct ChunkedBody {
    max_chunk_size: u64,
    current: Vec<u8>,
    pos: usize,
    finished: bool,
    trailers: HeaderList,
}

impl ChunkedBody {
    async fn read<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut ByteStream<R>,
        buf: &mut [u8],
    ) -> Result<usize, ReadRequestError> {
        loop {
            if self.pos < self.current.len() {
                let n = (self.current.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            let chunk = read_chunk(reader, self.max_chunk_size).await?;
            if chunk.is_last {
                self.trailers = chunk.trailers;
                self.finished = true;
                return Ok(0);
            }
            self.current = chunk.data;
            self.pos = 0;
        }
    }
}

/// The body a handler sees for the current request: `None` if there isn't
/// one, otherwise a fixed-length or chunked reader.
pub enum HttpBody {
    None,
    FixedLength(FixedLengthBody),
    Chunked(ChunkedBody),
}

impl HttpBody {
    pub fn for_request(request: &HttpRequest, max_chunk_size: u64) -> Self {
        match request.body_mode {
            BodyMode::None => HttpBody::None,
            BodyMode::FixedLength(n) => HttpBody::FixedLength(FixedLengthBody { remaining: n }),
            BodyMode::Chunked => HttpBody::Chunked(ChunkedBody {
                max_chunk_size,
                current: Vec::new(),
                pos: 0,
                finished: false,
                trailers: HeaderList::new(),
            }),
        }
    }

    /// Whether the stream has reached its natural end (no remaining
    /// fixed-length bytes, or the chunked terminal chunk was seen).
    pub fn is_consumed(&self) -> bool {
        match self {
            HttpBody::None => true,
            HttpBody::FixedLength(b) => b.remaining == 0,
            HttpBody::Chunked(b) => b.finished,
        }
    }

    pub async fn read<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut ByteStream<R>,
        buf: &mut [u8],
    ) -> Result<usize, ReadRequestError> {
        match self {
            HttpBody::None => Ok(0),
            HttpBody::FixedLength(b) => b.read(reader, buf).await.map_err(Into::into),
            HttpBody::Chunked(b) => b.read(reader, buf).await,
        }
    }

    pub async fn read_to_end<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut ByteStream<R>,
        out: &mut Vec<u8>,
    ) -> Result<(), ReadRequestError> {
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read(reader, &mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(())
    }

    /// Drains and discards whatever remains, leaving the connection clean
    /// for the next pipelined request.
    pub async fn close<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut ByteStream<R>,
    ) -> Result<(), ReadRequestError> {
        let mut sink = [0u8; 8192];
        loop {
            let n = self.read(reader, &mut sink).await?;
            if n == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Trailers from a chunked body's terminal chunk, if any were sent.
    pub fn trailers(&self) -> Option<&HeaderList> {
        match self {
            HttpBody::Chunked(b) if b.finished => Some(&b.trailers),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::header::HeaderList;
    use crate::http::input::HttpVersion;

    fn request_with_mode(body_mode: BodyMode) -> HttpRequest {
        HttpRequest {
            method: "POST".into(),
            target: "/".into(),
            version: HttpVersion::Http11,
            headers: HeaderList::new(),
            body_mode,
            close_after: false,
        }
    }

    #[tokio::test]
    async fn fixed_length_body_yields_exactly_n_bytes() {
        let request = request_with_mode(BodyMode::FixedLength(5));
        let mut body = HttpBody::for_request(&request, 1024);
        let mut reader = ByteStream::new(std::io::Cursor::new(b"helloXXXX".to_vec()), 64);
        let mut out = Vec::new();
        body.read_to_end(&mut reader, &mut out).await.unwrap();
        assert_eq!(out, b"hello");
        assert!(body.is_consumed());
    }

    #[tokio::test]
    async fn chunked_body_concatenates_chunk_data() {
        let request = request_with_mode(BodyMode::Chunked);
        let mut body = HttpBody::for_request(&request, 1024);
        let mut reader = ByteStream::new(
            std::io::Cursor::new(b"3\r\nfoo\r\n3\r\nbar\r\n0\r\n\r\n".to_vec()),
            64,
        );
        let mut out = Vec::new();
        body.read_to_end(&mut reader, &mut out).await.unwrap();
        assert_eq!(out, b"foobar");
        assert!(body.is_consumed());
    }

    #[tokio::test]
    async fn close_drains_unread_fixed_length_remainder() {
        let request = request_with_mode(BodyMode::FixedLength(5));
        let mut body = HttpBody::for_request(&request, 1024);
        let mut reader =
            ByteStream::new(std::io::Cursor::new(b"helloNEXTREQ".to_vec()), 64);
        body.close(&mut reader).await.unwrap();
        // The remaining bytes after the body were not consumed.
        let mut rest = Vec::new();
        let mut buf = [0u8; 64];
        let n = reader.read_some(&mut buf).await.unwrap();
        rest.extend_from_slice(&buf[..n]);
        assert_eq!(rest, b"NEXTREQ");
    }
}
