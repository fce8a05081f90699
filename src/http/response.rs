//! `HttpResponse` and its output layering. The response object is
//! pure state (status, headers, flags); write methods take the connection's
//! writer as an explicit parameter rather than borrowing it for the
//! object's lifetime, which keeps the type simple to hold inside a handler
//! context alongside a separately-borrowed body.

use crate::http::header::{Header, HeaderList};
use crate::http::input::HttpRequest;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Pending,
    Body,
    Complete,
}

pub struct HttpResponse {
    state: ResponseState,
    status: u16,
    reason: String,
    headers: HeaderList,
    chunked: bool,
    compress: bool,
    flush_each_chunk: bool,
    content_length: Option<u64>,
    close_after: Option<bool>,
    bytes_written: u64,
    gzip_threshold: usize,
}

struct CommitPlan {
    send_body: bool,
    chunked: bool,
    compress: bool,
}

fn accepts_gzip(request: &HttpRequest) -> bool {
    request
        .headers
        .get("accept-encoding")
        .map(|v| {
            v.split(',').any(|tok| {
                tok.trim()
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .eq_ignore_ascii_case("gzip")
            })
        })
        .unwrap_or(false)
}

impl HttpResponse {
    pub fn new(gzip_threshold: usize) -> Self {
        HttpResponse {
            state: ResponseState::Pending,
            status: 200,
            reason: String::new(),
            headers: HeaderList::new(),
            chunked: false,
            compress: false,
            flush_each_chunk: false,
            content_length: None,
            close_after: None,
            bytes_written: 0,
            gzip_threshold,
        }
    }

    fn assert_pending(&self) {
        debug_assert_eq!(
            self.state,
            ResponseState::Pending,
            "response properties mutated after commit"
        );
    }

    pub fn status(&mut self, code: u16) -> &mut Self {
        self.assert_pending();
        self.status = code;
        self
    }

    pub fn reason(&mut self, reason: impl Into<String>) -> &mut Self {
        self.assert_pending();
        self.reason = reason.into();
        self
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.assert_pending();
        self.headers.push(Header::new(name.into(), value.into()));
        self
    }

    pub fn content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.header("content-type", content_type.into())
    }

    pub fn content_length(&mut self, length: u64) -> &mut Self {
        self.assert_pending();
        self.content_length = Some(length);
        self
    }

    pub fn chunked(&mut self, yes: bool) -> &mut Self {
        self.assert_pending();
        self.chunked = yes;
        self
    }

    pub fn compress(&mut self, yes: bool) -> &mut Self {
        self.assert_pending();
        self.compress = yes;
        self
    }

    pub fn flush_each_chunk(&mut self, yes: bool) -> &mut Self {
        self.assert_pending();
        self.flush_each_chunk = yes;
        self
    }

    pub fn close_after(&mut self, yes: bool) -> &mut Self {
        self.assert_pending();
        self.close_after = Some(yes);
        self
    }

    pub fn has_committed(&self) -> bool {
        self.state != ResponseState::Pending
    }

    pub fn is_complete(&self) -> bool {
        self.state == ResponseState::Complete
    }

    pub fn will_close_after(&self) -> bool {
        self.close_after.unwrap_or(false)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    fn headers_iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    /// The one escape hatch from the general commit algorithm: the 101
    /// Switching Protocols response has a wire format ("Connection:
    /// Upgrade" rather than close/keep-alive) that doesn't fit the generic
    /// `commit` sequence, so the WebSocket handshake writes it directly and
    /// marks the response COMPLETE here afterwards.
    pub(crate) fn mark_externally_completed(&mut self) {
        self.state = ResponseState::Complete;
    }

    pub(crate) fn status_line_and_headers(&self) -> (u16, &str, impl Iterator<Item = &Header>) {
        (self.status, &self.reason, self.headers_iter())
    }

    async fn commit<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        request: &HttpRequest,
        send_body: bool,
    ) -> io::Result<CommitPlan> {
        self.assert_pending();

        let compress = send_body && self.compress && accepts_gzip(request);
        let chunked = send_body && self.chunked;

        writer
            .write_all(format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).as_bytes())
            .await?;

        if compress {
            self.headers.push(Header::new("content-encoding", "gzip"));
        }
        for h in self.headers.iter() {
            writer
                .write_all(format!("{}: {}\r\n", h.name_lower, h.value).as_bytes())
                .await?;
        }

        if chunked {
            writer.write_all(b"transfer-encoding: chunked\r\n").await?;
        } else if let Some(len) = self.content_length {
            writer
                .write_all(format!("content-length: {}\r\n", len).as_bytes())
                .await?;
        }

        let close_after = self.close_after.unwrap_or(request.close_after);
        self.close_after = Some(close_after);
        writer
            .write_all(
                format!(
                    "connection: {}\r\n",
                    if close_after { "close" } else { "keep-alive" }
                )
                .as_bytes(),
            )
            .await?;

        writer.write_all(b"\r\n").await?;
        self.state = ResponseState::Body;

        if !send_body {
            writer.flush().await?;
            self.state = ResponseState::Complete;
        }

        Ok(CommitPlan {
            send_body,
            chunked,
            compress,
        })
    }

    /// Commits the response with no body.
    pub async fn no_content<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        request: &HttpRequest,
    ) -> io::Result<()> {
        self.commit(writer, request, false).await?;
        Ok(())
    }

    /// Obtains a raw body sink: headers are
    /// committed immediately, and the handler writes incrementally.
    pub async fn body_sink<'a, W: AsyncWrite + Unpin>(
        &'a mut self,
        writer: &'a mut W,
        request: &HttpRequest,
    ) -> io::Result<ResponseBodySink<'a, W>> {
        let plan = self.commit(writer, request, true).await?;
        let gzip = if plan.compress {
            Some(GzipLayer {
                encoder: GzEncoder::new(Vec::new(), Compression::default()),
                forwarded: 0,
            })
        } else {
            None
        };
        Ok(ResponseBodySink {
            response: self,
            writer,
            chunked: plan.chunked,
            flush_each_chunk: self.flush_each_chunk,
            gzip,
        })
    }

    /// Writes a complete string in one shot.
    pub async fn send_string<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        request: &HttpRequest,
        body: &str,
    ) -> io::Result<()> {
        let bytes = body.as_bytes();
        if bytes.len() < self.gzip_threshold {
            // Small-payload optimization: disable compression,
            // force content-length, override chunked.
            self.compress = false;
            self.chunked = false;
            self.content_length = Some(bytes.len() as u64);
        } else if !self.chunked && self.content_length.is_none() {
            self.content_length = Some(bytes.len() as u64);
        }
        let mut sink = self.body_sink(writer, request).await?;
        sink.write(bytes).await?;
        sink.close().await
    }

    /// Streams from an input source until EOF, then closes. Defaults to a
    /// chunked body unless the caller already fixed a framing mode, since
    /// the source's length usually isn't known up front.
    pub async fn send_from<W: AsyncWrite + Unpin, R: AsyncRead + Unpin>(
        &mut self,
        writer: &mut W,
        request: &HttpRequest,
        mut source: R,
    ) -> io::Result<()> {
        if !self.chunked && self.content_length.is_none() {
            self.chunked = true;
        }
        let mut sink = self.body_sink(writer, request).await?;
        let mut buf = [0u8; 8192];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.write(&buf[..n]).await?;
        }
        sink.close().await
    }
}

struct GzipLayer {
    encoder: GzEncoder<Vec<u8>>,
    forwarded: usize,
}

/// The outermost write surface a handler sees once a body is committed:
/// underlying writer → close-interceptor → chunked encoder → gzip encoder,
/// innermost first. Implemented as an enum of the four
/// concrete layer combinations rather than a generic wrapper stack, since
/// that's the entire combinatorics this protocol needs.
pub struct ResponseBodySink<'a, W> {
    response: &'a mut HttpResponse,
    writer: &'a mut W,
    chunked: bool,
    flush_each_chunk: bool,
    gzip: Option<GzipLayer>,
}

async fn write_chunk<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
    flush_each: bool,
) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    if data.len() == 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "chunked encoder refuses to write a 1-byte chunk",
        ));
    }
    writer
        .write_all(format!("{:x}\r\n", data.len()).as_bytes())
        .await?;
    writer.write_all(data).await?;
    writer.write_all(b"\r\n").await?;
    if flush_each {
        writer.flush().await?;
    }
    Ok(())
}

impl<'a, W: AsyncWrite + Unpin> ResponseBodySink<'a, W> {
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let produced: Vec<u8> = if let Some(gz) = &mut self.gzip {
            use std::io::Write as _;
            gz.encoder.write_all(buf)?;
            let total = gz.encoder.get_ref().len();
            let slice = gz.encoder.get_ref()[gz.forwarded..total].to_vec();
            gz.forwarded = total;
            slice
        } else {
            buf.to_vec()
        };
        if produced.is_empty() {
            return Ok(());
        }
        self.response.bytes_written += produced.len() as u64;
        if self.chunked {
            write_chunk(self.writer, &produced, self.flush_each_chunk).await
        } else {
            self.writer.write_all(&produced).await
        }
    }

    pub async fn close(mut self) -> io::Result<()> {
        if let Some(gz) = self.gzip.take() {
            let final_vec = gz.encoder.finish()?;
            let tail = &final_vec[gz.forwarded..];
            if !tail.is_empty() {
                self.response.bytes_written += tail.len() as u64;
                if self.chunked {
                    write_chunk(self.writer, tail, self.flush_each_chunk).await?;
                } else {
                    self.writer.write_all(tail).await?;
                }
            }
        }
        if self.chunked {
            self.writer.write_all(b"0\r\n\r\n").await?;
        }
        self.writer.flush().await?;
        self.response.state = ResponseState::Complete;
        Ok(())
    }
}

/// Writes the canonical minimal 400 response, used when request parsing
/// fails before a validated `HttpRequest` even exists, so it cannot go
/// through `HttpResponse::commit`.
pub async fn write_bad_request_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &str,
) -> io::Result<()> {
    let body = message.as_bytes();
    writer
        .write_all(
            format!(
                "HTTP/1.1 400 \r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        )
        .await?;
    writer.write_all(body).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::header::HeaderList;
    use crate::http::input::{BodyMode, HttpVersion};

    fn request() -> HttpRequest {
        HttpRequest {
            method: "GET".into(),
            target: "/".into(),
            version: HttpVersion::Http11,
            headers: HeaderList::new(),
            body_mode: BodyMode::None,
            close_after: false,
        }
    }

    #[tokio::test]
    async fn small_string_response_has_content_length_and_no_chunking() {
        let mut writer = Vec::new();
        let mut response = HttpResponse::new(850);
        response.send_string(&mut writer, &request(), "Hello World!").await.unwrap();
        assert_eq!(
            String::from_utf8(writer).unwrap(),
            "HTTP/1.1 200 \r\ncontent-length: 12\r\nconnection: keep-alive\r\n\r\nHello World!"
        );
        assert!(response.is_complete());
    }

    #[tokio::test]
    async fn bad_request_writes_exact_minimal_response() {
        let mut writer = Vec::new();
        let message = "Missing required Host header field in HTTP/1.1 request";
        write_bad_request_response(&mut writer, message).await.unwrap();
        assert_eq!(
            String::from_utf8(writer).unwrap(),
            "HTTP/1.1 400 \r\ncontent-type: text/plain\r\ncontent-length: 54\r\nconnection: close\r\n\r\nMissing required Host header field in HTTP/1.1 request"
        );
    }

    #[tokio::test]
    async fn chunked_body_sink_emits_hex_framed_chunks() {
        let mut writer = Vec::new();
        let mut response = HttpResponse::new(0);
        response.chunked(true);
        {
            let mut sink = response.body_sink(&mut writer, &request()).await.unwrap();
            sink.write(b"abcdef").await.unwrap();
            sink.close().await.unwrap();
        }
        let text = String::from_utf8(writer).unwrap();
        assert!(text.ends_with("6\r\nabcdef\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn refuses_one_byte_chunk_writes() {
        let mut writer = Vec::new();
        let mut response = HttpResponse::new(0);
        response.chunked(true);
        let mut sink = response.body_sink(&mut writer, &request()).await.unwrap();
        let err = sink.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
