//! `HttpInput` — the strict RFC 9112 parser. Functions here operate
//! on a borrowed `ByteStream` rather than a struct wrapping one; there is no
//! parser-local state that outlives a single `read_request`/`read_chunk`
//! call, so a free-function module is simpler than an object.
//!
//! Raw parsing (`read_request`) is kept separate from post-parse validation
//! (`prepare_request`) so each can be tested in isolation.

use crate::error::{BadRequest, ReadRequestError};
use crate::http::header::{Header, HeaderList};
use crate::http::stream::ByteStream;
use tokio::io::AsyncRead;

pub const MAX_REQUEST_LINE_LEN: usize = 8000;
pub const MAX_HEADER_NAME_LEN: usize = 1024;
pub const MAX_HEADER_VALUE_LEN: usize = 8192;
pub const MAX_HEADERS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    None,
    FixedLength(u64),
    Chunked,
}

/// The raw result of parsing a request-line and header block, before the
/// post-parse validation in `prepare_request` runs.
pub struct RawRequest {
    pub method: String,
    pub target: String,
    pub version: HttpVersion,
    pub headers: HeaderList,
}

/// The validated view exposed to handlers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub version: HttpVersion,
    pub headers: HeaderList,
    pub body_mode: BodyMode,
    pub close_after: bool,
}

fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

enum LineOutcome {
    Eof,
    TooLong,
    Line(Vec<u8>),
}

async fn read_line<R: AsyncRead + Unpin>(
    stream: &mut ByteStream<R>,
    max_len: usize,
) -> std::io::Result<LineOutcome> {
    let mut line = Vec::new();
    loop {
        let byte = match stream.read_byte().await? {
            Some(b) => b,
            None => {
                if line.is_empty() {
                    return Ok(LineOutcome::Eof);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-line",
                ));
            }
        };
        if byte == b'\n' {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(LineOutcome::Line(line));
        }
        if line.len() >= max_len {
            return Ok(LineOutcome::TooLong);
        }
        line.push(byte);
    }
}

fn validate_method(method: &str) -> Result<(), BadRequest> {
    if method.is_empty() || !method.bytes().all(is_tchar) {
        return Err(BadRequest::new("Invalid method token"));
    }
    Ok(())
}

fn validate_target(target: &str) -> Result<(), BadRequest> {
    if target.is_empty() || !target.bytes().all(|b| (0x21..=0x7E).contains(&b)) {
        return Err(BadRequest::new("Invalid request-target"));
    }
    Ok(())
}

fn parse_version(version: &str) -> Result<HttpVersion, BadRequest> {
    let bytes = version.as_bytes();
    let well_formed = bytes.len() == 8
        && &bytes[0..5] == b"HTTP/"
        && bytes[5].is_ascii_digit()
        && bytes[6] == b'.'
        && bytes[7].is_ascii_digit();
    if !well_formed {
        return Err(BadRequest::new("Malformed HTTP version"));
    }
    match version {
        "HTTP/1.1" => Ok(HttpVersion::Http11),
        "HTTP/1.0" => Ok(HttpVersion::Http10),
        _ => Err(BadRequest::new("Unsupported HTTP version")),
    }
}

/// Reads one request-line and its header block. `Ok(None)` means a clean
/// EOF before any request line arrived — a terminal EOF, not an error.
pub async fn read_request<R: AsyncRead + Unpin>(
    stream: &mut ByteStream<R>,
) -> Result<Option<RawRequest>, ReadRequestError> {
    let line = loop {
        match read_line(stream, MAX_REQUEST_LINE_LEN).await? {
            LineOutcome::Eof => return Ok(None),
            LineOutcome::TooLong => {
                return Err(BadRequest::new("Request-line too long").into())
            }
            LineOutcome::Line(l) if l.is_empty() => continue,
            LineOutcome::Line(l) => break l,
        }
    };

    let line = std::str::from_utf8(&line)
        .map_err(|_| BadRequest::new("Request-line is not valid ASCII"))?;
    let mut parts = line.splitn(3, ' ');
    let method = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BadRequest::new("Malformed request-line"))?;
    let target = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BadRequest::new("Malformed request-line"))?;
    let version = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BadRequest::new("Malformed request-line"))?;

    validate_method(method)?;
    validate_target(target)?;
    let version = parse_version(version)?;

    let headers = read_headers(stream).await?;

    Ok(Some(RawRequest {
        method: method.to_ascii_uppercase(),
        target: target.to_string(),
        version,
        headers,
    }))
}

async fn read_headers<R: AsyncRead + Unpin>(
    stream: &mut ByteStream<R>,
) -> Result<HeaderList, ReadRequestError> {
    let mut headers = HeaderList::new();
    loop {
        let line = match read_line(stream, MAX_HEADER_NAME_LEN + MAX_HEADER_VALUE_LEN + 2).await? {
            LineOutcome::Eof => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-headers",
                )
                .into())
            }
            LineOutcome::TooLong => return Err(BadRequest::new("Header line too long").into()),
            LineOutcome::Line(l) => l,
        };
        if line.is_empty() {
            return Ok(headers);
        }
        if headers.len() >= MAX_HEADERS {
            return Err(BadRequest::new("Too many headers").into());
        }

        if line[0] == b' ' || line[0] == b'\t' {
            // obs-fold continuation: collapse to a single SP appended to
            // the previous header's value.
            let cont = std::str::from_utf8(&line)
                .map_err(|_| BadRequest::new("Header value is not valid ASCII"))?
                .trim();
            match headers.last_mut() {
                Some(prev) => {
                    if prev.value.len() + 1 + cont.len() > MAX_HEADER_VALUE_LEN {
                        return Err(BadRequest::new("Header value too long").into());
                    }
                    prev.value.push(' ');
                    prev.value.push_str(cont);
                }
                None => return Err(BadRequest::new("Unexpected header continuation").into()),
            }
            continue;
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| BadRequest::new("Header line missing colon"))?;
        if colon == 0 {
            return Err(BadRequest::new("Header line missing field name").into());
        }
        if line[colon - 1] == b' ' || line[colon - 1] == b'\t' {
            return Err(BadRequest::new("Whitespace before colon in header field name").into());
        }

        let name_bytes = &line[..colon];
        if name_bytes.len() > MAX_HEADER_NAME_LEN {
            return Err(BadRequest::new("Header name too long").into());
        }
        if !name_bytes.iter().all(|&b| is_tchar(b)) {
            return Err(BadRequest::new("Invalid header field name").into());
        }
        let name = std::str::from_utf8(name_bytes).unwrap().to_string();

        let mut value_bytes = line[colon + 1..].to_vec();
        for b in value_bytes.iter_mut() {
            if *b == b'\r' {
                *b = b' ';
            }
        }
        if value_bytes.len() > MAX_HEADER_VALUE_LEN {
            return Err(BadRequest::new("Header value too long").into());
        }
        let value = String::from_utf8_lossy(&value_bytes).trim().to_string();
        headers.push(Header::new(name, value));
    }
}

/// Post-parse validation, separated from raw parsing.
pub fn prepare_request(
    raw: RawRequest,
    max_body_size: u64,
) -> Result<HttpRequest, BadRequest> {
    let RawRequest {
        method,
        target,
        version,
        headers,
    } = raw;

    let close_after = match version {
        HttpVersion::Http11 => {
            let host_count = headers.count("host");
            if host_count == 0 {
                return Err(BadRequest::new(
                    "Missing required Host header field in HTTP/1.1 request",
                ));
            }
            if host_count > 1 {
                return Err(BadRequest::new(
                    "Host header field must not be duplicated in HTTP/1.1 request",
                ));
            }
            headers
                .get("connection")
                .map(|v| {
                    v.split(',')
                        .any(|tok| tok.trim().eq_ignore_ascii_case("close"))
                })
                .unwrap_or(false)
        }
        HttpVersion::Http10 => !headers
            .get("connection")
            .map(|v| {
                v.split(',')
                    .any(|tok| tok.trim().eq_ignore_ascii_case("keep-alive"))
            })
            .unwrap_or(false),
    };

    let is_chunked = headers
        .get("transfer-encoding")
        .map(|v| {
            v.split(',')
                .any(|tok| tok.trim().eq_ignore_ascii_case("chunked"))
        })
        .unwrap_or(false);

    // Tie-break: chunked wins when both transfer-encoding: chunked and
    // content-length are present.
    let body_mode = if is_chunked {
        BodyMode::Chunked
    } else if let Some(cl) = headers.get("content-length") {
        let n: u64 = cl
            .trim()
            .parse()
            .map_err(|_| BadRequest::new("Invalid Content-Length header"))?;
        if n > max_body_size {
            return Err(BadRequest::new(
                "Content-Length exceeds maximum allowed request body size",
            ));
        }
        BodyMode::FixedLength(n)
    } else {
        BodyMode::None
    };

    Ok(HttpRequest {
        method,
        target,
        version,
        headers,
        body_mode,
        close_after,
    })
}

/// A decoded chunk. `is_last` iff `data` is empty and this was
/// the terminal zero-size chunk, in which case `trailers` carries the
/// trailer section.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub data: Vec<u8>,
    pub extensions: Vec<(String, Option<String>)>,
    pub trailers: HeaderList,
    pub is_last: bool,
}

fn parse_chunk_extensions(s: &str) -> Result<Vec<(String, Option<String>)>, BadRequest> {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut exts = Vec::new();
    loop {
        while i < bytes.len() && (bytes[i] == b';' || bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && bytes[i] != b';' {
            i += 1;
        }
        let name = s[name_start..i].trim().to_string();
        if name.is_empty() {
            return Err(BadRequest::new("Empty chunk extension name"));
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            if i < bytes.len() && bytes[i] == b'"' {
                i += 1;
                let mut value = String::new();
                loop {
                    if i >= bytes.len() {
                        return Err(BadRequest::new("Unterminated quoted chunk extension value"));
                    }
                    let b = bytes[i];
                    if b == b'"' {
                        i += 1;
                        break;
                    }
                    if b == b'\\' {
                        i += 1;
                        if i >= bytes.len() {
                            return Err(BadRequest::new(
                                "Unterminated quoted-pair in chunk extension",
                            ));
                        }
                        let qb = bytes[i];
                        if !(qb == b'\t' || qb == b' ' || (0x21..=0x7E).contains(&qb) || qb >= 0x80)
                        {
                            return Err(BadRequest::new("Invalid quoted-pair in chunk extension"));
                        }
                        value.push(qb as char);
                        i += 1;
                    } else {
                        value.push(b as char);
                        i += 1;
                    }
                }
                exts.push((name, Some(value)));
            } else {
                let value_start = i;
                while i < bytes.len() && bytes[i] != b';' {
                    i += 1;
                }
                let value = s[value_start..i].trim().to_string();
                exts.push((name, Some(value)));
            }
        } else {
            exts.push((name, None));
        }
    }
    Ok(exts)
}

/// Reads `chunk-size [ chunk-ext ] CRLF chunk-data CRLF`, or the terminal
/// zero-size chunk followed by the trailer section.
pub async fn read_chunk<R: AsyncRead + Unpin>(
    stream: &mut ByteStream<R>,
    max_chunk_size: u64,
) -> Result<Chunk, ReadRequestError> {
    let line = match read_line(stream, 16 + MAX_HEADER_VALUE_LEN).await? {
        LineOutcome::Eof => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-chunk",
            )
            .into())
        }
        LineOutcome::TooLong => return Err(BadRequest::new("Chunk header line too long").into()),
        LineOutcome::Line(l) => l,
    };
    let line_str =
        std::str::from_utf8(&line).map_err(|_| BadRequest::new("Chunk header is not valid ASCII"))?;

    let (size_part, ext_part) = match line_str.find(';') {
        Some(idx) => (&line_str[..idx], Some(&line_str[idx + 1..])),
        None => (line_str, None),
    };
    let size_part = size_part.trim();
    if size_part.is_empty() || size_part.len() > 16 || !size_part.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(BadRequest::new("Invalid chunk size").into());
    }
    let size = u64::from_str_radix(size_part, 16)
        .map_err(|_| BadRequest::new("Chunk size overflow"))?;
    if size > max_chunk_size {
        return Err(BadRequest::new("Chunk size exceeds configured maximum").into());
    }

    let extensions = match ext_part {
        Some(ext) => parse_chunk_extensions(ext)?,
        None => Vec::new(),
    };

    if size == 0 {
        let trailers = read_headers(stream).await?;
        return Ok(Chunk {
            data: Vec::new(),
            extensions,
            trailers,
            is_last: true,
        });
    }

    let mut data = vec![0u8; size as usize];
    stream.read_exact(&mut data).await?;

    let mut terminator = [0u8; 2];
    stream.read_exact(&mut terminator).await?;
    if &terminator != b"\r\n" {
        return Err(BadRequest::new("Malformed chunk terminator").into());
    }

    Ok(Chunk {
        data,
        extensions,
        trailers: HeaderList::new(),
        is_last: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn stream_of(bytes: &[u8]) -> ByteStream<std::io::Cursor<Vec<u8>>> {
        ByteStream::new(std::io::Cursor::new(bytes.to_vec()), 64)
    }

    #[tokio::test]
    async fn parses_request_line_and_headers() {
        let mut stream = stream_of(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nX-A: 1\r\nX-A: 2\r\n\r\n");
        let raw = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(raw.method, "GET");
        assert_eq!(raw.target, "/index.html");
        assert_eq!(raw.version, HttpVersion::Http11);
        assert_eq!(raw.headers.get("host"), Some("example.com".to_string()));
        assert_eq!(raw.headers.get("x-a"), Some("1, 2".to_string()));
    }

    #[tokio::test]
    async fn skips_leading_blank_lines() {
        let mut stream = stream_of(b"\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let raw = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(raw.method, "GET");
    }

    #[tokio::test]
    async fn clean_eof_before_request_line_is_not_an_error() {
        let mut stream = stream_of(b"");
        assert!(read_request(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn obs_fold_continuation_is_collapsed_to_single_space() {
        let mut stream = stream_of(b"GET / HTTP/1.1\r\nHost: example.com\r\nX-Long: a\r\n b\r\n\r\n");
        let raw = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(raw.headers.get("x-long"), Some("a b".to_string()));
    }

    #[tokio::test]
    async fn whitespace_before_colon_is_rejected() {
        let mut stream = stream_of(b"GET / HTTP/1.1\r\nHost : example.com\r\n\r\n");
        let err = read_request(&mut stream).await.unwrap_err();
        matches!(err, ReadRequestError::BadRequest(_));
    }

    #[test]
    fn missing_host_on_http11_is_bad_request() {
        let raw = RawRequest {
            method: "GET".into(),
            target: "/".into(),
            version: HttpVersion::Http11,
            headers: HeaderList::new(),
        };
        let err = prepare_request(raw, 1024).unwrap_err();
        assert_eq!(
            err.0,
            "Missing required Host header field in HTTP/1.1 request"
        );
        assert_eq!(err.0.len(), 54);
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let mut headers = HeaderList::new();
        headers.push(Header::new("Host", "x"));
        headers.push(Header::new("Transfer-Encoding", "chunked"));
        headers.push(Header::new("Content-Length", "10"));
        let raw = RawRequest {
            method: "POST".into(),
            target: "/".into(),
            version: HttpVersion::Http11,
            headers,
        };
        let request = prepare_request(raw, 1024).unwrap();
        assert_eq!(request.body_mode, BodyMode::Chunked);
    }

    #[rstest]
    #[case(b"5\r\nhello\r\n0\r\n\r\n", "hello")]
    #[case(b"2\r\nhe\r\n3\r\nllo\r\n0\r\n\r\n", "hello")]
    #[tokio::test]
    async fn reads_chunks_until_terminal(#[case] bytes: &[u8], #[case] expected: &str) {
        let mut stream = stream_of(bytes);
        let mut collected = Vec::new();
        loop {
            let chunk = read_chunk(&mut stream, 1024).await.unwrap();
            if chunk.is_last {
                break;
            }
            collected.extend_from_slice(&chunk.data);
        }
        assert_eq!(collected, expected.as_bytes());
    }

    #[tokio::test]
    async fn chunk_extensions_are_preserved_unacted_on() {
        let mut stream = stream_of(b"3;foo=bar;flag\r\nabc\r\n0\r\n\r\n");
        let chunk = read_chunk(&mut stream, 1024).await.unwrap();
        assert_eq!(
            chunk.extensions,
            vec![
                ("foo".to_string(), Some("bar".to_string())),
                ("flag".to_string(), None),
            ]
        );
    }
}
