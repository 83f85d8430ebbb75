//! Minimal HTTP/1.1 request encoding and response decoding.
//!
//! Requests are written to a [`Transport`] as a single buffer. Responses are
//! read incrementally: the header block first, then a body framed either by
//! `Content-Length` or by chunked transfer encoding. A response with neither
//! keeps only the bytes that arrived alongside the headers, and the caller is
//! told the connection cannot be reused.

use std::collections::HashMap;
use std::fmt;

use crate::engine::transport::Transport;
use crate::error::{DaemonError, DaemonResult};

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 64 * 1024;

/// Upper bound on the header block before the response is rejected.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Upper bound on a decoded body.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const LINE_TERMINATOR: &[u8] = b"\r\n";

/// HTTP methods used against the daemon API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        })
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a request for `path`, which must start with `/` and may carry a
    /// query string.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Shorthand for a `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a body; `Content-Length` is derived from it.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The request target.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serialise the request with the given `Host` header value.
    ///
    /// `Content-Length` is always sent for requests with a body and for
    /// `POST`, which some daemons refuse without it.
    #[must_use]
    pub fn encode(&self, host: &str) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: containerbar/{}\r\nAccept: application/json\r\nConnection: keep-alive\r\n",
            self.method,
            self.path,
            env!("CARGO_PKG_VERSION"),
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        let body = self.body.as_deref().unwrap_or_default();
        if self.body.is_some() || self.method == Method::Post {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("\r\n");

        let mut encoded = head.into_bytes();
        encoded.extend_from_slice(body);
        encoded
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status_code: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    reusable: bool,
}

impl HttpResponse {
    /// The status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Look up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by lower-cased name.
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// The decoded body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, returning the body.
    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// The body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the connection may carry another request.
    ///
    /// False when the daemon asked to close or the body had no framing.
    #[must_use]
    pub const fn keeps_alive(&self) -> bool {
        self.reusable
    }
}

/// Send `request` and read the complete response.
///
/// # Errors
///
/// Propagates transport failures. Returns `DaemonError::ConnectionFailed`
/// when the peer closes before sending anything and
/// `DaemonError::InvalidResponse` when the response is malformed or
/// truncated.
pub async fn round_trip(
    transport: &mut dyn Transport,
    request: &HttpRequest,
    host: &str,
) -> DaemonResult<HttpResponse> {
    tracing::trace!(method = %request.method(), path = request.path(), "sending request");
    transport.send(&request.encode(host)).await?;
    read_response(transport).await
}

/// Read one response from `transport`.
///
/// # Errors
///
/// As for [`round_trip`].
pub async fn read_response(transport: &mut dyn Transport) -> DaemonResult<HttpResponse> {
    let mut reader = ResponseReader::new(transport);
    let head = reader.read_head().await?;
    let (status_code, headers) = parse_head(&head)?;
    let closes = headers
        .get("connection")
        .is_some_and(|value| value.eq_ignore_ascii_case("close"));

    let (body, framed) = match framing(status_code, &headers)? {
        BodyFraming::Empty => (Vec::new(), true),
        BodyFraming::Length(length) => (reader.read_exact_body(length).await?, true),
        BodyFraming::Chunked => (reader.read_chunked_body().await?, true),
        BodyFraming::Unframed => (reader.take_buffered(), false),
    };

    Ok(HttpResponse {
        status_code,
        headers,
        body,
        reusable: framed && !closes,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
    Unframed,
}

fn framing(status_code: u16, headers: &HashMap<String, String>) -> DaemonResult<BodyFraming> {
    if (100..200).contains(&status_code) || status_code == 204 || status_code == 304 {
        return Ok(BodyFraming::Empty);
    }
    if headers
        .get("transfer-encoding")
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    {
        return Ok(BodyFraming::Chunked);
    }
    match headers.get("content-length") {
        Some(value) => {
            let length = value.trim().parse::<usize>().map_err(|_parse| {
                DaemonError::invalid_response(format!("invalid Content-Length '{value}'"))
            })?;
            if length > MAX_BODY_BYTES {
                return Err(DaemonError::invalid_response(format!(
                    "Content-Length {length} exceeds the {MAX_BODY_BYTES} byte limit"
                )));
            }
            Ok(BodyFraming::Length(length))
        }
        None => Ok(BodyFraming::Unframed),
    }
}

/// Parse the status line and header lines of a response head.
fn parse_head(head: &[u8]) -> DaemonResult<(u16, HashMap<String, String>)> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(DaemonError::invalid_response(format!(
            "malformed status line '{status_line}'"
        )));
    }
    let status_code = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            DaemonError::invalid_response(format!("non-numeric status code in '{status_line}'"))
        })?;

    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let key = name.trim().to_ascii_lowercase();
        let trimmed = value.trim();
        headers
            .entry(key)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(trimmed);
            })
            .or_insert_with(|| trimmed.to_owned());
    }
    Ok((status_code, headers))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Buffers transport reads while a response is decoded.
struct ResponseReader<'a> {
    transport: &'a mut dyn Transport,
    buffer: Vec<u8>,
}

impl<'a> ResponseReader<'a> {
    fn new(transport: &'a mut dyn Transport) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
        }
    }

    /// Read more bytes; returns false at end of stream.
    async fn fill(&mut self) -> DaemonResult<bool> {
        let chunk = self.transport.receive(READ_CHUNK).await?;
        if chunk.is_empty() {
            return Ok(false);
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(true)
    }

    async fn read_head(&mut self) -> DaemonResult<Vec<u8>> {
        loop {
            if let Some(position) = find_subslice(&self.buffer, HEAD_TERMINATOR) {
                let mut head: Vec<u8> = self
                    .buffer
                    .drain(..position + HEAD_TERMINATOR.len())
                    .collect();
                head.truncate(position);
                return Ok(head);
            }
            if self.buffer.len() > MAX_HEAD_BYTES {
                return Err(DaemonError::invalid_response(format!(
                    "response headers exceed {MAX_HEAD_BYTES} bytes"
                )));
            }
            if !self.fill().await? {
                return Err(if self.buffer.is_empty() {
                    DaemonError::connection("connection closed before a response was received")
                } else {
                    DaemonError::invalid_response("connection closed inside the response headers")
                });
            }
        }
    }

    /// Make sure at least `length` bytes are buffered.
    async fn ensure(&mut self, length: usize) -> DaemonResult<()> {
        while self.buffer.len() < length {
            if !self.fill().await? {
                return Err(DaemonError::invalid_response(format!(
                    "body truncated: expected {length} bytes, received {}",
                    self.buffer.len()
                )));
            }
        }
        Ok(())
    }

    async fn read_exact_body(&mut self, length: usize) -> DaemonResult<Vec<u8>> {
        self.ensure(length).await?;
        Ok(self.buffer.drain(..length).collect())
    }

    /// Read one CRLF-terminated line; `None` at a clean end of stream.
    async fn read_line(&mut self) -> DaemonResult<Option<String>> {
        loop {
            if let Some(position) = find_subslice(&self.buffer, LINE_TERMINATOR) {
                let line: Vec<u8> = self
                    .buffer
                    .drain(..position + LINE_TERMINATOR.len())
                    .take(position)
                    .collect();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if !self.fill().await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(DaemonError::invalid_response(
                        "connection closed inside a chunk header",
                    ))
                };
            }
        }
    }

    async fn read_chunked_body(&mut self) -> DaemonResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let line = self
                .read_line()
                .await?
                .ok_or_else(|| DaemonError::invalid_response("chunked body ended without a terminating chunk"))?;
            let size_text = line.split(';').next().unwrap_or_default().trim();
            let size = parse_chunk_size(size_text)?;
            if size == 0 {
                self.skip_trailers().await?;
                return Ok(body);
            }
            if body.len().saturating_add(size) > MAX_BODY_BYTES {
                return Err(DaemonError::invalid_response(format!(
                    "chunked body exceeds the {MAX_BODY_BYTES} byte limit"
                )));
            }

            self.ensure(size + LINE_TERMINATOR.len()).await?;
            body.extend(self.buffer.drain(..size));
            let terminator: Vec<u8> = self.buffer.drain(..LINE_TERMINATOR.len()).collect();
            if terminator != LINE_TERMINATOR {
                return Err(DaemonError::invalid_response(
                    "chunk data is not followed by CRLF",
                ));
            }
        }
    }

    /// Consume trailer lines up to the blank line ending the message.
    async fn skip_trailers(&mut self) -> DaemonResult<()> {
        while let Some(line) = self.read_line().await? {
            if line.is_empty() {
                break;
            }
        }
        Ok(())
    }

    fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

/// Parse a chunk-size field, which must be bare hex digits.
fn parse_chunk_size(text: &str) -> DaemonResult<usize> {
    let invalid = || DaemonError::invalid_response(format!("invalid chunk size '{text}'"));
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    usize::from_str_radix(text, 16).map_err(|_overflow| invalid())
}
