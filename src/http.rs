//! Minimal HTTP/1.1 request reading and response writing.

use std::{
    collections::HashMap,
    fmt,
    io::{self, Read, Write},
};

use log::debug;
use memchr::memmem;

use crate::error::ServerError;
use crate::pages::error_page;
use crate::security::strip_query;
use crate::upload::BodyLimit;

pub const MAX_HEAD_SIZE: usize = 16 * 1024;
const READ_CHUNK: usize = 4096;
const HEAD_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Other(String),
}

impl Method {
    pub fn parse(raw: &str) -> Method {
        match raw {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Head => f.write_str("HEAD"),
            Method::Post => f.write_str("POST"),
            Method::Other(m) => f.write_str(m),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Raw request target, still percent-encoded and with any query string.
    pub target: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, target: &str) -> Request {
        Request {
            method,
            target: target.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Request {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Request {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    /// Target without query string or fragment.
    pub fn path(&self) -> &str {
        strip_query(&self.target)
    }

    pub fn content_length(&self) -> Result<Option<usize>, ServerError> {
        match self.header("content-length") {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ServerError::BadRequest(format!("invalid Content-Length \"{}\"", v))),
        }
    }
}

/// Parses the request line and headers (everything before the blank line).
pub fn parse_head(head: &[u8]) -> Result<Request, ServerError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ServerError::BadRequest(String::from("request head is not valid UTF-8")))?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut pieces = request_line.split_whitespace();
    let (method, target, version) = match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(m), Some(t), Some(v)) => (m, t, v),
        _ => {
            return Err(ServerError::BadRequest(format!(
                "malformed request line \"{}\"",
                request_line
            )))
        }
    };
    if !version.starts_with("HTTP/") {
        return Err(ServerError::BadRequest(format!("unsupported protocol \"{}\"", version)));
    }

    let mut request = Request::new(Method::parse(method), target);
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ServerError::BadRequest(format!("malformed header \"{}\"", line)))?;
        request
            .headers
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(request)
}

/// Reads until the end of the request head.
///
/// Returns the parsed head and whatever body bytes arrived with it.
pub fn read_head<R: Read>(reader: &mut R, max_head: usize) -> Result<(Request, Vec<u8>), ServerError> {
    let mut buffer = [0u8; READ_CHUNK];
    let mut received = Vec::new();

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            return Err(ServerError::BadRequest(String::from(
                "connection closed before the request head was complete",
            )));
        }
        received.extend_from_slice(&buffer[..bytes_read]);

        if let Some(end) = memmem::find(&received, HEAD_END) {
            let request = parse_head(&received[..end])?;
            let leftover = received.split_off(end + HEAD_END.len());
            return Ok((request, leftover));
        }
        if received.len() > max_head {
            return Err(ServerError::BadRequest(String::from("request head too large")));
        }
    }
}

/// Reads exactly `content_length` body bytes, checking `limit` after every chunk.
///
/// A declared length over the limit fails before anything is read.
pub fn read_body<R: Read>(
    reader: &mut R,
    mut leftover: Vec<u8>,
    content_length: usize,
    limit: &mut BodyLimit,
) -> Result<Vec<u8>, ServerError> {
    if content_length > limit.limit() {
        return Err(ServerError::PayloadTooLarge { limit: limit.limit() });
    }
    leftover.truncate(content_length);

    limit.record(leftover.len())?;
    let mut body = leftover;
    let mut buffer = [0u8; READ_CHUNK];

    while body.len() < content_length {
        let want = (content_length - body.len()).min(buffer.len());
        let bytes_read = reader.read(&mut buffer[..want])?;
        if bytes_read == 0 {
            return Err(ServerError::BadRequest(String::from(
                "request body ended before Content-Length bytes",
            )));
        }

        limit.record(bytes_read)?;
        body.extend_from_slice(&buffer[..bytes_read]);
    }

    debug!("read request body of {} bytes", limit.seen());
    Ok(body)
}

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        _ => "Internal Server Error",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Response {
        Response {
            status,
            content_type: content_type.to_string(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn html(status: u16, html: String) -> Response {
        Response::new(status, "text/html; charset=UTF-8", html.into_bytes())
    }

    pub fn from_error(error: &ServerError) -> Response {
        let status = error.status_code();
        let mut response = Response::html(
            status,
            error_page(status, reason_phrase(status), &error.public_message()),
        );
        if let ServerError::MethodNotAllowed(_) = error {
            response = response.with_header("Allow", "GET, HEAD, POST");
        }
        response
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Response {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Serialized response. HEAD responses pass `include_body = false` and keep
    /// the full `Content-Length`.
    pub fn to_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        if include_body {
            out.extend_from_slice(&self.body);
        }
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W, include_body: bool) -> io::Result<()> {
        writer.write_all(&self.to_bytes(include_body))?;
        writer.flush()
    }
}
