//! Minimal HTTP/1.1 for the portal: one request per connection, every
//! response carries no-cache headers, an exact `Content-Length` and
//! `Connection: close`.

use std::io::{self, Read};

use log::warn;
use serde::Serialize;

use crate::error::RequestError;

pub const MAX_HEADER_BYTES: usize = 8 * 1024;
pub const MAX_BODY_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Other(token) => token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Request path without query string or fragment.
    pub path: String,
    /// `None` when the request carried no body bytes.
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }
}

/// Reads one request from `reader`. Chunked bodies are not supported.
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request, RequestError> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 512];

    let header_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(RequestError::HeadersTooLarge(MAX_HEADER_BYTES));
        }
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            return Err(RequestError::Incomplete);
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = std::str::from_utf8(&buffer[..header_end.head_len])
        .map_err(|_| RequestError::Malformed("request head is not utf-8"))?;
    let mut lines = head.lines();

    let request_line = lines
        .next()
        .ok_or(RequestError::Malformed("missing request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .map(Method::parse)
        .ok_or(RequestError::Malformed("missing method"))?;
    let target = parts
        .next()
        .ok_or(RequestError::Malformed("missing request target"))?;
    let version = parts
        .next()
        .ok_or(RequestError::Malformed("missing http version"))?;
    if !version.starts_with("HTTP/1.") {
        return Err(RequestError::Malformed("unsupported http version"));
    }

    let mut content_length = 0_usize;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse()
                .map_err(|_| RequestError::Malformed("invalid content-length"))?;
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && !value.eq_ignore_ascii_case("identity")
        {
            return Err(RequestError::Malformed("transfer-encoding is not supported"));
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::BodyTooLarge(content_length));
    }

    let path = normalize_path(target);
    let mut body = buffer.split_off(header_end.body_start);
    body.truncate(content_length);
    if body.len() < content_length {
        let already = body.len();
        body.resize(content_length, 0);
        reader.read_exact(&mut body[already..]).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                RequestError::Incomplete
            } else {
                RequestError::Io(err)
            }
        })?;
    }

    Ok(Request {
        method,
        path,
        body: (!body.is_empty()).then_some(body),
    })
}

struct HeaderEnd {
    head_len: usize,
    body_start: usize,
}

fn find_header_end(buffer: &[u8]) -> Option<HeaderEnd> {
    if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(HeaderEnd {
            head_len: pos,
            body_start: pos + 4,
        });
    }
    buffer
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| HeaderEnd {
            head_len: pos,
            body_start: pos + 2,
        })
}

fn normalize_path(target: &str) -> String {
    // absolute-form targets are sent by some captive portal probes
    let target = match target.find("://") {
        Some(scheme_end) => {
            let rest = &target[scheme_end + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None => target,
    };
    let end = target.find(['?', '#']).unwrap_or(target.len());
    let path = &target[..end];
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Response {
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_vec(payload) {
            Ok(body) => Self {
                status: 200,
                content_type: "application/json",
                body,
            },
            Err(err) => {
                warn!("failed to serialize json response: {err}");
                Self::text(500, "Internal Server Error")
            }
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn bad_request() -> Self {
        Self::text(400, "Bad Request")
    }

    pub fn encode(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Cache-Control: no-cache, no-store, must-revalidate\r\n\
             Pragma: no-cache\r\n\
             Expires: -1\r\n\
             Connection: close\r\n\
             Content-Length: {}\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );

        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// The write half of one accepted HTTP connection.
pub trait Responder {
    /// Writes `response` and closes the connection.
    fn send(&mut self, response: &Response) -> io::Result<()>;
}

/// Sends `response`, logging instead of failing when the client is gone.
pub fn respond<C: Responder + ?Sized>(client: &mut C, response: &Response) {
    if let Err(err) = client.send(response) {
        warn!("client went away before the {} response was sent: {err}", response.status);
    }
}
