//! RTSP/1.0 message codec (RFC 2326).
//!
//! Requests and responses share a common [`Message`] (headers + body) behind
//! their respective start lines. Parsing operates on the header section of
//! the wire text; a body announced by `Content-Length` is read separately by
//! the connection loop and attached afterwards.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{PicastError, Result};
use crate::rtsp::header::{names, Headers};
use crate::rtsp::method::Method;
use crate::rtsp::status::Status;

/// The only protocol version this server speaks.
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// Header block plus optional body, shared by requests and responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Header lines
    pub headers: Headers,
    /// Message body; empty unless `Content-Length` announced one
    pub body: Vec<u8>,
}

impl Message {
    /// Parses the message section following a start line: a header block
    /// terminated by an empty line, then any body bytes.
    pub fn parse(s: &str) -> Result<Message> {
        if s.is_empty() || s == "\r\n" {
            return Ok(Message::default());
        }

        let delimiter = s
            .find("\r\n\r\n")
            .ok_or_else(|| PicastError::Parser("cannot parse message".into()))?;
        let body_start = delimiter + 4;

        let headers = Headers::parse(&s[..delimiter])?;
        let body = if body_start < s.len() {
            s[body_start..].as_bytes().to_vec()
        } else {
            Vec::new()
        };

        Ok(Message { headers, body })
    }

    /// Appends the wire form: headers, blank line, body.
    pub fn marshal(&self, out: &mut Vec<u8>) {
        let mut head = String::new();
        self.headers.marshal(&mut head);
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
    }
}

/// The start line of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLine {
    /// Request method
    pub method: Method,
    /// Request URI
    pub uri: Url,
    /// Protocol version, always `RTSP/1.0`
    pub version: String,
}

/// A parsed RTSP request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Start line
    pub line: RequestLine,
    /// Headers and body
    pub message: Message,
}

impl Request {
    /// A request with empty headers and body.
    pub fn new(method: Method, uri: Url) -> Self {
        Request {
            line: RequestLine {
                method,
                uri,
                version: RTSP_VERSION.to_string(),
            },
            message: Message::default(),
        }
    }

    /// Parses the request line and header section of a request.
    ///
    /// The body, if any, is attached by the caller once `Content-Length`
    /// bytes have been read from the connection.
    pub fn parse(s: &str) -> Result<Request> {
        let line_end = s
            .find("\r\n")
            .ok_or_else(|| PicastError::Parser("missing request line terminator".into()))?;
        let header_start = line_end + 2;

        let parts: Vec<&str> = s[..line_end].splitn(3, ' ').collect();
        if parts.len() != 3 {
            return Err(PicastError::Parser("malformed request line".into()));
        }

        let method = Method::from_str(parts[0])?;
        let uri = Url::parse(parts[1])
            .map_err(|e| PicastError::Parser(format!("bad request uri: {e}")))?;
        if parts[2] != RTSP_VERSION {
            return Err(PicastError::Parser(format!(
                "unsupported version: {}",
                parts[2]
            )));
        }

        let mut request = Request::new(method, uri);
        if header_start < s.len() {
            request.message = Message::parse(&s[header_start..])?;
        }

        Ok(request)
    }

    /// Serializes the request to wire form.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                self.line.method, self.line.uri, self.line.version
            )
            .as_bytes(),
        );
        self.message.marshal(&mut out);
        out
    }

    /// The raw `CSeq` header value, if present.
    pub fn cseq(&self) -> Option<String> {
        self.message.headers.value_of(names::CSEQ)
    }
}

/// The start line of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseLine {
    /// Protocol version, always `RTSP/1.0`
    pub version: String,
    /// Response status
    pub status: Status,
}

/// An RTSP response under construction or parsed off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Start line
    pub line: ResponseLine,
    /// Headers and body
    pub message: Message,
}

impl Response {
    /// A response with the given status and no headers or body.
    pub fn new(status: Status) -> Self {
        Response {
            line: ResponseLine {
                version: RTSP_VERSION.to_string(),
                status,
            },
            message: Message::default(),
        }
    }

    /// Current response status.
    pub fn status(&self) -> Status {
        self.line.status
    }

    /// Replaces the response status.
    pub fn set_status(&mut self, status: Status) {
        self.line.status = status;
    }

    /// Replaces the response body.
    pub fn set_body(&mut self, body: &[u8]) {
        self.body_mut().clear();
        self.body_mut().extend_from_slice(body);
    }

    /// Sets an error status and carries the error text as the body.
    pub fn set_error(&mut self, status: Status, err: &PicastError) {
        self.set_status(status);
        self.set_body(err.to_string().as_bytes());
    }

    fn body_mut(&mut self) -> &mut Vec<u8> {
        &mut self.message.body
    }

    /// Serializes the response to wire form.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                self.line.version,
                self.line.status.code(),
                self.line.status.reason_phrase()
            )
            .as_bytes(),
        );
        self.message.marshal(&mut out);
        out
    }

    /// Parses a complete response, body included.
    pub fn parse(s: &str) -> Result<Response> {
        let line_end = s
            .find("\r\n")
            .ok_or_else(|| PicastError::Parser("missing response line terminator".into()))?;

        let parts: Vec<&str> = s[..line_end].splitn(3, ' ').collect();
        if parts.len() < 2 || parts[0] != RTSP_VERSION {
            return Err(PicastError::Parser("malformed response line".into()));
        }

        let code: u16 = parts[1].parse()?;
        let status = Status::from_code(code)
            .ok_or_else(|| PicastError::Parser(format!("unknown status code: {code}")))?;

        let mut response = Response::new(status);
        let header_start = line_end + 2;
        if header_start < s.len() {
            response.message = Message::parse(&s[header_start..])?;
        }

        Ok(response)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line.status)
    }
}
