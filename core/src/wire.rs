//! Transport-level request and response values.
//!
//! These are what a [`Transport`](crate::environment::Transport) sends and
//! receives. They carry no pipeline state; the request lifecycle builds a
//! [`WireRequest`] during `prepare` and turns a [`WireResponse`] into commands.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// HTTP method used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Parameters in the query string
    Get,
    /// Parameters in the body
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// One file attached to a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name the file is sent under
    pub field: String,
    /// Client-side file name
    pub file_name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WireBody {
    /// No body (GET requests)
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with text fields and files
    Multipart {
        /// Text fields
        fields: Vec<(String, String)>,
        /// Attached files
        files: Vec<FilePart>,
    },
}

/// A fully encoded request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// URI actually sent (includes the query string for GET)
    pub uri: String,
    /// Request headers in send order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: WireBody,
}

impl WireRequest {
    /// Look up a header value (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Look up an encoded parameter, wherever the encoding put it.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        match &self.body {
            WireBody::Form(fields) | WireBody::Multipart { fields, .. } => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone()),
            WireBody::Empty => {
                let (_, query) = self.uri.split_once('?')?;
                query.split('&').find_map(|pair| {
                    let (key, value) = pair.split_once('=')?;
                    (key == name).then(|| percent_decode(value))
                })
            },
        }
    }
}

/// A response as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WireResponse {
    /// HTTP status code (0 for non-HTTP transports that report success)
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Raw body text
    pub body: String,
}

impl WireResponse {
    /// A `200 OK` response with the given body.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.into(),
        }
    }

    /// A response with the given status and an empty body.
    #[must_use]
    pub const fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Classify the status code.
    #[must_use]
    pub const fn class(&self) -> StatusClass {
        StatusClass::of(self.status)
    }
}

/// The three status buckets the lifecycle reacts to, plus the permissive rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 0 or 200: process the payload
    Success,
    /// 301, 302, 307: navigate to the `location` header
    Redirect,
    /// 400-403, 404, 500-503: fail and complete
    Error,
    /// Anything else: no special handling
    Other,
}

impl StatusClass {
    /// Bucket a status code.
    #[must_use]
    pub const fn of(status: u16) -> Self {
        match status {
            0 | 200 => Self::Success,
            301 | 302 | 307 => Self::Redirect,
            400..=404 | 500..=503 => Self::Error,
            _ => Self::Other,
        }
    }
}

/// Errors reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established or was dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,

    /// The exchange broke the protocol (malformed response, bad request build)
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Percent-encode a form component (`application/x-www-form-urlencoded`).
#[must_use]
pub fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                encoded.push(char::from(byte));
            },
            b' ' => encoded.push('+'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Reverse of [`percent_encode`]. Malformed escapes are kept literally.
#[must_use]
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' if index + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[index + 1..=index + 2]).ok();
                match hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                    Some(byte) => {
                        decoded.push(byte);
                        index += 2;
                    },
                    None => decoded.push(b'%'),
                }
            },
            byte => decoded.push(byte),
        }
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Encode pairs as `key=value&key=value`.
#[must_use]
pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
