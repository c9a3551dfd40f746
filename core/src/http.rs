//! Plain-data request and response values.
//!
//! # Design
//! The assembler produces an `HttpRequest`, the dispatcher turns it into a
//! wire request and hands back a fully-read `RawResponse`, and the mappers
//! consume that. Keeping both ends as plain data means assembly and response
//! mapping are tested without a socket.
//!
//! Request headers keep the caller's casing. Headers that describe the body
//! (`Content-Type`, `Content-Length`, ...) are held apart in
//! `content_headers` and only exist when there is a body to describe.

use bytes::Bytes;
use http::HeaderMap;
use url::Url;

use crate::types::Method;

/// Header names that belong to the body rather than the message.
pub const CONTENT_HEADERS: &[&str] = &[
    "allow",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-length",
    "content-location",
    "content-md5",
    "content-range",
    "content-type",
    "expires",
    "last-modified",
];

/// Case-insensitive membership in [`CONTENT_HEADERS`].
pub fn is_content_header(name: &str) -> bool {
    CONTENT_HEADERS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// An outgoing request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Names keep the caller's casing here; HTTP/1 sends them lowercased.
    pub headers: Vec<(String, String)>,
    pub content_headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Case-insensitive lookup across message and content headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .chain(self.content_headers.iter())
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any header with the same name (ignoring case).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}

/// A response whose body has been read to the end.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}
