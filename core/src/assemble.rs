//! Request assembly: input records to a plain-data `HttpRequest`.
//!
//! # Design
//! Header names are collapsed case-insensitively (last occurrence wins) and
//! keep the casing the caller wrote. A valid `content-type` picks the charset
//! used to encode a text body. Each header is placed on the message if the
//! message accepts it, otherwise on the body, otherwise dropped with a
//! warning; a bad header never fails the call.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use tracing::{trace, warn};
use url::Url;

use crate::error::{Result, WebError};
use crate::http::{is_content_header, HttpRequest};
use crate::types::{Header, Method};

/// The body as supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub enum Body<'a> {
    Text(Option<&'a str>),
    Bytes(&'a [u8]),
}

/// Collapse headers case-insensitively, keeping first-seen order and the
/// last occurrence's name and value.
pub fn normalize_headers(headers: &[Header]) -> Vec<(String, String)> {
    let mut normalized: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for header in headers {
        match normalized
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&header.name))
        {
            Some(existing) => *existing = (header.name.clone(), header.value.clone()),
            None => normalized.push((header.name.clone(), header.value.clone())),
        }
    }
    normalized
}

/// The encoding named by a valid `content-type`, or UTF-8.
pub fn request_encoding(headers: &[(String, String)]) -> Result<&'static encoding_rs::Encoding> {
    let declared = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, value)| value.parse::<mime::Mime>().ok());
    let Some(media_type) = declared else {
        return Ok(encoding_rs::UTF_8);
    };
    match media_type.get_param(mime::CHARSET) {
        None => Ok(encoding_rs::UTF_8),
        Some(charset) => encoding_rs::Encoding::for_label(charset.as_str().as_bytes()).ok_or_else(|| {
            WebError::UnsupportedCharset {
                charset: charset.to_string(),
            }
        }),
    }
}

/// Build the outgoing request for `method` and `url`.
pub fn assemble(method: Method, url: &str, headers: &[Header], body: Body<'_>) -> Result<HttpRequest> {
    let trimmed = url.trim();
    let url = Url::parse(trimmed).map_err(|source| WebError::InvalidUrl {
        url: trimmed.to_string(),
        source,
    })?;

    let normalized = normalize_headers(headers);

    let body = if method.carries_body() {
        Some(match body {
            Body::Text(message) => {
                let encoding = request_encoding(&normalized)?;
                let (encoded, _, _) = encoding.encode(message.unwrap_or_default());
                Bytes::from(encoded.into_owned())
            }
            Body::Bytes(bytes) => Bytes::copy_from_slice(bytes),
        })
    } else {
        None
    };

    let mut request = HttpRequest {
        method,
        url,
        headers: Vec::new(),
        content_headers: Vec::new(),
        body,
    };

    for (name, value) in normalized {
        place_header(&mut request, name, value);
    }
    Ok(request)
}

fn place_header(request: &mut HttpRequest, name: String, value: String) {
    let valid = HeaderName::from_bytes(name.as_bytes()).is_ok() && HeaderValue::from_str(&value).is_ok();
    if valid && !is_content_header(&name) {
        request.headers.push((name, value));
    } else if valid && request.body.is_some() {
        trace!(header = %name, "placing header on content");
        request.content_headers.push((name, value));
    } else {
        warn!(header = %name, "could not add header");
    }
}
