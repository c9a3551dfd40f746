//! Mapping a fully-read response into the three result shapes.
//!
//! Each mapper merges headers, decodes the body for its shape, then applies
//! the opt-in error-status check. A JSON body that fails to parse is reported
//! before the status check.

use std::collections::HashMap;

use http::header::{HeaderMap, CONTENT_TYPE};

use crate::error::{Result, WebError};
use crate::http::{is_content_header, RawResponse};
use crate::types::{size_in_megabytes, HttpByteResponse, HttpResponse, RestResponse};

/// Content headers first, then message headers override. Repeated values
/// are joined with `;`.
pub fn merge_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let (content, message): (Vec<_>, Vec<_>) = headers
        .keys()
        .partition(|name| is_content_header(name.as_str()));

    let mut merged = HashMap::with_capacity(headers.keys_len());
    for name in content.into_iter().chain(message) {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(";");
        merged.insert(name.as_str().to_string(), joined);
    }
    merged
}

/// Decode the body with the charset of the response content type.
pub fn decode_text(response: &RawResponse) -> Result<String> {
    let declared = response
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .and_then(|media_type| media_type.get_param(mime::CHARSET).map(|c| c.to_string()));

    let encoding = match declared {
        None => encoding_rs::UTF_8,
        Some(charset) => encoding_rs::Encoding::for_label(charset.as_bytes())
            .ok_or(WebError::UnsupportedCharset { charset })?,
    };
    let (text, _, _) = encoding.decode(&response.body);
    Ok(text.into_owned())
}

fn is_success(status: u16) -> bool {
    (200..=299).contains(&status)
}

fn check_status(response: &RawResponse, throw_on_error: bool, body: Option<&str>) -> Result<()> {
    if throw_on_error && !is_success(response.status) {
        return Err(WebError::ErrorResponse {
            url: response.url.clone(),
            status: response.status,
            body: body.map(str::to_string),
        });
    }
    Ok(())
}

pub fn map_text(response: RawResponse, throw_on_error: bool) -> Result<HttpResponse> {
    let body = decode_text(&response)?;
    check_status(&response, throw_on_error, Some(&body))?;
    Ok(HttpResponse {
        headers: merge_headers(&response.headers),
        status_code: response.status,
        body,
    })
}

pub fn map_json(response: RawResponse, throw_on_error: bool) -> Result<RestResponse> {
    let raw = decode_text(&response)?;
    let body = parse_json(&raw)?;
    check_status(&response, throw_on_error, Some(&raw))?;
    Ok(RestResponse {
        headers: merge_headers(&response.headers),
        status_code: response.status,
        body,
    })
}

pub fn map_bytes(response: RawResponse, throw_on_error: bool) -> Result<HttpByteResponse> {
    check_status(&response, throw_on_error, None)?;
    let content_type = response
        .headers
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    Ok(HttpByteResponse {
        body_size_in_mega_bytes: size_in_megabytes(response.body.len()),
        body_bytes: response.body.to_vec(),
        content_type,
        headers: merge_headers(&response.headers),
        status_code: response.status,
    })
}

/// Blank text becomes the JSON string `""`.
pub fn parse_json(raw: &str) -> Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::String(String::new()));
    }
    serde_json::from_str(raw).map_err(|source| WebError::JsonParse {
        raw: raw.to_string(),
        source,
    })
}
