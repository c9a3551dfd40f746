//! Sending an assembled request and reading the full response.
//!
//! # Design
//! Both the send and the body read race against the caller's cancellation
//! token, so cancellation wins at either stage and always surfaces as
//! `WebError::Cancelled`. Any other transport abort, including the client
//! timeout, becomes `WebError::Transport` carrying the `reqwest` error.

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::builder::Client;
use crate::error::{Result, WebError};
use crate::http::{HttpRequest, RawResponse};

/// Send `request` through `client` and read the body to the end.
pub async fn dispatch(
    client: &Client,
    request: HttpRequest,
    strip_response_charset: bool,
    cancel: &CancellationToken,
) -> Result<RawResponse> {
    if cancel.is_cancelled() {
        return Err(WebError::Cancelled);
    }

    let url = request.url.to_string();
    let transport = |source: reqwest::Error| WebError::Transport {
        url: url.clone(),
        source,
    };

    debug!(method = request.method.as_str(), url = %url, "dispatching request");
    let wire = to_wire(client, request).build().map_err(transport)?;

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(WebError::Cancelled),
        sent = client.inner().execute(wire) => sent.map_err(transport)?,
    };

    let status = response.status().as_u16();
    let mut headers = response.headers().clone();
    debug!(status, url = %url, "response received");

    let body = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(WebError::Cancelled),
        read = response.bytes() => read.map_err(transport)?,
    };

    if strip_response_charset {
        strip_charset(&mut headers);
    }

    Ok(RawResponse {
        url,
        status,
        headers,
        body,
    })
}

fn to_wire(client: &Client, request: HttpRequest) -> reqwest::RequestBuilder {
    let mut headers = HeaderMap::new();
    let content = if request.body.is_some() {
        request.content_headers.iter()
    } else {
        [].iter()
    };
    for (name, value) in request.headers.iter().chain(content) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        if name == CONTENT_LENGTH {
            trace!("leaving content-length to the transport");
            continue;
        }
        headers.insert(name, value);
    }

    let mut builder = client
        .inner()
        .request(request.method.into(), request.url)
        .headers(headers);
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    builder
}

/// Remove the `charset` parameter from the response content type.
pub fn strip_charset(headers: &mut HeaderMap) {
    let Some(media_type) = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
    else {
        return;
    };
    if media_type.get_param(mime::CHARSET).is_none() {
        return;
    }

    let mut stripped = media_type.essence_str().to_string();
    for (name, value) in media_type.params() {
        if !name.as_str().eq_ignore_ascii_case("charset") {
            stripped.push_str(&format!("; {name}={value}"));
        }
    }
    if let Ok(value) = HeaderValue::from_str(&stripped) {
        debug!(content_type = %stripped, "stripped response charset");
        headers.insert(CONTENT_TYPE, value);
    }
}
