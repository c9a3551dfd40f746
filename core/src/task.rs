//! The five request entry points.
//!
//! # Design
//! A `WebTask` owns a `ClientCache`; every entry point runs the same flow
//! (cancellation check, cached client, assembly, optional signing, dispatch)
//! and differs only in the body it sends and the mapper it applies. The free
//! functions at the bottom share one process-wide task so hosts that call
//! them repeatedly keep their pooled connections.

use std::sync::OnceLock;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::assemble::{assemble, Body};
use crate::cache::ClientCache;
use crate::dispatch::dispatch;
use crate::error::{Result, WebError};
use crate::http::RawResponse;
use crate::response::{map_bytes, map_json, map_text};
use crate::sigv4;
use crate::types::{
    Authentication, ByteInput, HttpByteResponse, HttpResponse, Input, Method, Options, RestResponse,
};

#[derive(Debug, Default)]
pub struct WebTask {
    cache: ClientCache,
}

impl WebTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit cache, e.g. one with a counting factory or a test store.
    pub fn with_cache(cache: ClientCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Send a text body and return the response as text.
    pub async fn http_request(
        &self,
        input: &Input,
        options: &Options,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let body = Body::Text(input.message.as_deref());
        let response = self
            .send(input.method, &input.url, &input.headers, body, false, options, cancel)
            .await?;
        map_text(response, options.throw_exception_on_error_response)
    }

    /// Send a text body and parse the response as JSON.
    pub async fn rest_request(
        &self,
        input: &Input,
        options: &Options,
        cancel: &CancellationToken,
    ) -> Result<RestResponse> {
        let body = Body::Text(input.message.as_deref());
        let response = self
            .send(input.method, &input.url, &input.headers, body, true, options, cancel)
            .await?;
        map_json(response, options.throw_exception_on_error_response)
    }

    /// Send a text body and return the raw response bytes.
    pub async fn http_request_bytes(
        &self,
        input: &Input,
        options: &Options,
        cancel: &CancellationToken,
    ) -> Result<HttpByteResponse> {
        let body = Body::Text(input.message.as_deref());
        let response = self
            .send(input.method, &input.url, &input.headers, body, false, options, cancel)
            .await?;
        map_bytes(response, options.throw_exception_on_error_response)
    }

    /// Send a byte body and return the response as text.
    pub async fn http_send_bytes(
        &self,
        input: &ByteInput,
        options: &Options,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let body = Body::Bytes(&input.content_bytes);
        let response = self
            .send(input.method.into(), &input.url, &input.headers, body, false, options, cancel)
            .await?;
        map_text(response, options.throw_exception_on_error_response)
    }

    /// Send a byte body and return the raw response bytes.
    pub async fn http_send_and_receive_bytes(
        &self,
        input: &ByteInput,
        options: &Options,
        cancel: &CancellationToken,
    ) -> Result<HttpByteResponse> {
        let body = Body::Bytes(&input.content_bytes);
        let response = self
            .send(input.method.into(), &input.url, &input.headers, body, false, options, cancel)
            .await?;
        map_bytes(response, options.throw_exception_on_error_response)
    }

    #[allow(clippy::too_many_arguments)]
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[crate::types::Header],
        body: Body<'_>,
        accept_json: bool,
        options: &Options,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        if cancel.is_cancelled() {
            return Err(WebError::Cancelled);
        }

        let client = self.cache.client(options).await?;
        let mut request = assemble(method, url, headers, body)?;

        if accept_json && request.header("accept").is_none() {
            request.set_header("Accept", "application/json");
        }
        if let Authentication::AwsSigV4(credentials) = &options.authentication {
            sigv4::sign(&mut request, credentials, Utc::now())?;
        }

        dispatch(
            &client,
            request,
            options.allow_invalid_response_content_type_charset,
            cancel,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Process-wide task
// ---------------------------------------------------------------------------

static DEFAULT_TASK: OnceLock<WebTask> = OnceLock::new();

/// The shared task behind the free-function entry points.
pub fn default_task() -> &'static WebTask {
    DEFAULT_TASK.get_or_init(WebTask::new)
}

/// Drop every client cached by the shared task.
pub fn clear_client_cache() {
    default_task().cache().clear();
}

pub async fn http_request(input: &Input, options: &Options, cancel: &CancellationToken) -> Result<HttpResponse> {
    default_task().http_request(input, options, cancel).await
}

pub async fn rest_request(input: &Input, options: &Options, cancel: &CancellationToken) -> Result<RestResponse> {
    default_task().rest_request(input, options, cancel).await
}

pub async fn http_request_bytes(
    input: &Input,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<HttpByteResponse> {
    default_task().http_request_bytes(input, options, cancel).await
}

pub async fn http_send_bytes(
    input: &ByteInput,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<HttpResponse> {
    default_task().http_send_bytes(input, options, cancel).await
}

pub async fn http_send_and_receive_bytes(
    input: &ByteInput,
    options: &Options,
    cancel: &CancellationToken,
) -> Result<HttpByteResponse> {
    default_task().http_send_and_receive_bytes(input, options, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::builder::ReqwestFactory;
    use crate::certificates::DirectoryStore;
    use crate::types::CertificateSource;

    fn isolated() -> WebTask {
        WebTask::with_cache(ClientCache::new(
            Arc::new(ReqwestFactory),
            Arc::new(DirectoryStore::new("/nonexistent")),
        ))
    }

    #[tokio::test]
    async fn cancelled_before_start_builds_nothing() {
        let task = isolated();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let input = Input::new(Method::Get, "http://127.0.0.1:9/");
        let err = task
            .http_request(&input, &Options::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(task.cache().is_empty());
    }

    #[tokio::test]
    async fn missing_certificate_fails_before_sending() {
        let task = isolated();
        let options = Options {
            authentication: Authentication::ClientCertificate {
                source: CertificateSource::Store {
                    thumbprint: "ab cd".to_string(),
                },
                load_entire_chain: false,
            },
            ..Options::default()
        };
        let input = Input::new(Method::Get, "http://127.0.0.1:9/");
        let err = task
            .http_request(&input, &options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Certificate with thumbprint: 'ABCD' not found in current user cert store."
        );
    }

    #[tokio::test]
    async fn malformed_windows_username_is_a_configuration_error() {
        let task = isolated();
        let options = Options {
            authentication: Authentication::WindowsAuthentication {
                username: "nodomain".to_string(),
                password: "pw".to_string(),
            },
            ..Options::default()
        };
        let input = ByteInput::new(crate::types::SendMethod::Post, "http://127.0.0.1:9/", vec![1]);
        let err = task
            .http_send_bytes(&input, &options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WebError::Configuration(_)));
        assert!(err.to_string().contains("nodomain"));
    }

    #[test]
    fn default_task_is_shared() {
        assert!(std::ptr::eq(default_task(), default_task()));
        clear_client_cache();
        assert!(default_task().cache().is_empty());
    }
}
