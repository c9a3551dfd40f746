//! Error types for the web request task.
//!
//! # Design
//! Configuration and certificate problems are raised before any network
//! traffic. Cancellation gets its own variant so callers can tell "the
//! workflow asked us to stop" apart from "the transport gave up", which lands
//! in `Transport` with the underlying `reqwest` error attached. Error-status
//! responses are only an error when the caller opted in.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the task entry points.
#[derive(Debug, Error)]
pub enum WebError {
    /// Options or input are malformed (bad Windows username, unknown
    /// certificate source, zero timeout, undecodable record).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No certificate in the personal store matches the thumbprint.
    #[error("Certificate with thumbprint: '{thumbprint}' not found in current user cert store.")]
    CertificateNotFound { thumbprint: String },

    /// Certificate material could not be decoded or used.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// A certificate file could not be read.
    #[error("failed to read certificate file {}: {source}", .path.display())]
    CertificateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request URL is not a valid absolute URL.
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A declared charset has no known encoding.
    #[error("unsupported charset '{charset}'")]
    UnsupportedCharset { charset: String },

    /// The HTTP client could not be constructed from the options.
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The send or body read was aborted by something other than the
    /// caller's cancellation, most often the client timeout.
    #[error("request to '{url}' timed out or failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The caller's cancellation signal fired.
    #[error("request was cancelled")]
    Cancelled,

    /// Non-2xx status with `throw_exception_on_error_response` set.
    #[error("Request to '{url}' failed with status code {status}.{}", format_body(.body))]
    ErrorResponse {
        url: String,
        status: u16,
        body: Option<String>,
    },

    /// A non-empty response body is not JSON.
    #[error("Unable to read response message as json: {raw}")]
    JsonParse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

fn format_body(body: &Option<String>) -> String {
    match body {
        Some(body) => format!(" Response body: {body}"),
        None => String::new(),
    }
}

impl WebError {
    /// True when the transport reported its timeout elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WebError::Transport { source, .. } if source.is_timeout())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WebError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, WebError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_message_embeds_body() {
        let err = WebError::ErrorResponse {
            url: "http://localhost/endpoint".to_string(),
            status: 500,
            body: Some("'FooBar'".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Request to 'http://localhost/endpoint' failed with status code 500. Response body: 'FooBar'"
        );
    }

    #[test]
    fn error_response_without_body() {
        let err = WebError::ErrorResponse {
            url: "http://localhost/bin".to_string(),
            status: 404,
            body: None,
        };
        assert_eq!(
            err.to_string(),
            "Request to 'http://localhost/bin' failed with status code 404."
        );
    }

    #[test]
    fn json_parse_message_is_raw_text() {
        let source = serde_json::from_str::<serde_json::Value>("<fail>").unwrap_err();
        let err = WebError::JsonParse {
            raw: "<fail>failbar<fail>".to_string(),
            source,
        };
        assert_eq!(
            err.to_string(),
            "Unable to read response message as json: <fail>failbar<fail>"
        );
    }

    #[test]
    fn cancelled_is_not_a_timeout() {
        assert!(WebError::Cancelled.is_cancelled());
        assert!(!WebError::Cancelled.is_timeout());
    }
}
