//! Caller-supplied records and the three result shapes.
//!
//! # Design
//! The hosting workflow engine hands these over as typed records, usually
//! decoded from JSON, so every input type derives `Deserialize` with the
//! defaults a workflow author would expect. `Authentication` is a tagged enum
//! carrying only the fields its scheme needs; a Basic credential cannot carry
//! a certificate thumbprint and vice versa.
//!
//! `Options` is also the client-cache key source (see `cache::ClientKey`), so
//! it derives structural `Eq`/`Hash` rather than relying on identity.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Result, WebError};

/// HTTP method for a text-bodied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
}

impl Method {
    /// Only these methods transmit a body; the rest drop any supplied message.
    pub fn carries_body(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
            Method::Head => http::Method::HEAD,
            Method::Options => http::Method::OPTIONS,
            Method::Connect => http::Method::CONNECT,
        }
    }
}

/// The body-bearing subset of [`Method`] accepted by the byte entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SendMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl From<SendMethod> for Method {
    fn from(method: SendMethod) -> Self {
        match method {
            SendMethod::Post => Method::Post,
            SendMethod::Put => Method::Put,
            SendMethod::Patch => Method::Patch,
            SendMethod::Delete => Method::Delete,
        }
    }
}

/// A single caller-supplied header. Names need not be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Per-call request description with a text body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub method: Method,
    pub url: String,
    /// Sent only when `method` carries a body.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl Input {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            message: None,
            headers: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json, "input")
    }
}

/// Per-call request description with a binary body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteInput {
    pub method: SendMethod,
    pub url: String,
    #[serde(default)]
    pub content_bytes: Vec<u8>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl ByteInput {
    pub fn new(method: SendMethod, url: impl Into<String>, content_bytes: Vec<u8>) -> Self {
        Self {
            method,
            url: url.into(),
            content_bytes,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json, "byte input")
    }
}

/// Where client certificates are loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CertificateSource {
    /// The current user's personal store, looked up by SHA-1 thumbprint.
    Store { thumbprint: String },
    /// A PEM bundle or DER certificate on disk.
    File {
        path: PathBuf,
        #[serde(default)]
        key_phrase: String,
    },
    /// A base64-encoded PEM bundle or DER certificate.
    String {
        base64: String,
        #[serde(default)]
        key_phrase: String,
    },
}

/// Authentication scheme and the fields that scheme needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Authentication {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    /// `username` must be `domain\name`.
    WindowsAuthentication {
        username: String,
        password: String,
    },
    WindowsIntegratedSecurity,
    OAuth {
        token: String,
    },
    ClientCertificate {
        source: CertificateSource,
        /// Store source only: include every element of the certificate chain.
        #[serde(default)]
        load_entire_chain: bool,
    },
    AwsSigV4(AwsCredentials),
}

/// Credentials for AWS Signature Version 4 request signing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_aws_service")]
    pub service: String,
    #[serde(default = "default_aws_region")]
    pub region: String,
}

fn default_aws_service() -> String {
    "execute-api".to_string()
}

fn default_aws_region() -> String {
    "eu-west-1".to_string()
}

/// Per-call configuration. Equal values share one cached client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub authentication: Authentication,
    pub connection_timeout_seconds: u64,
    /// When false, 3xx responses are returned to the caller as-is.
    pub follow_redirects: bool,
    /// Accept any server certificate. Insecure; never on by default.
    pub allow_invalid_certificate: bool,
    /// Drop the response charset before decoding, for servers that send a
    /// bogus one.
    pub allow_invalid_response_content_type_charset: bool,
    pub throw_exception_on_error_response: bool,
    pub automatic_cookie_handling: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            authentication: Authentication::None,
            connection_timeout_seconds: 30,
            follow_redirects: true,
            allow_invalid_certificate: false,
            allow_invalid_response_content_type_charset: false,
            throw_exception_on_error_response: false,
            automatic_cookie_handling: true,
        }
    }
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json, "options")
    }
}

fn from_json<T: DeserializeOwned>(json: &str, what: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| WebError::Configuration(format!("invalid {what}: {e}")))
}

/// Result of the text entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub body: String,
    pub headers: HashMap<String, String>,
    pub status_code: u16,
}

/// Result of the JSON entry point. Empty bodies map to `""`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestResponse {
    pub body: serde_json::Value,
    pub headers: HashMap<String, String>,
    pub status_code: u16,
}

/// Result of the byte-returning entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpByteResponse {
    pub body_bytes: Vec<u8>,
    /// `body_bytes.len()` in MiB, rounded to three decimals.
    pub body_size_in_mega_bytes: f64,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub status_code: u16,
}

/// Size of `len` bytes in MiB, rounded half-to-even at three decimals.
pub fn size_in_megabytes(len: usize) -> f64 {
    let mib = len as f64 / (1024.0 * 1024.0);
    (mib * 1000.0).round_ties_even() / 1000.0
}
