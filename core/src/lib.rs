//! HTTP(S) request task for workflow engines.
//!
//! # Overview
//! Issues one outbound request per call with the method, headers, body,
//! authentication, client certificate, timeout and redirect behaviour the
//! caller's `Options` describe, and returns the status code, merged headers
//! and the body as text, bytes or parsed JSON. Retry, scheduling and log
//! sinks belong to the hosting engine.
//!
//! # Design
//! - The call is split into plain-data stages: `assemble` turns an `Input`
//!   into an `HttpRequest`, `dispatch` performs the single network round-trip
//!   and yields a `RawResponse`, and the `response` mappers shape the result.
//!   Only `dispatch` touches the network.
//! - Clients are built once per distinct client-shaping configuration and
//!   kept in a `ClientCache` owned by a `WebTask`. The free functions share
//!   one process-wide task; tests build isolated tasks instead.
//! - Certificates come from a `CertificateStore` and clients from a
//!   `ClientFactory`, both injectable.
//! - Cancellation is a `tokio_util` `CancellationToken` checked before the
//!   send and raced against both the send and the body read.

pub mod assemble;
pub mod builder;
pub mod cache;
pub mod certificates;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod response;
pub mod sigv4;
pub mod task;
pub mod types;

pub use builder::{Client, ClientConfig, ClientFactory, Credential, ReqwestFactory};
pub use cache::ClientCache;
pub use certificates::{Certificate, CertificateStore, DirectoryStore};
pub use error::{Result, WebError};
pub use task::{
    clear_client_cache, http_request, http_request_bytes, http_send_and_receive_bytes,
    http_send_bytes, rest_request, WebTask,
};
pub use tokio_util::sync::CancellationToken;
pub use types::{
    Authentication, AwsCredentials, ByteInput, CertificateSource, Header, HttpByteResponse,
    HttpResponse, Input, Method, Options, RestResponse, SendMethod,
};
