//! AWS Signature Version 4 signing of assembled requests.
//!
//! Signs `host` and every `x-amz-*` header with AWS4-HMAC-SHA256 and writes
//! the `authorization` header. Path segments are encoded a second time, as
//! every service except S3 expects.

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use ring::{digest, hmac};

use crate::error::{Result, WebError};
use crate::http::HttpRequest;
use crate::types::AwsCredentials;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// RFC 3986 unreserved characters pass through; everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Sign `request` in place as of `now`.
pub fn sign(request: &mut HttpRequest, credentials: &AwsCredentials, now: DateTime<Utc>) -> Result<()> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    request.set_header("x-amz-date", amz_date.clone());
    if let Some(token) = credentials.session_token.as_deref().filter(|t| !t.is_empty()) {
        request.set_header("x-amz-security-token", token);
    }

    let host = host_header(request)?;
    let mut signed: Vec<(String, String)> = request
        .headers
        .iter()
        .filter(|(name, _)| name.to_ascii_lowercase().starts_with("x-amz-"))
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    signed.push(("host".to_string(), host));
    signed.sort();

    let canonical_headers: String = signed.iter().map(|(n, v)| format!("{n}:{v}\n")).collect();
    let signed_headers = signed
        .iter()
        .map(|(n, _)| n.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let payload_hash = sha256_hex(request.body.as_deref().unwrap_or_default());

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.as_str(),
        canonical_uri(request),
        canonical_query(request),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let scope = format!(
        "{date}/{}/{}/aws4_request",
        credentials.region, credentials.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(credentials, &date);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    request.set_header(
        "authorization",
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
    );
    Ok(())
}

fn host_header(request: &HttpRequest) -> Result<String> {
    let host = request.url.host_str().ok_or_else(|| {
        WebError::Configuration(format!("cannot sign a request without a host: {}", request.url))
    })?;
    Ok(match request.url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn canonical_uri(request: &HttpRequest) -> String {
    let path = request.url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, UNRESERVED).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(request: &HttpRequest) -> String {
    let mut pairs: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k, UNRESERVED).to_string(),
                utf8_percent_encode(&v, UNRESERVED).to_string(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn signing_key(credentials: &AwsCredentials, date: &str) -> Vec<u8> {
    let secret = format!("AWS4{}", credentials.secret_access_key);
    let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, credentials.region.as_bytes());
    let k_service = hmac_sha256(&k_region, credentials.service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}
