//! Check the assembler and response mappers against JSON vectors stored in
//! `test-vectors/`.
//!
//! Assembly vectors describe an `Input` record and the exact request it must
//! produce. Response vectors describe a raw response and what each of the
//! three mappers returns for it.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use web_task_core::assemble::{assemble, Body};
use web_task_core::http::RawResponse;
use web_task_core::response::{map_bytes, map_json, map_text};
use web_task_core::Input;

const URL: &str = "http://localhost:9191/endpoint";

fn pairs(value: &serde_json::Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            (
                pair[0].as_str().unwrap().to_string(),
                pair[1].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[test]
fn assemble_test_vectors() {
    let raw = include_str!("../../test-vectors/assemble.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input: Input = serde_json::from_value(case["input"].clone()).unwrap();
        let expected = &case["expected"];

        let req = assemble(
            input.method,
            &input.url,
            &input.headers,
            Body::Text(input.message.as_deref()),
        )
        .unwrap();

        assert_eq!(req.url.as_str(), expected["url"].as_str().unwrap(), "{name}: url");
        assert_eq!(req.headers, pairs(&expected["headers"]), "{name}: headers");
        assert_eq!(
            req.content_headers,
            pairs(&expected["content_headers"]),
            "{name}: content headers"
        );

        let expected_body: Option<Vec<u8>> = serde_json::from_value(expected["body"].clone()).unwrap();
        assert_eq!(req.body.map(|b| b.to_vec()), expected_body, "{name}: body");
    }
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

fn raw_response(fixture: &serde_json::Value) -> RawResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(fixture["content_type"].as_str().unwrap()).unwrap(),
    );
    let body = match fixture.get("body_bytes") {
        Some(bytes) => serde_json::from_value::<Vec<u8>>(bytes.clone()).unwrap(),
        None => fixture["body"].as_str().unwrap().as_bytes().to_vec(),
    };
    RawResponse {
        url: URL.to_string(),
        status: fixture["status"].as_u64().unwrap() as u16,
        headers,
        body: Bytes::from(body),
    }
}

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/response.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let throw = case["throw"].as_bool().unwrap();
        let response = &case["response"];

        // Text
        match map_text(raw_response(response), throw) {
            Ok(mapped) => {
                assert_eq!(mapped.body, case["expected_text"].as_str().unwrap(), "{name}: text");
                assert_eq!(mapped.status_code as u64, response["status"].as_u64().unwrap(), "{name}: status");
                assert_eq!(
                    mapped.headers["content-type"],
                    response["content_type"].as_str().unwrap(),
                    "{name}: headers"
                );
            }
            Err(e) => assert_eq!(e.to_string(), case["expected_error"].as_str().unwrap(), "{name}: text error"),
        }

        // JSON
        match map_json(raw_response(response), throw) {
            Ok(mapped) => assert_eq!(mapped.body, case["expected_json"], "{name}: json"),
            Err(e) => {
                let expected = case
                    .get("expected_json_error")
                    .or_else(|| case.get("expected_error"))
                    .and_then(|v| v.as_str())
                    .unwrap();
                assert_eq!(e.to_string(), expected, "{name}: json error");
            }
        }

        // Bytes
        match map_bytes(raw_response(response), throw) {
            Ok(mapped) => {
                assert_eq!(
                    mapped.body_size_in_mega_bytes,
                    case["expected_size"].as_f64().unwrap(),
                    "{name}: size"
                );
                assert_eq!(
                    mapped.content_type.as_deref(),
                    response["content_type"].as_str(),
                    "{name}: content type"
                );
            }
            Err(e) => assert_eq!(
                e.to_string(),
                case["expected_bytes_error"].as_str().unwrap(),
                "{name}: bytes error"
            ),
        }
    }
}
