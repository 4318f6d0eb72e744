//! HTTP response building helpers
//!
//! Every API response uses the same envelope:
//! `{ "success": bool, "message"?: string, "data"?: T, "error"?: CODE }`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::types::AccoladeError;

pub type FullBody = Full<Bytes>;

/// Response envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// 200 with `data`
pub fn ok<T: Serialize>(data: T) -> Response<FullBody> {
    with_message(StatusCode::OK, None, data)
}

/// 201 with `data`
pub fn created<T: Serialize>(data: T) -> Response<FullBody> {
    with_message(StatusCode::CREATED, None, data)
}

/// Success envelope carrying a human-readable message
pub fn with_message<T: Serialize>(
    status: StatusCode,
    message: Option<&str>,
    data: T,
) -> Response<FullBody> {
    json_response(
        status,
        &Envelope {
            success: true,
            message: message.map(str::to_string),
            data: Some(data),
            error: None,
        },
    )
}

/// Convert an error to its HTTP status and envelope
pub fn error_response(err: &AccoladeError) -> Response<FullBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "Request failed: {}", err);
    }
    json_response(
        status,
        &Envelope::<()> {
            success: false,
            message: Some(err.to_string()),
            data: None,
            error: Some(err.code()),
        },
    )
}

/// 404 for unknown routes
pub fn not_found_response(path: &str) -> Response<FullBody> {
    error_response(&AccoladeError::NotFound(format!("no route for {}", path)))
}

/// CORS preflight response
pub fn preflight_response() -> Response<FullBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "Authorization, Content-Type",
        )
        .header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET, POST, PUT, DELETE, OPTIONS",
        )
        .body(Full::new(Bytes::new()))
        .unwrap()
}
