//! Shared response and request helpers for the JSON API

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::types::BiotopError;

pub type FullBody = Full<Bytes>;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Largest JSON request body accepted
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Error body: `{ "error": ..., "code": ... }`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
        },
    )
}

/// Map a service error onto its status code and machine code
pub fn service_error_response(err: BiotopError) -> Response<FullBody> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(code = err.code(), "Request failed: {}", err);
    } else if matches!(err, BiotopError::Conflict(_) | BiotopError::Upstream(_)) {
        warn!(code = err.code(), "Request rejected: {}", err);
    }
    let code = err.code();
    error_response(status, &err.to_string(), Some(code))
}

/// CORS preflight response
pub fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    response
}

pub fn not_found_response(path: &str) -> Response<FullBody> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {}", path),
        Some("NOT_FOUND"),
    )
}

/// Read and decode a JSON request body
pub async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, BiotopError> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| BiotopError::BadRequest(format!("Failed to read body: {}", e)))?
        .to_bytes();
    parse_json(&body)
}

/// Fresh id for correlating a request with its log lines
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn with_request_id(mut response: Response<FullBody>, request_id: &str) -> Response<FullBody> {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, BiotopError> {
    if body.is_empty() {
        return Err(BiotopError::BadRequest("Request body is required".into()));
    }
    Ok(serde_json::from_slice(body)?)
}
