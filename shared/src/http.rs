//! HTTP helpers for Lambda functions.
//!
//! Every response carries a permissive cross-origin policy because the
//! booking app is served from a different origin than API Gateway.

use lambda_http::http::response::Builder;
use lambda_http::{Body, Response};
use serde::Serialize;

use crate::Error;

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// Success with no payload: `{"success":true}`.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Response tagged with the name of the function that produced it.
#[derive(Debug, Serialize)]
pub struct FunctionResponse<T> {
    pub function: &'static str,
    pub data: T,
}

impl<T> FunctionResponse<T> {
    pub fn new(function: &'static str, data: T) -> Self {
        Self { function, data }
    }
}

fn with_cors(builder: Builder) -> Builder {
    builder
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "GET, POST, OPTIONS")
        .header("access-control-allow-headers", "*")
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, lambda_http::Error> {
    let response = with_cors(Response::builder())
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))
        .map_err(Box::new)?;
    Ok(response)
}

/// Create an error response with the given status code and message.
pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, lambda_http::Error> {
    json_response(status, &ApiResponse::<()>::error(message))
}

/// Map a library error onto its HTTP response.
pub fn error_to_response(error: &Error) -> Result<Response<Body>, lambda_http::Error> {
    error_response(error.status_code(), error.to_string())
}

/// Answer a CORS preflight request.
pub fn preflight_response() -> Result<Response<Body>, lambda_http::Error> {
    let response = with_cors(Response::builder())
        .status(204)
        .body(Body::Empty)
        .map_err(Box::new)?;
    Ok(response)
}

/// Strip the API Gateway stage prefix from a request path.
pub fn route_path(raw_path: &str) -> &str {
    let path = raw_path.strip_prefix("/api").unwrap_or(raw_path);
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}
