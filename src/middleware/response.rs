use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Wrapper for API responses that automatically adds the success envelope.
///
/// The payload sits under `key`: `data` for mutations and listings, the
/// resource's singular name (`joven`, `atencion`) for single-record reads.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub key: &'static str,
    pub data: T,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response under `data` with default 200 status
    pub fn success(data: T) -> Self {
        Self::keyed("data", data)
    }

    /// Create a successful API response under a custom envelope key
    pub fn keyed(key: &'static str, data: T) -> Self {
        Self {
            key,
            data,
            status_code: None, // Default to 200 OK
        }
    }

    /// Create an API response with custom status code
    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            key: "data",
            data,
            status_code: Some(status_code),
        }
    }

    /// Create a 201 Created response
    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "error": "Failed to serialize response data",
                        "code": "UPSTREAM_FAILURE"
                    })),
                )
                    .into_response();
            }
        };

        let mut envelope = serde_json::Map::new();
        envelope.insert("success".to_string(), json!(true));
        envelope.insert(self.key.to_string(), data_value);

        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

/// Give the timeout layer's bodiless 408 the error envelope
pub async fn timeout_envelope(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    tracing::warn!("request timed out");
    crate::error::ApiError::Timeout("The request took too long to complete".to_string()).into_response()
}
