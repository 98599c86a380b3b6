//! HTTP-facing errors.

use std::net::IpAddr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
///
/// - `ClientResolution` → 500
/// - `RateLimited` → 429
/// - `InvalidQuery` → 400
/// - `Internal` → 500
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request carried no usable client address.
    #[error("client address could not be resolved")]
    ClientResolution,

    /// The client has no tokens left.
    #[error("rate limit exceeded for client {0}")]
    RateLimited(IpAddr),

    /// The query string could not be decoded.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ClientResolution | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::ClientResolution => "CLIENT_UNRESOLVED",
            ApiError::RateLimited(_) => "RATE_LIMITED",
            ApiError::InvalidQuery(_) => "INVALID_QUERY",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::ClientResolution.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::RateLimited("10.0.0.1".parse().unwrap()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::InvalidQuery("category".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_message_names_client() {
        let err = ApiError::RateLimited("10.0.0.1".parse().unwrap());
        assert_eq!(err.to_string(), "rate limit exceeded for client 10.0.0.1");
    }
}
