//! HTTP error mapping
//!
//! Every failure that surfaces before streaming begins is reduced to a plain
//! status code here. Failures after the first SSE byte never pass through
//! this module; the orchestrator terminates the stream itself.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use shopilot_core::ShopilotError;

/// Error type for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Service(#[from] ShopilotError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Service(err) => {
                err.log();
                match err {
                    ShopilotError::Authentication { .. } => StatusCode::UNAUTHORIZED,
                    ShopilotError::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
                    ShopilotError::Network { .. } | ShopilotError::UpstreamStream { .. } => {
                        StatusCode::BAD_GATEWAY
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
            WebError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopilot_core::ErrorContext;

    #[test]
    fn authentication_failures_map_to_401() {
        let err = WebError::from(ShopilotError::Authentication {
            message: "signature verification failed".to_string(),
            context: ErrorContext::new("test"),
        });
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn malformed_requests_map_to_400() {
        let err = WebError::from(ShopilotError::MalformedRequest {
            message: "bad json".to_string(),
            source: None,
            context: ErrorContext::new("test"),
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn retrieval_failures_map_to_500() {
        let err = WebError::from(ShopilotError::Retrieval {
            message: "embeddings unavailable".to_string(),
            source: None,
            context: ErrorContext::new("test"),
        });
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
