//! Dashboard server errors

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ocm_client::OcmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("OCM client error: {0}")]
    Client(#[from] OcmError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No OCM client is configured for this process
    #[error("Resource client unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl DashboardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::Client(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            DashboardError::Client(_) => StatusCode::BAD_GATEWAY,
            DashboardError::NotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Failure to write a frame to a stream sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The client's end of the stream is gone
    #[error("Stream client disconnected")]
    Closed,

    #[error("Encoding error: {0}")]
    Encode(#[from] axum::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DashboardError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DashboardError::Client(OcmError::NotFound("x".into())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DashboardError::Client(OcmError::Watch("x".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DashboardError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            DashboardError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
