//! OCM client errors

use thiserror::Error;

/// Errors that can occur when talking to the hub's Kubernetes API
#[derive(Debug, Error)]
pub enum OcmError {
    /// Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API server answered with something that is not a list
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A watch could not be established
    #[error("Watch failed: {0}")]
    Watch(String),
}

impl OcmError {
    /// Whether the error means the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            OcmError::NotFound(_) => true,
            OcmError::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}
