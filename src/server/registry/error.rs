use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Upstream answered with a non-success status
    #[error("Registry returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// Connection failure or timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be read or decoded
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("manifest digest missing")]
    DigestMissing,

    #[error("manifest list empty")]
    ManifestListEmpty,
}

/// Coarse classification of upstream failures used at the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    MethodNotAllowed,
    DigestMissing,
    Unavailable,
}

impl RegistryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RegistryError::Status { status, .. } if *status == StatusCode::NOT_FOUND => {
                FailureKind::NotFound
            }
            RegistryError::Status { status, .. } if *status == StatusCode::METHOD_NOT_ALLOWED => {
                FailureKind::MethodNotAllowed
            }
            RegistryError::DigestMissing => FailureKind::DigestMissing,
            _ => FailureKind::Unavailable,
        }
    }

    /// Build a status error from an upstream response, keeping its body as the message
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = body.trim();
        let message = if message.is_empty() {
            status.to_string()
        } else {
            message.to_string()
        };
        RegistryError::Status { status, message }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            RegistryError::InvalidResponse(err.to_string())
        } else {
            RegistryError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::InvalidResponse(err.to_string())
    }
}
