use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::server::registry::deletion::DeletionError;
use crate::server::registry::error::{FailureKind, RegistryError};

/// Server error type that provides automatic logging and clean error responses.
///
/// This type:
/// - Logs 5xx errors with their source chain when converted to a response
/// - Allows attaching structured context (repo, tag, user)
/// - Returns `{"error": message}` to clients, never the internal cause
///
/// # Example
///
/// ```rust,ignore
/// use crate::server::error::ServerError;
///
/// let err = ServerError::forbidden("namespace not allowed")
///     .with_context("namespace", &namespace);
///
/// let tags = state.registry_client.fetch_tags(&repo).await
///     .map_err(|e| ServerError::from(e).with_context("repo", &repo))?;
/// ```
#[derive(Debug)]
pub struct ServerError {
    /// HTTP status code to return
    pub status: StatusCode,
    /// User-facing error message (returned in response)
    pub message: String,
    /// Internal error with full chain (logged but not exposed to client)
    pub source: Option<anyhow::Error>,
    /// Structured context for logging (key-value pairs)
    pub context: Vec<(&'static str, String)>,
}

impl ServerError {
    /// Create a new error with just status and message (no source error)
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
            context: Vec::new(),
        }
    }

    /// Create an error from an anyhow::Error with full error chain
    pub fn from_anyhow(
        source: anyhow::Error,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            source: Some(source),
            context: Vec::new(),
        }
    }

    /// Add a context field for logging (chainable)
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 401 Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// Create a 403 Forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Create a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Create a 405 Method Not Allowed error
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    /// Create a 502 Bad Gateway error from an upstream failure
    pub fn bad_gateway(source: anyhow::Error, message: impl Into<String>) -> Self {
        Self::from_anyhow(source, StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        // Log server errors (5xx) with full context using structured fields
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = self.status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    error = ?source,
                    "Server error"
                );
            } else {
                tracing::error!(
                    status = self.status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    "Server error"
                );
            }
        }

        let body = Json(json!({
            "error": self.message,
        }));

        (self.status, body).into_response()
    }
}

/// Introspection reads collapse every upstream failure into one message
impl From<RegistryError> for ServerError {
    fn from(err: RegistryError) -> Self {
        Self::bad_gateway(err.into(), "registry unavailable")
    }
}

/// Deletion keeps not-found and method-not-allowed distinguishable per step
impl From<DeletionError> for ServerError {
    fn from(err: DeletionError) -> Self {
        let (lookup, kind) = match &err {
            DeletionError::Lookup(e) => (true, e.kind()),
            DeletionError::Delete(e) => (false, e.kind()),
        };

        match (lookup, kind) {
            (_, FailureKind::NotFound) => Self::not_found("tag not found"),
            (true, FailureKind::MethodNotAllowed) => {
                Self::method_not_allowed("registry tag lookup not allowed")
            }
            (false, FailureKind::MethodNotAllowed) => {
                Self::method_not_allowed("registry delete disabled")
            }
            (true, FailureKind::DigestMissing) => {
                Self::bad_gateway(err.into(), "manifest digest missing")
            }
            (true, _) => Self::bad_gateway(err.into(), "registry unavailable"),
            (false, _) => Self::bad_gateway(err.into(), "registry delete failed"),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_anyhow(err, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}
