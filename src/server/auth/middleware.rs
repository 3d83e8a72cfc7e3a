use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};

use crate::server::auth::cookie_helpers;
use crate::server::error::ServerError;
use crate::server::state::AppState;

/// Username and password from an HTTP Basic `Authorization` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Extract Basic credentials from the Authorization header.
///
/// Returns `None` when the header is absent, uses another scheme, or does not
/// decode to `username:password`.
pub fn extract_basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = auth_header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Session middleware for the introspection API.
///
/// Resolves the session cookie to a live [`SessionPrincipal`] and injects it
/// into request extensions; anything else is rejected with 401.
///
/// [`SessionPrincipal`]: crate::server::auth::session::SessionPrincipal
pub async fn session_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(token) = cookie_helpers::extract_session_cookie(&headers) else {
        tracing::debug!(path = %req.uri().path(), "No session cookie");
        return Err(ServerError::unauthorized("unauthorized"));
    };

    let Some(session) = state.session_store.get(&token) else {
        tracing::debug!(path = %req.uri().path(), "Unknown or expired session");
        return Err(ServerError::unauthorized("unauthorized"));
    };

    tracing::debug!(user = %session.user, path = %req.uri().path(), "Session validated");
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
