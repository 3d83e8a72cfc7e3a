use crate::server::auth::{
    access::{namespace_permissions, NamespacePermission},
    cookie_helpers,
    directory::{authenticate_grants, AuthError},
    middleware::{extract_basic_credentials, BasicCredentials},
    session::{generate_session_token, SessionPrincipal},
};
use crate::server::error::ServerError;
use crate::server::state::AppState;
use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Headers that keep browsers and proxies from caching per-user responses
pub const NO_CACHE_HEADERS: [(header::HeaderName, &str); 3] = [
    (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Everything a dashboard client needs to render the signed-in view
#[derive(Debug, Serialize)]
pub struct DashboardBootstrap {
    pub username: String,
    pub namespaces: Vec<String>,
    pub permissions: Vec<NamespacePermission>,
}

impl DashboardBootstrap {
    pub fn from_session(session: &SessionPrincipal) -> Self {
        Self {
            username: session.user.clone(),
            namespaces: session.namespaces.clone(),
            permissions: namespace_permissions(&session.namespaces, &session.grants),
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Extract login credentials from Basic auth, falling back to a form body.
///
/// Basic auth only counts when both fields are non-empty. Form usernames are
/// trimmed; passwords are taken verbatim.
fn login_credentials(headers: &HeaderMap, body: &[u8]) -> Result<Option<BasicCredentials>, ServerError> {
    if let Some(creds) = extract_basic_credentials(headers) {
        if !creds.username.is_empty() && !creds.password.is_empty() {
            return Ok(Some(creds));
        }
    }

    if !is_form(headers) {
        return Ok(None);
    }

    let form: LoginForm = serde_urlencoded::from_bytes(body)
        .map_err(|_| ServerError::bad_request("invalid form submission"))?;
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Ok(None);
    }

    Ok(Some(BasicCredentials {
        username: username.to_string(),
        password: form.password,
    }))
}

/// Sign in with directory credentials and start a browser session
#[instrument(skip(state, headers, body))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let Some(creds) = login_credentials(&headers, &body)? else {
        return Err(ServerError::bad_request("missing credentials"));
    };

    let (grants, _primary) = authenticate_grants(
        state.directory.as_ref(),
        &state.group_name_prefix,
        &creds.username,
        &creds.password,
    )
    .await
    .map_err(|e| {
        match &e {
            e if e.is_unavailable() => {
                tracing::error!(username = %creds.username, error = %e, "Directory unavailable")
            }
            AuthError::NoAuthorizedGroups(_) => {
                tracing::warn!(username = %creds.username, "Login rejected: no authorized groups")
            }
            AuthError::Directory(err) => {
                tracing::warn!(username = %creds.username, error = %err, "Login rejected")
            }
        }
        ServerError::unauthorized("invalid credentials")
    })?;

    let session = SessionPrincipal::new(creds.username.clone(), grants);
    let bootstrap = DashboardBootstrap::from_session(&session);

    let token = generate_session_token();
    state.session_store.put(token.clone(), session);
    tracing::info!(
        username = %creds.username,
        namespaces = ?bootstrap.namespaces,
        "User logged in"
    );

    let cookie = cookie_helpers::create_session_cookie(
        &token,
        &state.cookie_settings,
        state.session_ttl.as_secs(),
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        NO_CACHE_HEADERS,
        Json(bootstrap),
    )
        .into_response())
}

/// End the browser session, if any, and clear the cookie
#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = cookie_helpers::extract_session_cookie(&headers) {
        if let Some(session) = state.session_store.get(&token) {
            tracing::info!(username = %session.user, "User logged out");
        }
        state.session_store.delete(&token);
    }

    let cookie = cookie_helpers::clear_session_cookie(&state.cookie_settings);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response()
}

/// Bootstrap data for the signed-in dashboard
pub async fn dashboard(Extension(session): Extension<SessionPrincipal>) -> Response {
    tracing::debug!(user = %session.user, "GET /api/dashboard");
    (NO_CACHE_HEADERS, Json(DashboardBootstrap::from_session(&session))).into_response()
}
