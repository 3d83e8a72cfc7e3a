use axum::http::HeaderMap;

/// Cookie name for browser session tokens
pub const SESSION_COOKIE_NAME: &str = "registry_gate_session";

/// Parse cookies from a Cookie header value
///
/// This implements RFC 6265 cookie parsing:
/// - Cookies are separated by semicolons
/// - Leading/trailing whitespace is trimmed
/// - Cookie format is "name=value"
fn parse_cookies(cookie_header: &str) -> impl Iterator<Item = (&str, &str)> {
    cookie_header.split(';').filter_map(|cookie| {
        let cookie = cookie.trim();
        cookie.split_once('=')
    })
}

/// Settings for session cookies
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub domain: String,
    pub secure: bool,
}

fn cookie_attributes(settings: &CookieSettings, max_age_seconds: u64) -> Vec<String> {
    let mut parts = vec![
        format!("Max-Age={}", max_age_seconds),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];

    // Only set Domain if it's not empty (empty means current host only)
    if !settings.domain.is_empty() {
        parts.push(format!("Domain={}", settings.domain));
    }

    if settings.secure {
        parts.push("Secure".to_string());
    }

    parts
}

/// Create the session cookie carrying the given token
pub fn create_session_cookie(token: &str, settings: &CookieSettings, max_age_seconds: u64) -> String {
    let mut parts = vec![format!("{}={}", SESSION_COOKIE_NAME, token)];
    parts.extend(cookie_attributes(settings, max_age_seconds));
    parts.join("; ")
}

/// Extract the session token from request headers
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| {
            parse_cookies(header)
                .find(|(name, _)| *name == SESSION_COOKIE_NAME)
                .map(|(_, value)| value.to_string())
        })
        .filter(|token| !token.is_empty())
}

/// Create a cookie that clears the session token
///
/// Sets Max-Age=0 to immediately expire the cookie
pub fn clear_session_cookie(settings: &CookieSettings) -> String {
    let mut parts = vec![format!("{}=", SESSION_COOKIE_NAME)];
    parts.extend(cookie_attributes(settings, 0));
    parts.join("; ")
}
