//! Authorization gate for raw registry protocol traffic
//!
//! Registry clients (docker, podman, skopeo, ...) authenticate on every request
//! with directory credentials and carry no session, so every request is
//! checked against the actor's primary principal. Nothing is cached.

use axum::http::Method;
use std::fmt;

use super::access::PrimaryPrincipal;

/// Root of the registry protocol
pub const PROTOCOL_ROOT: &str = "/v2";

/// Registry ping path, allowed for every authenticated principal
pub const PING_PATH: &str = "/v2/";

/// Why the gate refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Path contains `.`/`..` segments (plain or percent-encoded)
    DotSegment,
    /// Path targets a namespace other than the principal's
    WrongNamespace,
    /// Write method attempted by a pull-only principal
    PullOnly,
    /// DELETE attempted without delete permission
    DeleteNotAllowed,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Denial::DotSegment => "path contains dot segments",
            Denial::WrongNamespace => "namespace not allowed",
            Denial::PullOnly => "pull-only access",
            Denial::DeleteNotAllowed => "delete not allowed",
        };
        f.write_str(reason)
    }
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Decide whether `principal` may perform `method` on `path`.
///
/// `path` is either the full request path (`/v2/<namespace>/...`) or the path
/// relative to the protocol root (`/<namespace>/...`).
pub fn authorize(principal: &PrimaryPrincipal, method: &Method, path: &str) -> Result<(), Denial> {
    if path == PING_PATH || path == PROTOCOL_ROOT {
        return Ok(());
    }

    if path.split('/').any(is_dot_segment) {
        return Err(Denial::DotSegment);
    }

    let scoped = path.strip_prefix(PROTOCOL_ROOT).unwrap_or(path);
    let namespace_prefix = format!("/{}/", principal.namespace);
    if !scoped.starts_with(&namespace_prefix) {
        return Err(Denial::WrongNamespace);
    }

    if principal.pull_only {
        return if method == Method::GET || method == Method::HEAD {
            Ok(())
        } else {
            Err(Denial::PullOnly)
        };
    }

    if method == Method::DELETE && !principal.delete_allowed {
        return Err(Denial::DeleteNotAllowed);
    }

    Ok(())
}
