use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::sync::Cache;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::access::{namespaces_from_grants, Grant};

/// Authenticated browser session
///
/// Created once at login from the actor's full grant list and consulted on
/// every introspection API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrincipal {
    pub user: String,
    pub grants: Vec<Grant>,
    /// Distinct namespaces of `grants`, in first-seen order
    pub namespaces: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionPrincipal {
    pub fn new(user: impl Into<String>, grants: Vec<Grant>) -> Self {
        let namespaces = namespaces_from_grants(&grants);
        Self {
            user: user.into(),
            grants,
            namespaces,
            created_at: Utc::now(),
        }
    }

    /// Check whether the session grants access to `namespace`
    pub fn namespace_allowed(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns == namespace)
    }

    /// Check whether the session may delete in `namespace`
    pub fn delete_allowed(&self, namespace: &str) -> bool {
        super::access::namespace_delete_allowed(&self.grants, namespace)
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        match self.created_at.checked_add_signed(ttl) {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }
}

/// Trait for storing browser sessions by token
///
/// Implementations must be safe for concurrent use: a `get` never observes a
/// partially written session. Expired sessions are indistinguishable from
/// absent ones.
pub trait SessionStore: Send + Sync {
    /// Store a session under the given token, replacing any previous one
    fn put(&self, token: String, session: SessionPrincipal);

    /// Retrieve a live session, removing it if it has expired
    fn get(&self, token: &str) -> Option<SessionPrincipal>;

    /// Remove a session
    fn delete(&self, token: &str);
}

/// In-memory implementation of SessionStore using Moka cache
pub struct InMemorySessionStore {
    cache: Arc<Cache<String, SessionPrincipal>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Create a new InMemorySessionStore with the specified TTL and capacity
    pub fn new(ttl: Duration, max_sessions: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_sessions)
            .build();

        Self {
            cache: Arc::new(cache),
            ttl,
        }
    }

    #[cfg(test)]
    fn contains(&self, token: &str) -> bool {
        self.cache.contains_key(token)
    }
}

impl SessionStore for InMemorySessionStore {
    fn put(&self, token: String, session: SessionPrincipal) {
        self.cache.insert(token, session);
    }

    fn get(&self, token: &str) -> Option<SessionPrincipal> {
        let session = self.cache.get(token)?;
        if session.is_expired(self.ttl, Utc::now()) {
            tracing::debug!(user = %session.user, "Dropping expired session");
            self.cache.invalidate(token);
            return None;
        }
        Some(session)
    }

    fn delete(&self, token: &str) {
        self.cache.invalidate(token);
    }
}

/// Generate a cryptographically secure random session token
pub fn generate_session_token() -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    Base64UrlUnpadded::encode_string(&random_bytes)
}
