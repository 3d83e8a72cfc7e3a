//! Application state wired to in-process fakes for router tests

use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

use crate::server::auth::cookie_helpers::CookieSettings;
use crate::server::auth::directory::{Directory, DirectoryError};
use crate::server::auth::session::InMemorySessionStore;
use crate::server::proxy::ProxyTarget;
use crate::server::registry::client::RegistryClient;
use crate::server::settings::RegistrySettings;
use crate::server::state::AppState;

/// Directory that accepts one password for every user
pub struct StaticDirectory {
    pub password: String,
    pub groups: Vec<String>,
}

impl StaticDirectory {
    pub fn new(password: &str, groups: &[&str]) -> Self {
        Self {
            password: password.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn authenticate(
        &self,
        _username: &str,
        password: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        if password.is_empty() {
            return Err(DirectoryError::MissingCredentials);
        }
        if password != self.password {
            return Err(DirectoryError::BindRejected("invalid credentials".into()));
        }
        Ok(self.groups.clone())
    }
}

pub fn test_state(upstream_url: &str, directory: StaticDirectory) -> AppState {
    let registry_client = RegistryClient::new(&RegistrySettings {
        upstream_url: upstream_url.to_string(),
        timeout_secs: 5,
        catalog_concurrency: 4,
    })
    .unwrap();
    let proxy = ProxyTarget::new(
        &Url::parse(upstream_url).unwrap(),
        "https",
        Duration::from_secs(1),
    )
    .unwrap();
    let session_ttl = Duration::from_secs(1800);

    AppState {
        registry_client: Arc::new(registry_client),
        directory: Arc::new(directory),
        session_store: Arc::new(InMemorySessionStore::new(session_ttl, 100)),
        cookie_settings: CookieSettings {
            domain: String::new(),
            secure: false,
        },
        session_ttl,
        group_name_prefix: Arc::from("team"),
        proxy: Arc::new(proxy),
    }
}
