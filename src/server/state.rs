use crate::server::auth::{
    cookie_helpers::CookieSettings,
    directory::{Directory, LdapDirectory},
    session::{InMemorySessionStore, SessionStore},
};
use crate::server::proxy::ProxyTarget;
use crate::server::registry::client::RegistryClient;
use crate::server::settings::Settings;
use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

/// Full state for HTTP server
#[derive(Clone)]
pub struct AppState {
    pub registry_client: Arc<RegistryClient>,
    pub directory: Arc<dyn Directory>,
    pub session_store: Arc<dyn SessionStore>,
    pub cookie_settings: CookieSettings,
    pub session_ttl: Duration,
    /// Only directory groups with this prefix are considered for grants
    pub group_name_prefix: Arc<str>,
    pub proxy: Arc<ProxyTarget>,
}

impl AppState {
    /// Create application state from validated settings
    pub fn new(settings: &Settings) -> Result<Self> {
        let upstream_url = Url::parse(&settings.registry.upstream_url)
            .context("Invalid registry.upstream_url")?;

        let registry_client = RegistryClient::new(&settings.registry)
            .context("Failed to build registry client")?;
        let proxy = ProxyTarget::new(
            &upstream_url,
            &settings.server.forwarded_proto,
            Duration::from_secs(settings.registry.timeout_secs),
        )?;
        tracing::info!(upstream = %upstream_url, "Registry client initialized");

        let session_ttl = Duration::from_secs(settings.session.ttl_secs);
        let session_store =
            InMemorySessionStore::new(session_ttl, settings.session.max_sessions);
        tracing::info!(
            ttl_secs = settings.session.ttl_secs,
            max_sessions = settings.session.max_sessions,
            "Session store initialized"
        );

        let directory = LdapDirectory::new(settings.ldap.clone());
        tracing::info!(url = %settings.ldap.url, "LDAP directory configured");

        Ok(Self {
            registry_client: Arc::new(registry_client),
            directory: Arc::new(directory),
            session_store: Arc::new(session_store),
            cookie_settings: CookieSettings {
                domain: settings.server.cookie_domain.clone(),
                secure: settings.server.cookie_secure,
            },
            session_ttl,
            group_name_prefix: Arc::from(settings.ldap.group_name_prefix.as_str()),
            proxy: Arc::new(proxy),
        })
    }
}
