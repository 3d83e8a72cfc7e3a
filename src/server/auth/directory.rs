//! Directory service collaborator
//!
//! The gateway only needs one thing from the directory: given a username and
//! password, prove the credentials and return the actor's raw group
//! identifiers (usually distinguished names).

use async_trait::async_trait;
use ldap3::{ldap_escape, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::time::Duration;
use thiserror::Error;

use super::access::{derive_grants, Grant, PrimaryPrincipal};
use crate::server::settings::LdapSettings;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Directory connection failed: {0}")]
    Connection(String),

    #[error("Directory bind failed: {0}")]
    BindRejected(String),

    #[error("Directory search failed: {0}")]
    Search(String),

    #[error("User {0} not found")]
    UserNotFound(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("No authorized groups for {0}")]
    NoAuthorizedGroups(String),
}

impl AuthError {
    /// The directory could not be reached, as opposed to rejecting the actor
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::Directory(DirectoryError::Connection(_)))
    }
}

/// Trait for directory services that authenticate users and report group membership
#[async_trait]
pub trait Directory: Send + Sync {
    /// Verify credentials and return the user's raw group identifiers
    async fn authenticate(&self, username: &str, password: &str)
        -> Result<Vec<String>, DirectoryError>;
}

/// Render the identity used for the directory bind.
///
/// Usernames that already contain `@` are used as-is; otherwise the mail
/// domain is appended (with a leading `@` added if the configured domain has
/// none).
pub fn bind_identity(username: &str, mail_domain: &str) -> String {
    if username.contains('@') || mail_domain.is_empty() {
        return username.to_string();
    }
    if mail_domain.starts_with('@') {
        format!("{}{}", username, mail_domain)
    } else {
        format!("{}@{}", username, mail_domain)
    }
}

/// Substitute the escaped identity into a search filter template
pub fn render_user_filter(template: &str, identity: &str) -> String {
    template.replace("%s", &ldap_escape(identity))
}

/// Authenticate against the directory and derive the actor's grants.
///
/// Fails with [`AuthError::NoAuthorizedGroups`] if none of the user's groups
/// grant access to a namespace.
pub async fn authenticate_grants(
    directory: &dyn Directory,
    group_prefix: &str,
    username: &str,
    password: &str,
) -> Result<(Vec<Grant>, PrimaryPrincipal), AuthError> {
    let groups = directory.authenticate(username, password).await?;
    tracing::debug!(username = %username, groups = groups.len(), "Directory returned groups");

    let (grants, primary) = derive_grants(username, &groups, group_prefix);
    let primary = primary.ok_or_else(|| AuthError::NoAuthorizedGroups(username.to_string()))?;
    Ok((grants, primary))
}

/// LDAP-backed directory
pub struct LdapDirectory {
    settings: LdapSettings,
}

impl LdapDirectory {
    pub fn new(settings: LdapSettings) -> Self {
        Self { settings }
    }

    fn conn_settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.settings.timeout_secs))
            .set_starttls(self.settings.start_tls && self.settings.url.starts_with("ldap://"))
            .set_no_tls_verify(self.settings.skip_tls_verify)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        if username.is_empty() || password.is_empty() {
            // An empty password would turn the bind into an unauthenticated one
            return Err(DirectoryError::MissingCredentials);
        }

        let (conn, mut ldap) = LdapConnAsync::with_settings(self.conn_settings(), &self.settings.url)
            .await
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;
        ldap3::drive!(conn);

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        ldap.with_timeout(timeout);

        let identity = bind_identity(username, &self.settings.user_mail_domain);
        ldap.simple_bind(&identity, password)
            .await
            .and_then(|res| res.success())
            .map_err(|e| DirectoryError::BindRejected(e.to_string()))?;

        let filter = render_user_filter(&self.settings.user_filter, &identity);
        tracing::debug!(filter = %filter, "Searching directory for user");

        ldap.with_timeout(timeout);
        let search = ldap
            .search(
                &self.settings.base_dn,
                Scope::Subtree,
                &filter,
                vec![self.settings.group_attribute.as_str()],
            )
            .await
            .and_then(|res| res.success());

        if let Err(e) = ldap.unbind().await {
            tracing::debug!(error = %e, "Directory unbind failed");
        }

        let (entries, _) = search.map_err(|e| DirectoryError::Search(e.to_string()))?;
        let entry = entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .ok_or_else(|| DirectoryError::UserNotFound(identity.clone()))?;

        Ok(entry
            .attrs
            .get(&self.settings.group_attribute)
            .cloned()
            .unwrap_or_default())
    }
}
