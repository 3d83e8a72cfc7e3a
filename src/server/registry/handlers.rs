use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::models::{DeletedTag, RepoInfo, TagDetails, TagInfo};
use crate::server::auth::session::SessionPrincipal;
use crate::server::error::ServerError;
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct RepoQuery {
    #[serde(default)]
    pub repo: String,
}

#[derive(Debug, Deserialize)]
pub struct RepoTagQuery {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Serialize)]
pub struct CatalogPayload {
    pub username: String,
    pub namespace: String,
    pub repositories: Vec<RepoInfo>,
}

#[derive(Debug, Serialize)]
pub struct ReposPayload {
    pub namespace: String,
    pub repositories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TagsPayload {
    pub repo: String,
    pub tags: Vec<String>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Repository names are `/`-separated segments of `[A-Za-z0-9._-]`, none of them dot segments
fn is_valid_repo(repo: &str) -> bool {
    repo.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment.chars().all(is_name_char)
    })
}

/// Tags follow the distribution grammar `[A-Za-z0-9_][A-Za-z0-9._-]{0,127}`
fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
        _ => return false,
    }
    tag.len() <= 128 && chars.all(is_name_char)
}

/// Trim and authorize a namespace query value
fn require_namespace(session: &SessionPrincipal, raw: &str) -> Result<String, ServerError> {
    let namespace = raw.trim();
    if namespace.is_empty() || !session.namespace_allowed(namespace) {
        return Err(ServerError::forbidden("namespace not allowed")
            .with_context("namespace", namespace));
    }
    Ok(namespace.to_string())
}

/// Trim and validate a repo query value, returning the repo and its namespace
fn repo_namespace(raw: &str) -> Result<(String, String), ServerError> {
    let repo = raw.trim();
    if repo.is_empty() {
        return Err(ServerError::bad_request("missing repo"));
    }
    let Some((namespace, _)) = repo.split_once('/') else {
        return Err(ServerError::bad_request("invalid repo"));
    };
    if !is_valid_repo(repo) {
        return Err(ServerError::bad_request("invalid repo"));
    }
    Ok((repo.to_string(), namespace.to_string()))
}

/// Trim and validate repo and tag query values, returning repo, tag and namespace
fn repo_tag_namespace(raw_repo: &str, raw_tag: &str) -> Result<(String, String, String), ServerError> {
    let repo = raw_repo.trim();
    let tag = raw_tag.trim();
    if repo.is_empty() || tag.is_empty() {
        return Err(ServerError::bad_request("missing repo or tag"));
    }
    let (repo, namespace) = repo_namespace(repo)?;
    if !is_valid_tag(tag) {
        return Err(ServerError::bad_request("invalid tag"));
    }
    Ok((repo, tag.to_string(), namespace))
}

fn check_namespace(session: &SessionPrincipal, namespace: &str) -> Result<(), ServerError> {
    if session.namespace_allowed(namespace) {
        Ok(())
    } else {
        Err(ServerError::forbidden("namespace not allowed").with_context("namespace", namespace))
    }
}

/// Repositories of a namespace with their tags
#[instrument(skip(state, session), fields(user = %session.user))]
pub async fn catalog(
    State(state): State<AppState>,
    Extension(session): Extension<SessionPrincipal>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<CatalogPayload>, ServerError> {
    let namespace = require_namespace(&session, &query.namespace)?;

    let repositories = state
        .registry_client
        .fetch_catalog(&namespace)
        .await
        .map_err(|e| ServerError::from(e).with_context("namespace", &namespace))?;

    Ok(Json(CatalogPayload {
        username: session.user.clone(),
        namespace,
        repositories,
    }))
}

/// Repository names of a namespace
#[instrument(skip(state, session), fields(user = %session.user))]
pub async fn repos(
    State(state): State<AppState>,
    Extension(session): Extension<SessionPrincipal>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<ReposPayload>, ServerError> {
    let namespace = require_namespace(&session, &query.namespace)?;

    let repositories = state
        .registry_client
        .fetch_repo_names(&namespace)
        .await
        .map_err(|e| ServerError::from(e).with_context("namespace", &namespace))?;

    Ok(Json(ReposPayload {
        namespace,
        repositories,
    }))
}

#[instrument(skip(state, session), fields(user = %session.user))]
pub async fn tags(
    State(state): State<AppState>,
    Extension(session): Extension<SessionPrincipal>,
    Query(query): Query<RepoQuery>,
) -> Result<Json<TagsPayload>, ServerError> {
    let (repo, namespace) = repo_namespace(&query.repo)?;
    check_namespace(&session, &namespace)?;

    let tags = state
        .registry_client
        .fetch_tags(&repo)
        .await
        .map_err(|e| ServerError::from(e).with_context("repo", &repo))?;

    Ok(Json(TagsPayload { repo, tags }))
}

#[instrument(skip(state, session), fields(user = %session.user))]
pub async fn tag_info(
    State(state): State<AppState>,
    Extension(session): Extension<SessionPrincipal>,
    Query(query): Query<RepoTagQuery>,
) -> Result<Json<TagInfo>, ServerError> {
    let (repo, tag, namespace) = repo_tag_namespace(&query.repo, &query.tag)?;
    check_namespace(&session, &namespace)?;

    let info = state
        .registry_client
        .fetch_tag_info(&repo, &tag)
        .await
        .map_err(|e| {
            ServerError::from(e)
                .with_context("repo", &repo)
                .with_context("tag", &tag)
        })?;

    Ok(Json(info))
}

#[instrument(skip(state, session), fields(user = %session.user))]
pub async fn tag_layers(
    State(state): State<AppState>,
    Extension(session): Extension<SessionPrincipal>,
    Query(query): Query<RepoTagQuery>,
) -> Result<Json<TagDetails>, ServerError> {
    let (repo, tag, namespace) = repo_tag_namespace(&query.repo, &query.tag)?;
    check_namespace(&session, &namespace)?;

    let details = state
        .registry_client
        .fetch_tag_details(&repo, &tag)
        .await
        .map_err(|e| {
            ServerError::from(e)
                .with_context("repo", &repo)
                .with_context("tag", &tag)
        })?;

    Ok(Json(details))
}

/// Delete a tag (and every tag sharing its manifest)
#[instrument(skip(state, session), fields(user = %session.user))]
pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(session): Extension<SessionPrincipal>,
    Query(query): Query<RepoTagQuery>,
) -> Result<Json<DeletedTag>, ServerError> {
    let (repo, tag, namespace) = repo_tag_namespace(&query.repo, &query.tag)?;
    check_namespace(&session, &namespace)?;

    if !session.delete_allowed(&namespace) {
        tracing::warn!(user = %session.user, namespace = %namespace, "Delete not allowed");
        return Err(ServerError::forbidden("delete not allowed").with_context("namespace", namespace));
    }

    let deleted = state
        .registry_client
        .delete_tag(&repo, &tag)
        .await
        .map_err(|e| {
            ServerError::from(e)
                .with_context("repo", &repo)
                .with_context("tag", &tag)
        })?;

    tracing::info!(user = %session.user, repo = %repo, tag = %tag, "Tag deleted");
    Ok(Json(deleted))
}
