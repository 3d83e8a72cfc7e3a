use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::error::RegistryError;
use super::models::{CatalogResponse, RepoInfo, TagsResponse, DIGEST_HEADER};
use super::manifest::MANIFEST_ACCEPT;
use crate::server::settings::RegistrySettings;

/// A fetched manifest body together with the headers describing it
#[derive(Debug)]
pub(crate) struct ManifestPayload {
    pub body: Bytes,
    pub content_type: String,
    pub digest: String,
}

/// Client for the upstream registry's read/delete endpoints.
///
/// Every call is bounded by the configured timeout. The client holds no
/// credentials of its own; the upstream is expected to trust the gateway.
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    catalog_concurrency: usize,
}

impl RegistryClient {
    pub fn new(settings: &RegistrySettings) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.upstream_url.trim_end_matches('/').to_string(),
            catalog_concurrency: settings.catalog_concurrency.max(1),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RegistryError> {
        let response = self.http.get(self.url(path)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(RegistryError::from_response(response).await);
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// List the repositories under `namespace/`, in upstream catalog order
    pub async fn fetch_repo_names(&self, namespace: &str) -> Result<Vec<String>, RegistryError> {
        let catalog: CatalogResponse = self.get_json("_catalog").await?;
        let prefix = format!("{}/", namespace);

        Ok(catalog
            .repositories
            .into_iter()
            .filter(|repo| repo.starts_with(&prefix))
            .collect())
    }

    /// List the repositories under `namespace/` together with their tags.
    ///
    /// Tag lists are fetched with bounded concurrency; the result keeps
    /// catalog order. Any failing tag lookup fails the whole call.
    pub async fn fetch_catalog(&self, namespace: &str) -> Result<Vec<RepoInfo>, RegistryError> {
        let repos = self.fetch_repo_names(namespace).await?;
        tracing::debug!(namespace = %namespace, repos = repos.len(), "Fetching tags for catalog");

        stream::iter(repos)
            .map(|name| async move {
                let tags = self.fetch_tags(&name).await?;
                Ok::<_, RegistryError>(RepoInfo { name, tags })
            })
            .buffered(self.catalog_concurrency)
            .try_collect()
            .await
    }

    pub async fn fetch_tags(&self, repo: &str) -> Result<Vec<String>, RegistryError> {
        let tags: TagsResponse = self.get_json(&format!("{}/tags/list", repo)).await?;
        Ok(tags.tags.unwrap_or_default())
    }

    /// Resolve a tag to its content digest without downloading the manifest
    pub async fn fetch_tag_digest(&self, repo: &str, tag: &str) -> Result<String, RegistryError> {
        let response = self
            .http
            .head(self.url(&format!("{}/manifests/{}", repo, tag)))
            .header(header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(RegistryError::from_response(response).await);
        }

        header_value(&response, DIGEST_HEADER)
            .filter(|digest| !digest.is_empty())
            .ok_or(RegistryError::DigestMissing)
    }

    /// GET a manifest by tag or digest with the given Accept list
    pub(crate) async fn fetch_manifest(
        &self,
        repo: &str,
        reference: &str,
        accept: &str,
    ) -> Result<ManifestPayload, RegistryError> {
        let response = self
            .http
            .get(self.url(&format!("{}/manifests/{}", repo, reference)))
            .header(header::ACCEPT, accept)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(RegistryError::from_response(response).await);
        }

        let content_type = header_value(&response, header::CONTENT_TYPE.as_str()).unwrap_or_default();
        let digest = header_value(&response, DIGEST_HEADER).unwrap_or_default();
        let body = response.bytes().await?;

        Ok(ManifestPayload {
            body,
            content_type,
            digest,
        })
    }

    pub(crate) async fn fetch_blob(&self, repo: &str, digest: &str) -> Result<Bytes, RegistryError> {
        let response = self
            .http
            .get(self.url(&format!("{}/blobs/{}", repo, digest)))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(RegistryError::from_response(response).await);
        }
        Ok(response.bytes().await?)
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
