use reqwest::StatusCode;
use thiserror::Error;

use super::client::RegistryClient;
use super::error::RegistryError;
use super::models::DeletedTag;

/// Which step of a tag deletion failed
#[derive(Debug, Error)]
pub enum DeletionError {
    /// Resolving the tag to a digest failed
    #[error("Tag lookup failed: {0}")]
    Lookup(#[source] RegistryError),

    /// Deleting the manifest by digest failed
    #[error("Manifest delete failed: {0}")]
    Delete(#[source] RegistryError),
}

impl RegistryClient {
    /// Delete a manifest by digest; 200 and 202 both count as success
    pub async fn delete_manifest(&self, repo: &str, digest: &str) -> Result<(), RegistryError> {
        let response = self
            .http()
            .delete(self.url(&format!("{}/manifests/{}", repo, digest)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            _ => Err(RegistryError::from_response(response).await),
        }
    }

    /// Delete a tag by resolving it to its digest and deleting that manifest.
    ///
    /// Deleting by digest removes every tag that points at the same manifest.
    pub async fn delete_tag(&self, repo: &str, tag: &str) -> Result<DeletedTag, DeletionError> {
        let digest = self
            .fetch_tag_digest(repo, tag)
            .await
            .map_err(DeletionError::Lookup)?;

        self.delete_manifest(repo, &digest)
            .await
            .map_err(DeletionError::Delete)?;

        tracing::info!(repo = %repo, tag = %tag, digest = %digest, "Deleted manifest");
        Ok(DeletedTag {
            repo: repo.to_string(),
            tag: tag.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::registry::error::FailureKind;
    use crate::server::registry::testing::{CannedResponse, FakeRegistryBuilder};
    use axum::http::Method;

    #[tokio::test]
    async fn test_delete_tag_accepted() {
        let registry = FakeRegistryBuilder::new()
            .route(
                Method::HEAD,
                "/v2/team1/app/manifests/v1",
                CannedResponse::status(StatusCode::OK).with_digest("sha256:abc"),
            )
            .route(
                Method::DELETE,
                "/v2/team1/app/manifests/sha256:abc",
                CannedResponse::status(StatusCode::ACCEPTED),
            )
            .spawn()
            .await;

        let deleted = registry.client().delete_tag("team1/app", "v1").await.unwrap();
        assert_eq!(
            deleted,
            DeletedTag {
                repo: "team1/app".to_string(),
                tag: "v1".to_string(),
            }
        );
        assert_eq!(
            registry.calls(),
            vec![
                "HEAD /v2/team1/app/manifests/v1".to_string(),
                "DELETE /v2/team1/app/manifests/sha256:abc".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_manifest_ok_status() {
        let registry = FakeRegistryBuilder::new()
            .route(
                Method::DELETE,
                "/v2/team1/app/manifests/sha256:abc",
                CannedResponse::status(StatusCode::OK),
            )
            .spawn()
            .await;

        registry
            .client()
            .delete_manifest("team1/app", "sha256:abc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_tag_lookup_not_found_skips_delete() {
        let registry = FakeRegistryBuilder::new()
            .route(
                Method::HEAD,
                "/v2/team1/app/manifests/v1",
                CannedResponse::status(StatusCode::NOT_FOUND),
            )
            .spawn()
            .await;

        let err = registry.client().delete_tag("team1/app", "v1").await.unwrap_err();
        assert!(matches!(err, DeletionError::Lookup(ref e) if e.kind() == FailureKind::NotFound));
        assert!(!registry.calls().iter().any(|call| call.starts_with("DELETE")));
    }

    #[tokio::test]
    async fn test_delete_tag_lookup_method_not_allowed_skips_delete() {
        let registry = FakeRegistryBuilder::new()
            .route(
                Method::HEAD,
                "/v2/team1/app/manifests/v1",
                CannedResponse::status(StatusCode::METHOD_NOT_ALLOWED),
            )
            .spawn()
            .await;

        let err = registry.client().delete_tag("team1/app", "v1").await.unwrap_err();
        assert!(matches!(
            err,
            DeletionError::Lookup(ref e) if e.kind() == FailureKind::MethodNotAllowed
        ));
        assert!(!registry.calls().iter().any(|call| call.starts_with("DELETE")));
    }

    #[tokio::test]
    async fn test_delete_tag_missing_digest() {
        let registry = FakeRegistryBuilder::new()
            .route(
                Method::HEAD,
                "/v2/team1/app/manifests/v1",
                CannedResponse::status(StatusCode::OK),
            )
            .spawn()
            .await;

        let err = registry.client().delete_tag("team1/app", "v1").await.unwrap_err();
        assert!(matches!(err, DeletionError::Lookup(RegistryError::DigestMissing)));
        assert!(!registry.calls().iter().any(|call| call.starts_with("DELETE")));
    }

    #[tokio::test]
    async fn test_delete_disabled_upstream() {
        let registry = FakeRegistryBuilder::new()
            .route(
                Method::HEAD,
                "/v2/team1/app/manifests/v1",
                CannedResponse::status(StatusCode::OK).with_digest("sha256:abc"),
            )
            .route(
                Method::DELETE,
                "/v2/team1/app/manifests/sha256:abc",
                CannedResponse::status(StatusCode::METHOD_NOT_ALLOWED),
            )
            .spawn()
            .await;

        let err = registry.client().delete_tag("team1/app", "v1").await.unwrap_err();
        assert!(matches!(
            err,
            DeletionError::Delete(ref e) if e.kind() == FailureKind::MethodNotAllowed
        ));
    }
}
