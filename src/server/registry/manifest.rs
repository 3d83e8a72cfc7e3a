//! Manifest resolution: single-platform manifests, multi-platform lists,
//! compressed size and image configuration details.

use super::client::RegistryClient;
use super::error::RegistryError;
use super::models::{
    ConfigInfo, HistoryInfo, ImageConfigBlob, ImageManifest, LayerInfo, ManifestList,
    PlatformInfo, TagDetails, TagInfo,
};

/// Accept list for fetching a manifest by tag: single-platform and multi-platform, Docker and OCI
pub const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json,\
application/vnd.docker.distribution.manifest.list.v2+json,\
application/vnd.oci.image.manifest.v1+json,\
application/vnd.oci.image.index.v1+json";

/// Accept list for fetching a platform manifest selected from a list
pub const SINGLE_MANIFEST_ACCEPT: &str =
    "application/vnd.docker.distribution.manifest.v2+json, application/vnd.oci.image.manifest.v1+json";

const PREFERRED_OS: &str = "linux";
const PREFERRED_ARCHITECTURE: &str = "amd64";

pub fn is_manifest_list(content_type: &str) -> bool {
    content_type.contains("manifest.list") || content_type.contains("image.index")
}

/// Pick the platform manifest to describe a multi-platform tag.
///
/// linux/amd64 wins; otherwise the first listed entry is used.
pub(crate) fn select_manifest_digest(list: &ManifestList) -> Result<String, RegistryError> {
    list.manifests
        .iter()
        .find(|entry| {
            entry.platform.os == PREFERRED_OS
                && entry.platform.architecture == PREFERRED_ARCHITECTURE
        })
        .or_else(|| list.manifests.first())
        .map(|entry| entry.digest.clone())
        .ok_or(RegistryError::ManifestListEmpty)
}

pub(crate) fn build_platforms(list: &ManifestList) -> Vec<PlatformInfo> {
    list.manifests
        .iter()
        .map(|entry| PlatformInfo {
            os: entry.platform.os.clone(),
            architecture: entry.platform.architecture.clone(),
            variant: Some(entry.platform.variant.clone()).filter(|v| !v.is_empty()),
        })
        .collect()
}

/// Config size plus the sum of all layer sizes
pub(crate) fn compressed_size(manifest: &ImageManifest) -> Result<i64, RegistryError> {
    manifest
        .layers
        .iter()
        .try_fold(manifest.config.size, |total, layer| total.checked_add(layer.size))
        .ok_or_else(|| RegistryError::InvalidResponse("manifest sizes overflow".to_string()))
}

fn build_layers(manifest: &ImageManifest) -> Vec<LayerInfo> {
    manifest
        .layers
        .iter()
        .map(|layer| LayerInfo {
            digest: layer.digest.clone(),
            size: layer.size,
            media_type: layer.media_type.clone(),
        })
        .collect()
}

impl RegistryClient {
    /// Resolve a manifest body to a single-platform manifest.
    ///
    /// Returns the parsed manifest and, for lists, the platforms they enumerate.
    async fn resolve_manifest(
        &self,
        repo: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(ImageManifest, Option<Vec<PlatformInfo>>), RegistryError> {
        if !is_manifest_list(content_type) {
            return Ok((serde_json::from_slice(body)?, None));
        }

        let list: ManifestList = serde_json::from_slice(body)?;
        let platforms = build_platforms(&list);
        let selected = select_manifest_digest(&list)?;
        tracing::debug!(repo = %repo, digest = %selected, "Resolved manifest list entry");

        let payload = self
            .fetch_manifest(repo, &selected, SINGLE_MANIFEST_ACCEPT)
            .await?;
        let manifest = serde_json::from_slice(&payload.body)?;
        Ok((manifest, Some(platforms)))
    }

    /// Summarize a tag: its digest and the compressed size of the resolved manifest
    pub async fn fetch_tag_info(&self, repo: &str, tag: &str) -> Result<TagInfo, RegistryError> {
        let payload = self.fetch_manifest(repo, tag, MANIFEST_ACCEPT).await?;
        let (manifest, _) = self
            .resolve_manifest(repo, &payload.body, &payload.content_type)
            .await?;

        Ok(TagInfo {
            tag: tag.to_string(),
            digest: payload.digest,
            compressed_size: compressed_size(&manifest)?,
        })
    }

    /// Full description of a tag: manifest metadata, layers, platforms and image config
    pub async fn fetch_tag_details(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<TagDetails, RegistryError> {
        let payload = self.fetch_manifest(repo, tag, MANIFEST_ACCEPT).await?;
        let (manifest, platforms) = self
            .resolve_manifest(repo, &payload.body, &payload.content_type)
            .await?;

        let media_type = if manifest.media_type.is_empty() {
            payload.content_type
        } else {
            manifest.media_type.clone()
        };
        let config = self.fetch_config_info(repo, &manifest).await?;

        Ok(TagDetails {
            repo: repo.to_string(),
            tag: tag.to_string(),
            digest: payload.digest,
            media_type,
            schema_version: manifest.schema_version,
            config,
            platforms: platforms.filter(|p| !p.is_empty()),
            layers: build_layers(&manifest),
        })
    }

    /// Describe the manifest's config descriptor, enriched from the config blob when it has a digest
    pub(crate) async fn fetch_config_info(
        &self,
        repo: &str,
        manifest: &ImageManifest,
    ) -> Result<ConfigInfo, RegistryError> {
        let mut info = ConfigInfo {
            digest: manifest.config.digest.clone(),
            size: manifest.config.size,
            media_type: manifest.config.media_type.clone(),
            ..ConfigInfo::default()
        };
        if info.digest.is_empty() {
            return Ok(info);
        }

        let blob = self.fetch_blob(repo, &info.digest).await?;
        let config: ImageConfigBlob = serde_json::from_slice(&blob)?;

        info.created = config.created;
        info.os = config.os;
        info.architecture = config.architecture;
        if let Some(runtime) = config.config {
            info.entrypoint = runtime.entrypoint.unwrap_or_default();
            info.cmd = runtime.cmd.unwrap_or_default();
            info.env = runtime.env.unwrap_or_default();
            info.labels = runtime.labels.unwrap_or_default();
        }
        info.history_count = config.history.len();
        info.history = config
            .history
            .into_iter()
            .map(|entry| HistoryInfo {
                created_by: entry.created_by,
                empty_layer: entry.empty_layer,
            })
            .collect();

        Ok(info)
    }
}
