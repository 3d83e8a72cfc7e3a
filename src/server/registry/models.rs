use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header carrying the content digest of a manifest
pub const DIGEST_HEADER: &str = "Docker-Content-Digest";

// ---------------------------------------------------------------------------
// Upstream wire formats
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct CatalogResponse {
    #[serde(default)]
    pub repositories: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    // Upstream sends `"tags": null` for a repo with no tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Descriptor {
    #[serde(default, rename = "mediaType")]
    pub media_type: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub size: i64,
}

/// Single-platform manifest (Docker schema 2 or OCI image manifest)
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImageManifest {
    #[serde(default, rename = "schemaVersion")]
    pub schema_version: i64,
    #[serde(default, rename = "mediaType")]
    pub media_type: String,
    #[serde(default)]
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ManifestPlatform {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub variant: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManifestListEntry {
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub platform: ManifestPlatform,
}

/// Multi-platform manifest list (Docker) or image index (OCI)
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ManifestList {
    #[serde(default)]
    pub manifests: Vec<ManifestListEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImageRuntimeConfig {
    #[serde(default, rename = "Entrypoint")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(default, rename = "Labels")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageHistoryEntry {
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub empty_layer: bool,
}

/// Image configuration blob
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImageConfigBlob {
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub config: Option<ImageRuntimeConfig>,
    #[serde(default)]
    pub history: Vec<ImageHistoryEntry>,
}

// ---------------------------------------------------------------------------
// Normalized views returned by the introspection API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub tag: String,
    pub digest: String,
    pub compressed_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformInfo {
    pub os: String,
    pub architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub digest: String,
    pub size: i64,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInfo {
    pub created_by: String,
    pub empty_layer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInfo {
    pub digest: String,
    pub size: i64,
    pub media_type: String,
    pub created: String,
    pub os: String,
    pub architecture: String,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub history_count: usize,
    pub history: Vec<HistoryInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDetails {
    pub repo: String,
    pub tag: String,
    pub digest: String,
    pub media_type: String,
    pub schema_version: i64,
    pub config: ConfigInfo,
    /// Present only when the tag points at a multi-platform list/index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<PlatformInfo>>,
    pub layers: Vec<LayerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedTag {
    pub repo: String,
    pub tag: String,
}
