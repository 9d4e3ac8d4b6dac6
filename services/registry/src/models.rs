//! Wire types for the Docker Registry HTTP API V2.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media type requested for image manifests.
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Header carrying the digest of a manifest.
pub const CONTENT_DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Response of `GET /v2/<name>/tags/list`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TagList {
    /// Repository name
    #[serde(default)]
    pub name: String,

    /// Tags, absent or null when the repository has none
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Response of `GET /v2/_catalog`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Catalog {
    /// Every repository path known to the registry
    #[serde(default)]
    pub repositories: Option<Vec<String>>,
}

/// GCR's extended tag listing, which also names child repositories.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GcrTagList {
    /// Repositories nested under this one
    #[serde(default)]
    pub child: Vec<String>,

    /// Repository name
    #[serde(default)]
    pub name: String,

    /// Tags on this repository
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A content descriptor inside a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    #[serde(default)]
    pub media_type: String,

    /// Size in bytes
    #[serde(default)]
    pub size: i64,

    /// Content digest, e.g. `sha256:...`
    pub digest: String,
}

/// Image manifest, schema version 2.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest schema version
    pub schema_version: u32,

    /// Manifest media type
    #[serde(default)]
    pub media_type: Option<String>,

    /// The image configuration blob
    pub config: Descriptor,

    /// Filesystem layers
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// Digests needed to describe one tagged image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDigests {
    /// Digest of the image configuration blob
    pub config: String,
    /// Digest of the manifest itself, used to delete the image
    pub manifest: String,
}

/// Runtime configuration embedded in an image config blob.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContainerConfig {
    /// Image labels
    #[serde(rename = "Labels", default)]
    pub labels: Option<BTreeMap<String, String>>,

    /// Environment variables
    #[serde(rename = "Env", default)]
    pub env: Option<Vec<String>>,

    /// Default command
    #[serde(rename = "Cmd", default)]
    pub cmd: Option<Vec<String>>,

    /// Working directory
    #[serde(rename = "WorkingDir", default)]
    pub working_dir: Option<String>,
}

/// The image configuration blob referenced by a manifest.
///
/// Only the metadata needed to describe an image is decoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlobDescriptor {
    /// CPU architecture
    #[serde(default)]
    pub architecture: String,

    /// When the image was built
    pub created: DateTime<Utc>,

    /// Operating system
    #[serde(default)]
    pub os: String,

    /// Runtime configuration, including labels
    #[serde(default)]
    pub config: ContainerConfig,
}

impl BlobDescriptor {
    /// Image labels, empty if the image has none.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.config.labels.clone().unwrap_or_default()
    }
}
