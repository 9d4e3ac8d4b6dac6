//! # Registry V2 client
//!
//! A client for the [Docker Registry HTTP API V2](https://distribution.github.io/distribution/spec/api/),
//! covering the calls needed to inventory and delete images: repository and tag
//! listings, manifests, digests and image config blobs.
//!
//! Two flavors are provided behind the [`Registry`] trait:
//!
//! - [`PrivateRegistry`] for self-hosted registries
//! - [`GoogleContainerRegistry`] for GCR, where repositories are scoped to a cloud project
//!
//! [`RegistryClient`] holds either one when the flavor comes from configuration.
//!
//! ## Example
//!
//! ```no_run
//! use registry::{PrivateRegistry, Registry, SchemeAuth};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = PrivateRegistry::new(
//!     "https://registry.example.com".parse()?,
//!     SchemeAuth::bearer("token"),
//! );
//!
//! for app in registry.list_repositories(Some("acme")).await? {
//!     println!("{app}: {:?}", registry.list_image_tags(&app).await?);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use async_trait::async_trait;

mod auth;
mod client;
mod error;
mod gcr;
pub mod models;
mod private;

pub use self::auth::SchemeAuth;
pub use self::error::{RegistryError, RegistryResult};
pub use self::gcr::{lookup_project, GoogleContainerRegistry, GCE_METADATA_URL, GCR_DEFAULT_SERVER};
pub use self::models::{BlobDescriptor, BlobDigests, Manifest};
pub use self::private::PrivateRegistry;

/// Which registry implementation is on the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFlavor {
    /// A plain Registry V2 server
    Private,
    /// Google Container Registry
    Gcr,
}

impl fmt::Display for RegistryFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryFlavor::Private => f.write_str("private"),
            RegistryFlavor::Gcr => f.write_str("gcr"),
        }
    }
}

/// Image inventory and deletion against a remote registry.
///
/// Every call checks the response against the single status it expects. Any
/// other status is an error, never an empty result.
#[async_trait]
pub trait Registry: fmt::Debug + Send + Sync {
    /// The registry implementation.
    fn flavor(&self) -> RegistryFlavor;

    /// Cloud project repositories are scoped to, empty when there is none.
    fn project_name(&self) -> &str;

    /// Repositories, optionally restricted to those under `name_filter`.
    async fn list_repositories(&self, name_filter: Option<&str>) -> RegistryResult<Vec<String>>;

    /// Tags of repository `name`.
    async fn list_image_tags(&self, name: &str) -> RegistryResult<Vec<String>>;

    /// The V2 manifest of `name:tag`.
    async fn image_manifest(&self, name: &str, tag: &str) -> RegistryResult<Manifest>;

    /// The digest of the manifest for `name:tag`, without downloading it.
    async fn image_manifest_digest(&self, name: &str, tag: &str) -> RegistryResult<String>;

    /// The config blob digest and manifest digest of `name:tag`.
    async fn image_blob_digest(&self, name: &str, tag: &str) -> RegistryResult<BlobDigests>;

    /// The image config blob `reference` in repository `name`.
    async fn image_blob(&self, name: &str, reference: &str) -> RegistryResult<BlobDescriptor>;

    /// Delete a manifest. `reference` must be a digest.
    async fn delete_image_manifest(&self, name: &str, reference: &str) -> RegistryResult<()>;

    /// Remove a tag without deleting the manifest it points to.
    async fn delete_image_tag(&self, name: &str, tag: &str) -> RegistryResult<()>;
}

/// One of the supported registry flavors, chosen at runtime.
#[derive(Debug, Clone)]
pub enum RegistryClient {
    /// A plain Registry V2 server
    Private(PrivateRegistry),
    /// Google Container Registry
    Gcr(GoogleContainerRegistry),
}

impl From<PrivateRegistry> for RegistryClient {
    fn from(registry: PrivateRegistry) -> Self {
        RegistryClient::Private(registry)
    }
}

impl From<GoogleContainerRegistry> for RegistryClient {
    fn from(registry: GoogleContainerRegistry) -> Self {
        RegistryClient::Gcr(registry)
    }
}

macro_rules! dispatch {
    ($self:ident, $registry:ident => $call:expr) => {
        match $self {
            RegistryClient::Private($registry) => $call,
            RegistryClient::Gcr($registry) => $call,
        }
    };
}

#[async_trait]
impl Registry for RegistryClient {
    fn flavor(&self) -> RegistryFlavor {
        dispatch!(self, registry => registry.flavor())
    }

    fn project_name(&self) -> &str {
        dispatch!(self, registry => registry.project_name())
    }

    async fn list_repositories(&self, name_filter: Option<&str>) -> RegistryResult<Vec<String>> {
        dispatch!(self, registry => registry.list_repositories(name_filter).await)
    }

    async fn list_image_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        dispatch!(self, registry => registry.list_image_tags(name).await)
    }

    async fn image_manifest(&self, name: &str, tag: &str) -> RegistryResult<Manifest> {
        dispatch!(self, registry => registry.image_manifest(name, tag).await)
    }

    async fn image_manifest_digest(&self, name: &str, tag: &str) -> RegistryResult<String> {
        dispatch!(self, registry => registry.image_manifest_digest(name, tag).await)
    }

    async fn image_blob_digest(&self, name: &str, tag: &str) -> RegistryResult<BlobDigests> {
        dispatch!(self, registry => registry.image_blob_digest(name, tag).await)
    }

    async fn image_blob(&self, name: &str, reference: &str) -> RegistryResult<BlobDescriptor> {
        dispatch!(self, registry => registry.image_blob(name, reference).await)
    }

    async fn delete_image_manifest(&self, name: &str, reference: &str) -> RegistryResult<()> {
        dispatch!(self, registry => registry.delete_image_manifest(name, reference).await)
    }

    async fn delete_image_tag(&self, name: &str, tag: &str) -> RegistryResult<()> {
        dispatch!(self, registry => registry.delete_image_tag(name, tag).await)
    }
}

/// Keep repository paths whose first segment is exactly `name`.
///
/// Paths without a `/` never match.
pub fn filter_repos_by_root_name(repos: &[String], name: &str) -> Vec<String> {
    repos
        .iter()
        .filter(|repo| matches!(repo.split_once('/'), Some((root, _)) if root == name))
        .cloned()
        .collect()
}
