use api_client::ApiClient;
use async_trait::async_trait;
use http::{StatusCode, Uri};

use crate::client::V2Client;
use crate::error::{RegistryError, RegistryResult};
use crate::models::{BlobDescriptor, BlobDigests, Catalog, Manifest};
use crate::{filter_repos_by_root_name, Registry, RegistryFlavor, SchemeAuth};

/// A self-hosted registry speaking the plain Registry V2 API.
#[derive(Debug, Clone)]
pub struct PrivateRegistry {
    client: V2Client,
}

impl PrivateRegistry {
    /// Connect to the registry API at `server`.
    pub fn new(server: Uri, auth: SchemeAuth) -> Self {
        Self::from_client(ApiClient::new(server, auth))
    }

    /// Use an already configured API client.
    pub fn from_client(api: ApiClient<SchemeAuth>) -> Self {
        Self {
            client: V2Client::new(api, None),
        }
    }

    /// Replace the credentials used for subsequent calls.
    pub fn refresh_auth(&self, auth: SchemeAuth) {
        self.client.api().refresh_auth(auth);
    }
}

#[async_trait]
impl Registry for PrivateRegistry {
    fn flavor(&self) -> RegistryFlavor {
        RegistryFlavor::Private
    }

    fn project_name(&self) -> &str {
        ""
    }

    #[tracing::instrument(skip(self))]
    async fn list_repositories(&self, name_filter: Option<&str>) -> RegistryResult<Vec<String>> {
        let operation = "list repositories";
        let request = self.client.api().get("v2/_catalog");
        let response = self.client.call(operation, request, StatusCode::OK).await?;
        let catalog: Catalog = V2Client::json(operation, response).await?;
        let repositories = catalog.repositories.unwrap_or_default();

        Ok(match name_filter {
            Some(name) => filter_repos_by_root_name(&repositories, name),
            None => repositories,
        })
    }

    async fn list_image_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        self.client.list_image_tags(name).await
    }

    async fn image_manifest(&self, name: &str, tag: &str) -> RegistryResult<Manifest> {
        self.client.image_manifest(name, tag).await
    }

    async fn image_manifest_digest(&self, name: &str, tag: &str) -> RegistryResult<String> {
        self.client.image_manifest_digest(name, tag).await
    }

    async fn image_blob_digest(&self, name: &str, tag: &str) -> RegistryResult<BlobDigests> {
        self.client.image_blob_digest(name, tag).await
    }

    async fn image_blob(&self, name: &str, reference: &str) -> RegistryResult<BlobDescriptor> {
        self.client.image_blob(name, reference).await
    }

    async fn delete_image_manifest(&self, name: &str, reference: &str) -> RegistryResult<()> {
        self.client.delete_manifest(name, reference).await
    }

    async fn delete_image_tag(&self, name: &str, tag: &str) -> RegistryResult<()> {
        Err(RegistryError::Unsupported {
            operation: format!("delete tag {name}:{tag}"),
            flavor: self.flavor(),
        })
    }
}
