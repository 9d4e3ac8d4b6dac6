use api_client::ApiClient;
use async_trait::async_trait;
use http::{StatusCode, Uri};

use crate::client::V2Client;
use crate::error::{RegistryError, RegistryResult};
use crate::models::{BlobDescriptor, BlobDigests, GcrTagList, Manifest};
use crate::{Registry, RegistryFlavor, SchemeAuth};

/// Registry server used when none is configured.
pub const GCR_DEFAULT_SERVER: &str = "https://gcr.io";

/// Compute instance metadata endpoint.
pub const GCE_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1/";

/// Google Container Registry.
///
/// Every repository lives under the cloud project, which is looked up once
/// when the client is created.
#[derive(Debug, Clone)]
pub struct GoogleContainerRegistry {
    client: V2Client,
    project: String,
}

impl GoogleContainerRegistry {
    /// Connect to `server`, discovering the project from the instance metadata service.
    pub async fn new(server: Uri, auth: SchemeAuth) -> RegistryResult<Self> {
        let metadata = ApiClient::new(Uri::from_static(GCE_METADATA_URL), ());
        Self::discover(ApiClient::new(server, auth), &metadata).await
    }

    /// Use an already configured API client, discovering the project through `metadata`.
    pub async fn discover(
        api: ApiClient<SchemeAuth>,
        metadata: &ApiClient<()>,
    ) -> RegistryResult<Self> {
        let project = lookup_project(metadata).await?;
        tracing::info!(%project, "using container registry project");
        Ok(Self::with_project(api, project))
    }

    /// Use an already configured API client and a known project.
    pub fn with_project<P: Into<String>>(api: ApiClient<SchemeAuth>, project: P) -> Self {
        let project = project.into();
        Self {
            client: V2Client::new(api, Some(project.clone())),
            project,
        }
    }

    /// Replace the credentials used for subsequent calls.
    pub fn refresh_auth(&self, auth: SchemeAuth) {
        self.client.api().refresh_auth(auth);
    }
}

/// Ask the metadata service for the current project id.
pub async fn lookup_project(metadata: &ApiClient<()>) -> RegistryResult<String> {
    let url = metadata.base().to_string();
    let lookup_error = |source: api_client::Error| RegistryError::ProjectLookup {
        url: url.clone(),
        source,
    };

    let response = metadata
        .get("project/project-id")
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(lookup_error)?
        .expect_status(StatusCode::OK)
        .await
        .map_err(|error| lookup_error(error.into()))?;

    let project = response
        .text()
        .await
        .map_err(|error| lookup_error(api_client::Error::ResponseBody(error)))?;

    Ok(project.trim().to_owned())
}

#[async_trait]
impl Registry for GoogleContainerRegistry {
    fn flavor(&self) -> RegistryFlavor {
        RegistryFlavor::Gcr
    }

    fn project_name(&self) -> &str {
        &self.project
    }

    /// GCR has no usable catalog, so children of `name` come from its tag listing.
    #[tracing::instrument(skip(self))]
    async fn list_repositories(&self, name_filter: Option<&str>) -> RegistryResult<Vec<String>> {
        let name = name_filter.unwrap_or_default();
        let operation = format!("list repositories under {}/{}", self.project, name);
        let request = self.client.api().get(&self.client.endpoint(name, "tags/list"));
        let response = self.client.call(&operation, request, StatusCode::OK).await?;
        let listing: GcrTagList = V2Client::json(&operation, response).await?;
        Ok(listing.child)
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

    /// Untag `name:tag`. GCR refuses to delete a manifest that is still tagged.
    async fn delete_image_tag(&self, name: &str, tag: &str) -> RegistryResult<()> {
        self.client.delete_manifest(name, tag).await
    }
}

#[cfg(test)]
mod tests {
    use api_client::mock::MockService;
    use http::{HeaderMap, Method};

    use super::*;

    fn registry(mock: MockService) -> GoogleContainerRegistry {
        GoogleContainerRegistry::with_project(
            ApiClient::new_with_inner_service(
                GCR_DEFAULT_SERVER.parse().unwrap(),
                SchemeAuth::bearer("ya29.token"),
                mock,
            ),
            "my-project",
        )
    }

    #[tokio::test]
    async fn discovers_project_from_metadata() {
        let mut metadata = MockService::new();
        metadata.add(
            "/computeMetadata/v1/project/project-id",
            StatusCode::OK,
            HeaderMap::new(),
            "my-project\n",
        );
        let metadata_client = ApiClient::new_with_inner_service(
            GCE_METADATA_URL.parse().unwrap(),
            (),
            metadata.clone(),
        );
        let api = ApiClient::new_with_inner_service(
            GCR_DEFAULT_SERVER.parse().unwrap(),
            SchemeAuth::anonymous(),
            MockService::new(),
        );

        let registry = GoogleContainerRegistry::discover(api, &metadata_client)
            .await
            .unwrap();
        assert_eq!(registry.project_name(), "my-project");
        assert_eq!(
            metadata.requests()[0].headers.get("Metadata-Flavor").unwrap(),
            "Google"
        );
    }

    #[tokio::test]
    async fn metadata_failure_is_reported() {
        let metadata_client = ApiClient::new_with_inner_service(
            GCE_METADATA_URL.parse().unwrap(),
            (),
            MockService::new(),
        );
        let api = ApiClient::new_with_inner_service(
            GCR_DEFAULT_SERVER.parse().unwrap(),
            SchemeAuth::anonymous(),
            MockService::new(),
        );

        let error = GoogleContainerRegistry::discover(api, &metadata_client)
            .await
            .unwrap_err();
        assert!(matches!(error, RegistryError::ProjectLookup { .. }));
    }

    #[tokio::test]
    async fn repositories_are_children() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/my-project/acme/tags/list",
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"child":["web","worker"],"manifest":{},"name":"my-project/acme","tags":[]}"#,
        );
        let registry = registry(mock.clone());

        let apps = registry.list_repositories(Some("acme")).await.unwrap();
        assert_eq!(apps, vec!["web", "worker"]);
        assert_eq!(
            mock.requests()[0]
                .headers
                .get(http::header::AUTHORIZATION)
                .unwrap(),
            "Bearer ya29.token"
        );
    }

    #[tokio::test]
    async fn paths_are_scoped_to_project() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/my-project/acme/web/tags/list",
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"name":"my-project/acme/web","tags":["1","2"]}"#,
        );
        mock.add_method(
            Method::DELETE,
            "/v2/my-project/acme/web/manifests/2",
            StatusCode::ACCEPTED,
            HeaderMap::new(),
            Vec::new(),
        );
        let registry = registry(mock);

        let tags = registry.list_image_tags("acme/web").await.unwrap();
        assert_eq!(tags, vec!["1", "2"]);

        registry.delete_image_tag("acme/web", "2").await.unwrap();
    }
}
