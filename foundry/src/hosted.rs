use async_trait::async_trait;
use registry::{Registry, RegistryClient, RegistryError, RegistryFlavor};

use crate::creator::ImageCreator;
use crate::error::{Error, Result};
use crate::identity::{BuildRequest, ImageIdentity};
use crate::image::{managed_only, ManagedImage};
use crate::local::LocalImageCreator;
use crate::stream::Progress;

/// Stores images in a Registry V2 server, building and pushing through the
/// local daemon.
///
/// Inventory comes from the registry: one record per tag, identified by its
/// manifest digest.
#[derive(Debug)]
pub struct RegistryImageCreator<R = RegistryClient> {
    registry: R,
    local: LocalImageCreator,
}

impl<R: Registry> RegistryImageCreator<R> {
    /// Combine `registry` with a local daemon creator.
    ///
    /// When the registry is scoped to a project, pushed images are tagged
    /// under `remote_repo/project`.
    pub fn new(registry: R, local: LocalImageCreator) -> Self {
        let project = registry.project_name();
        let local = if project.is_empty() {
            local
        } else {
            let remote = format!("{}/{}", local.remote_repo(), project);
            local.with_remote_repo(remote)
        };
        Self { registry, local }
    }

    /// The registry client.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The local daemon creator used for builds and pushes.
    pub fn local(&self) -> &LocalImageCreator {
        &self.local
    }

    async fn inspect(&self, repository: &str, tag: &str) -> Result<ManagedImage, RegistryError> {
        let digests = self.registry.image_blob_digest(repository, tag).await?;
        let blob = self.registry.image_blob(repository, &digests.config).await?;
        Ok(ManagedImage {
            id: digests.manifest,
            created: Some(blob.created),
            repo_tags: vec![format!("{repository}:{tag}")],
            labels: blob.labels(),
            size: None,
        })
    }

    async fn delete_one(&self, repository: &str, image: &ManagedImage) -> Result<()> {
        if self.registry.flavor() == RegistryFlavor::Gcr {
            let tag = image
                .first_tag()
                .ok_or_else(|| Error::MissingTag {
                    id: image.id.clone(),
                })?;
            self.registry.delete_image_tag(repository, tag).await?;
        }
        self.registry
            .delete_image_manifest(repository, &image.id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<R: Registry> ImageCreator for RegistryImageCreator<R> {
    async fn organizations(&self) -> Result<Vec<String>> {
        Err(Error::Unsupported {
            operation: "list organizations",
            backend: "registry",
        })
    }

    #[tracing::instrument(skip(self), fields(flavor = %self.registry.flavor()))]
    async fn applications(&self, repo: &str) -> Result<Vec<String>> {
        let prefix = format!("{repo}/");
        let repositories = self.registry.list_repositories(Some(repo)).await?;
        Ok(repositories
            .into_iter()
            .map(|name| match name.strip_prefix(&prefix) {
                Some(application) => application.to_owned(),
                None => name,
            })
            .collect())
    }

    #[tracing::instrument(skip(self), fields(flavor = %self.registry.flavor()))]
    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>> {
        let repository = format!("{repo}/{application}");
        let tags = self.registry.list_image_tags(&repository).await?;

        let mut images = Vec::with_capacity(tags.len());
        for tag in tags {
            let image = self
                .inspect(&repository, &tag)
                .await
                .map_err(|source| Error::Inventory {
                    repository: repository.clone(),
                    tag: tag.clone(),
                    source,
                })?;
            images.push(image);
        }
        Ok(images)
    }

    #[tracing::instrument(skip(self), fields(image = %identity, flavor = %self.registry.flavor()))]
    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>> {
        let repository = identity.image_name();
        match self.inspect(&repository, &identity.revision).await {
            Ok(image) => Ok(Some(image)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(source) => Err(Error::Inventory {
                repository,
                tag: identity.revision.clone(),
                source,
            }),
        }
    }

    async fn local_images(&self) -> Result<Vec<ManagedImage>> {
        self.local.local_images().await
    }

    async fn delete_image_revision_local(&self, id: &str) -> Result<()> {
        self.local.delete_image_revision_local(id).await
    }

    #[tracing::instrument(skip(self, images), fields(application = %identity.image_name(), count = images.len()))]
    async fn delete_application(
        &self,
        identity: &ImageIdentity,
        images: &[ManagedImage],
    ) -> Result<()> {
        let repository = identity.image_name();
        for image in managed_only(images, identity) {
            self.delete_one(&repository, image)
                .await
                .map_err(|error| Error::DeleteImage {
                    id: image.id.clone(),
                    application: repository.clone(),
                    source: Box::new(error),
                })?;
            tracing::debug!(id = %image.id, "deleted image from registry");
        }
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<Progress> {
        self.local.build_image(request).await
    }

    async fn push_image(&self, identity: &ImageIdentity) -> Result<Progress> {
        self.local.push_image(identity).await
    }

    fn remote_repo(&self) -> &str {
        self.local.remote_repo()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use api_client::mock::MockService;
    use api_client::ApiClient;
    use credentials::StaticCredentials;
    use docker::DockerClient;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use registry::{GoogleContainerRegistry, PrivateRegistry, SchemeAuth};

    use super::*;

    const CONFIG_DIGEST: &str = "sha256:c0ffee";

    fn local() -> LocalImageCreator {
        let docker = DockerClient::from_client(ApiClient::new_with_inner_service(
            "http://daemon.test/".parse().unwrap(),
            (),
            MockService::new(),
        ));
        LocalImageCreator::new(docker, "registry.test", Arc::new(StaticCredentials::default()))
    }

    fn api(mock: MockService) -> ApiClient<SchemeAuth> {
        ApiClient::new_with_inner_service(
            "https://registry.test/".parse().unwrap(),
            SchemeAuth::anonymous(),
            mock,
        )
    }

    fn manifest(mock: &mut MockService, path: &str, digest: &'static str) {
        let mut headers = HeaderMap::new();
        headers.insert("Docker-Content-Digest", HeaderValue::from_static(digest));
        mock.add_method(
            Method::GET,
            path,
            StatusCode::OK,
            headers,
            format!(
                r#"{{"schemaVersion":2,"mediaType":"application/vnd.docker.distribution.manifest.v2+json","config":{{"mediaType":"application/vnd.docker.container.image.v1+json","size":1,"digest":"{CONFIG_DIGEST}"}},"layers":[]}}"#
            ),
        );
    }

    fn blob(mock: &mut MockService, repository: &str) {
        mock.add_method(
            Method::GET,
            &format!("/v2/{repository}/blobs/{CONFIG_DIGEST}"),
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"architecture":"amd64","os":"linux","created":"2024-05-01T12:00:00Z","config":{"Labels":{"dev.foundry.repo":"acme","dev.foundry.app":"web"}}}"#,
        );
    }

    #[tokio::test]
    async fn images_use_manifest_digest_as_id() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/acme/web/tags/list",
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"name":"acme/web","tags":["1","2"]}"#,
        );
        manifest(&mut mock, "/v2/acme/web/manifests/1", "sha256:m1");
        manifest(&mut mock, "/v2/acme/web/manifests/2", "sha256:m2");
        blob(&mut mock, "acme/web");

        let creator = RegistryImageCreator::new(PrivateRegistry::from_client(api(mock)), local());
        let images = creator.images("acme", "web").await.unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].id, "sha256:m1");
        assert_eq!(images[1].repo_tags, vec!["acme/web:2".to_owned()]);
        assert!(images[1].is_managed());
        assert_eq!(
            images[0].created.unwrap().to_rfc3339(),
            "2024-05-01T12:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn one_failed_tag_fails_the_listing() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/acme/web/tags/list",
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"name":"acme/web","tags":["1","2"]}"#,
        );
        manifest(&mut mock, "/v2/acme/web/manifests/1", "sha256:m1");
        blob(&mut mock, "acme/web");

        let creator = RegistryImageCreator::new(PrivateRegistry::from_client(api(mock)), local());
        let error = creator.images("acme", "web").await.unwrap_err();
        match error {
            Error::Inventory { repository, tag, .. } => {
                assert_eq!(repository, "acme/web");
                assert_eq!(tag, "2");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_revision_is_none() {
        let creator = RegistryImageCreator::new(
            PrivateRegistry::from_client(api(MockService::new())),
            local(),
        );
        let found = creator
            .image_revision(&ImageIdentity::new("acme", "web", "7"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn applications_strip_repo_prefix() {
        let mut mock = MockService::new();
        mock.add(
            "/v2/_catalog",
            StatusCode::OK,
            HeaderMap::new(),
            r#"{"repositories":["acme/api","acme/web","beta/web"]}"#,
        );
        let creator = RegistryImageCreator::new(PrivateRegistry::from_client(api(mock)), local());

        assert_eq!(
            creator.applications("acme").await.unwrap(),
            vec!["api".to_owned(), "web".to_owned()]
        );
        assert!(matches!(
            creator.organizations().await,
            Err(Error::Unsupported { .. })
        ));
    }

    fn record(id: &str, tag: &str) -> ManagedImage {
        ManagedImage {
            id: id.to_owned(),
            created: None,
            repo_tags: vec![format!("acme/web:{tag}")],
            labels: ImageIdentity::new("acme", "web", tag).labels(),
            size: None,
        }
    }

    #[tokio::test]
    async fn gcr_deletes_tag_before_manifest() {
        let mut mock = MockService::new();
        for reference in ["1", "sha256:m1", "2", "sha256:m2"] {
            mock.add_method(
                Method::DELETE,
                &format!("/v2/proj/acme/web/manifests/{reference}"),
                StatusCode::ACCEPTED,
                HeaderMap::new(),
                "",
            );
        }
        let gcr = GoogleContainerRegistry::with_project(api(mock.clone()), "proj");
        let creator = RegistryImageCreator::new(gcr, local());
        assert_eq!(creator.remote_repo(), "registry.test/proj");

        creator
            .delete_application(
                &ImageIdentity::new("acme", "web", ""),
                &[record("sha256:m1", "1"), record("sha256:m2", "2")],
            )
            .await
            .unwrap();

        let paths: Vec<String> = mock
            .requests()
            .iter()
            .map(|request| request.uri.path().to_owned())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/v2/proj/acme/web/manifests/1",
                "/v2/proj/acme/web/manifests/sha256:m1",
                "/v2/proj/acme/web/manifests/2",
                "/v2/proj/acme/web/manifests/sha256:m2",
            ]
        );
    }

    #[tokio::test]
    async fn unmanaged_records_are_never_deleted() {
        let mock = MockService::new();
        let gcr = GoogleContainerRegistry::with_project(api(mock.clone()), "proj");
        let creator = RegistryImageCreator::new(gcr, local());
        let mut stray = record("sha256:m9", "9");
        stray.labels.clear();

        creator
            .delete_application(&ImageIdentity::new("acme", "web", ""), &[stray])
            .await
            .unwrap();
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn private_delete_skips_tags_and_reports_failures() {
        let mut mock = MockService::new();
        mock.add_method(
            Method::DELETE,
            "/v2/acme/web/manifests/sha256:m1",
            StatusCode::ACCEPTED,
            HeaderMap::new(),
            "",
        );
        let creator = RegistryImageCreator::new(PrivateRegistry::from_client(api(mock.clone())), local());

        let error = creator
            .delete_application(
                &ImageIdentity::new("acme", "web", ""),
                &[record("sha256:m1", "1"), record("sha256:m2", "2")],
            )
            .await
            .unwrap_err();
        assert!(matches!(error, Error::DeleteImage { ref id, .. } if id == "sha256:m2"));
        assert_eq!(mock.requests().len(), 2);
    }
}
