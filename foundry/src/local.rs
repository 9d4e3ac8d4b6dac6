use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use api_client::BoxError;
use credentials::CredentialSource;
use docker::{BuildOptions, DockerClient, LabelFilter, RemovedImage};
use futures::{StreamExt as _, TryStreamExt as _};
use tokio_util::io::ReaderStream;

use crate::config::DEFAULT_BUFFER_LINES;
use crate::creator::ImageCreator;
use crate::error::{Error, Result};
use crate::identity::{BuildRequest, ImageIdentity};
use crate::image::{managed_only, ManagedImage};
use crate::labels::{APP_LABEL, REPO_LABEL, REVISION_LABEL};
use crate::stream::{self, Progress, StreamKind};

/// Builds and stores images with the local daemon only.
///
/// Images are found through the management labels set at build time.
#[derive(Debug, Clone)]
pub struct LocalImageCreator {
    docker: DockerClient,
    remote_repo: String,
    credentials: Arc<dyn CredentialSource>,
    buffer_lines: usize,
}

impl LocalImageCreator {
    /// Use `docker`, tagging pushed images under `remote_repo`.
    pub fn new(
        docker: DockerClient,
        remote_repo: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            docker,
            remote_repo: remote_repo.into(),
            credentials,
            buffer_lines: DEFAULT_BUFFER_LINES,
        }
    }

    /// Like [`LocalImageCreator::new`], but check that the daemon answers first.
    #[tracing::instrument(skip(docker, credentials), fields(daemon = %docker.base()))]
    pub async fn connect(
        docker: DockerClient,
        remote_repo: impl Into<String>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self> {
        docker.ping().await?;
        Ok(Self::new(docker, remote_repo, credentials))
    }

    /// Buffer up to `lines` lines of build and push output.
    pub fn with_buffer_lines(mut self, lines: usize) -> Self {
        self.buffer_lines = lines;
        self
    }

    /// Tag pushed images under `remote_repo` instead.
    pub fn with_remote_repo(mut self, remote_repo: impl Into<String>) -> Self {
        self.remote_repo = remote_repo.into();
        self
    }

    /// The daemon client.
    pub fn docker(&self) -> &DockerClient {
        &self.docker
    }

    async fn list(&self, filter: LabelFilter) -> Result<Vec<ManagedImage>> {
        let images = self.docker.list_images(&filter).await?;
        Ok(images.into_iter().map(ManagedImage::from).collect())
    }

    fn registry_auth(&self) -> Result<String> {
        let server = self
            .remote_repo
            .split('/')
            .next()
            .unwrap_or(self.remote_repo.as_str());
        let auth = self
            .credentials
            .registry_auth(server)
            .map_err(|source| Error::Credentials {
                server: server.to_owned(),
                source,
            })?;
        if auth.is_anonymous() {
            tracing::debug!(%server, "pushing without registry credentials");
        }
        auth.encode().map_err(Error::EncodeCredentials)
    }
}

fn distinct_label(images: &[ManagedImage], label: &str) -> Vec<String> {
    images
        .iter()
        .filter_map(|image| image.labels.get(label))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl ImageCreator for LocalImageCreator {
    #[tracing::instrument(skip(self))]
    async fn organizations(&self) -> Result<Vec<String>> {
        let images = self.list(LabelFilter::new()).await?;
        Ok(distinct_label(&images, REPO_LABEL))
    }

    #[tracing::instrument(skip(self))]
    async fn applications(&self, repo: &str) -> Result<Vec<String>> {
        let images = self
            .list(LabelFilter::new().label(REPO_LABEL, repo))
            .await?;
        Ok(distinct_label(&images, APP_LABEL))
    }

    #[tracing::instrument(skip(self))]
    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>> {
        self.list(
            LabelFilter::new()
                .label(REPO_LABEL, repo)
                .label(APP_LABEL, application),
        )
        .await
    }

    #[tracing::instrument(skip(self), fields(image = %identity))]
    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>> {
        let images = self
            .list(
                LabelFilter::new()
                    .label(REPO_LABEL, &identity.repo)
                    .label(APP_LABEL, &identity.application)
                    .label(REVISION_LABEL, &identity.revision),
            )
            .await?;
        Ok(images.into_iter().next())
    }

    #[tracing::instrument(skip(self))]
    async fn local_images(&self) -> Result<Vec<ManagedImage>> {
        self.list(LabelFilter::new()).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_image_revision_local(&self, id: &str) -> Result<()> {
        let removed = match self.docker.remove_image(id, true, true).await {
            Ok(removed) => removed,
            Err(error) if error.is_not_found() => {
                return Err(Error::NotFound { id: id.to_owned() })
            }
            Err(error) => return Err(error.into()),
        };

        if removed.is_empty() {
            return Err(Error::NotFound { id: id.to_owned() });
        }

        let deleted = removed
            .iter()
            .filter(|entry| matches!(entry, RemovedImage::Deleted(_)))
            .count();
        tracing::debug!(%id, deleted, untagged = removed.len() - deleted, "removed local image");
        Ok(())
    }

    #[tracing::instrument(skip(self, images), fields(application = %identity.image_name(), count = images.len()))]
    async fn delete_application(
        &self,
        identity: &ImageIdentity,
        images: &[ManagedImage],
    ) -> Result<()> {
        for image in managed_only(images, identity) {
            self.docker
                .remove_image(&image.id, true, false)
                .await
                .map_err(|error| Error::DeleteImage {
                    id: image.id.clone(),
                    application: identity.image_name(),
                    source: Box::new(error.into()),
                })?;
            tracing::debug!(id = %image.id, "deleted image");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(image = %request.identity, context = %request.tar_file))]
    async fn build_image(&self, request: &BuildRequest) -> Result<Progress> {
        let context = tokio::fs::File::open(&request.tar_file)
            .await
            .map_err(|source| Error::BuildContext {
                path: request.tar_file.clone(),
                source,
            })?;
        let context = ReaderStream::new(context).map_err(BoxError::from).boxed();

        let options = BuildOptions {
            tag: request.identity.tag_name(),
            force_rm: true,
            rm: true,
            no_cache: true,
            labels: request.identity.labels(),
        };

        let body = self
            .docker
            .build_image(context, &options)
            .await?;
        tracing::info!(tag = %options.tag, "build started");
        Ok(stream::decode(StreamKind::Build, body, self.buffer_lines))
    }

    #[tracing::instrument(skip(self), fields(image = %identity, remote = %self.remote_repo))]
    async fn push_image(&self, identity: &ImageIdentity) -> Result<Progress> {
        let remote_path = identity.remote_tag_path(&self.remote_repo);
        self.docker
            .tag_image(&identity.tag_name(), &remote_path, &identity.revision, true)
            .await?;

        let registry_auth = self.registry_auth()?;
        let body = self
            .docker
            .push_image(&remote_path, &identity.revision, &registry_auth)
            .await?;
        tracing::info!(remote = %remote_path, "push started");
        Ok(stream::decode(StreamKind::Push, body, self.buffer_lines))
    }

    fn remote_repo(&self) -> &str {
        &self.remote_repo
    }
}
