use std::fmt;
use std::sync::Arc;

use api_client::ApiClient;
use async_trait::async_trait;
use credentials::{CredentialSource, DockerConfigCredentials};
use docker::DockerClient;
use registry::{GoogleContainerRegistry, PrivateRegistry, RegistryClient};

use crate::config::{FoundryConfig, Provider};
use crate::error::Result;
use crate::hosted::RegistryImageCreator;
use crate::identity::{BuildRequest, ImageIdentity};
use crate::image::ManagedImage;
use crate::local::LocalImageCreator;
use crate::stream::Progress;

#[cfg(feature = "ecr")]
use crate::ecr::EcrImageCreator;

/// Builds, pushes, lists and deletes images on one backend.
#[async_trait]
pub trait ImageCreator: fmt::Debug + Send + Sync {
    /// Distinct repositories (organizations) with at least one image.
    async fn organizations(&self) -> Result<Vec<String>>;

    /// Distinct applications within `repo`.
    async fn applications(&self, repo: &str) -> Result<Vec<String>>;

    /// Every image of `repo/application`.
    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>>;

    /// The image for one revision, `None` if it does not exist.
    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>>;

    /// Every image held by the local daemon, managed or not.
    async fn local_images(&self) -> Result<Vec<ManagedImage>>;

    /// Force-remove one image from the local daemon.
    async fn delete_image_revision_local(&self, id: &str) -> Result<()>;

    /// Delete `images` of the application named by `identity`, stopping at the first failure.
    async fn delete_application(
        &self,
        identity: &ImageIdentity,
        images: &[ManagedImage],
    ) -> Result<()>;

    /// Start building an image, returning its progress output.
    async fn build_image(&self, request: &BuildRequest) -> Result<Progress>;

    /// Tag and push a built image, returning its progress output.
    async fn push_image(&self, identity: &ImageIdentity) -> Result<Progress>;

    /// Registry prefix pushed images are tagged under.
    fn remote_repo(&self) -> &str;

    /// Fully qualified reference of the pushed image.
    fn repo_uri(&self, identity: &ImageIdentity) -> String {
        identity.remote_tag_name(self.remote_repo())
    }
}

/// The image backend picked by configuration.
#[derive(Debug)]
pub enum Creator {
    /// Local daemon only
    Local(LocalImageCreator),
    /// Private registry or GCR
    Registry(RegistryImageCreator<RegistryClient>),
    /// AWS ECR
    #[cfg(feature = "ecr")]
    Ecr(EcrImageCreator),
}

impl Creator {
    /// Connect to the backend described by `config`.
    ///
    /// Every backend checks that the daemon answers. GCR also looks up its
    /// project and ECR checks that the registry is reachable.
    #[tracing::instrument(skip(config), fields(provider = %config.provider))]
    pub async fn from_config(config: &FoundryConfig) -> Result<Self> {
        config.validate()?;

        let docker = DockerClient::from_host(&config.docker_host, config.docker_api_version.as_deref())?;
        let credentials: Arc<dyn CredentialSource> = Arc::new(DockerConfigCredentials::from_env());
        let local = LocalImageCreator::connect(docker, config.registry_url.clone(), credentials)
            .await?
            .with_buffer_lines(config.buffer_lines);

        let creator = match config.provider {
            Provider::Docker => Creator::Local(local),
            Provider::Private => {
                let registry = PrivateRegistry::new(config.registry_api_uri()?, config.scheme_auth());
                Creator::Registry(RegistryImageCreator::new(registry.into(), local))
            }
            Provider::Gcr => {
                let metadata = ApiClient::new(config.metadata_uri()?, ());
                let api = ApiClient::new(config.registry_api_uri()?, config.scheme_auth());
                let registry = GoogleContainerRegistry::discover(api, &metadata).await?;
                Creator::Registry(RegistryImageCreator::new(registry.into(), local))
            }
            #[cfg(feature = "ecr")]
            Provider::Ecr => {
                let region = config.ecr_region.as_deref().unwrap_or_default();
                Creator::Ecr(EcrImageCreator::connect(region, local).await?)
            }
            #[cfg(not(feature = "ecr"))]
            Provider::Ecr => {
                return Err(crate::config::ConfigError::FeatureDisabled {
                    provider: config.provider,
                }
                .into())
            }
        };

        tracing::info!(remote = %creator.remote_repo(), "image backend ready");
        Ok(creator)
    }
}

impl From<LocalImageCreator> for Creator {
    fn from(creator: LocalImageCreator) -> Self {
        Creator::Local(creator)
    }
}

impl From<RegistryImageCreator<RegistryClient>> for Creator {
    fn from(creator: RegistryImageCreator<RegistryClient>) -> Self {
        Creator::Registry(creator)
    }
}

#[cfg(feature = "ecr")]
impl From<EcrImageCreator> for Creator {
    fn from(creator: EcrImageCreator) -> Self {
        Creator::Ecr(creator)
    }
}

macro_rules! delegate {
    ($self:ident, $creator:ident => $call:expr) => {
        match $self {
            Creator::Local($creator) => $call,
            Creator::Registry($creator) => $call,
            #[cfg(feature = "ecr")]
            Creator::Ecr($creator) => $call,
        }
    };
}

#[async_trait]
impl ImageCreator for Creator {
    async fn organizations(&self) -> Result<Vec<String>> {
        delegate!(self, creator => creator.organizations().await)
    }

    async fn applications(&self, repo: &str) -> Result<Vec<String>> {
        delegate!(self, creator => creator.applications(repo).await)
    }

    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>> {
        delegate!(self, creator => creator.images(repo, application).await)
    }

    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>> {
        delegate!(self, creator => creator.image_revision(identity).await)
    }

    async fn local_images(&self) -> Result<Vec<ManagedImage>> {
        delegate!(self, creator => creator.local_images().await)
    }

    async fn delete_image_revision_local(&self, id: &str) -> Result<()> {
        delegate!(self, creator => creator.delete_image_revision_local(id).await)
    }

    async fn delete_application(
        &self,
        identity: &ImageIdentity,
        images: &[ManagedImage],
    ) -> Result<()> {
        delegate!(self, creator => creator.delete_application(identity, images).await)
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<Progress> {
        delegate!(self, creator => creator.build_image(request).await)
    }

    async fn push_image(&self, identity: &ImageIdentity) -> Result<Progress> {
        delegate!(self, creator => creator.push_image(identity).await)
    }

    fn remote_repo(&self) -> &str {
        delegate!(self, creator => creator.remote_repo())
    }
}

#[async_trait]
impl<C: ImageCreator + ?Sized> ImageCreator for Arc<C> {
    async fn organizations(&self) -> Result<Vec<String>> {
        (**self).organizations().await
    }

    async fn applications(&self, repo: &str) -> Result<Vec<String>> {
        (**self).applications(repo).await
    }

    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>> {
        (**self).images(repo, application).await
    }

    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>> {
        (**self).image_revision(identity).await
    }

    async fn local_images(&self) -> Result<Vec<ManagedImage>> {
        (**self).local_images().await
    }

    async fn delete_image_revision_local(&self, id: &str) -> Result<()> {
        (**self).delete_image_revision_local(id).await
    }

    async fn delete_application(
        &self,
        identity: &ImageIdentity,
        images: &[ManagedImage],
    ) -> Result<()> {
        (**self).delete_application(identity, images).await
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<Progress> {
        (**self).build_image(request).await
    }

    async fn push_image(&self, identity: &ImageIdentity) -> Result<Progress> {
        (**self).push_image(identity).await
    }

    fn remote_repo(&self) -> &str {
        (**self).remote_repo()
    }
}
