//! AWS Elastic Container Registry backend.

use std::collections::BTreeSet;

use api_client::BoxError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::config::Region;
use aws_sdk_ecr::types::{ImageDetail, ImageIdentifier};
use aws_sdk_ecr::Client;
use chrono::{DateTime, Utc};

use crate::creator::ImageCreator;
use crate::error::{Error, Result};
use crate::identity::{BuildRequest, ImageIdentity};
use crate::image::{managed_only, ManagedImage};
use crate::labels::{APP_LABEL, REPO_LABEL, REVISION_LABEL};
use crate::local::LocalImageCreator;
use crate::stream::Progress;

fn ecr_error<E: Into<BoxError>>(operation: &'static str) -> impl FnOnce(E) -> Error {
    move |source| Error::Ecr {
        operation,
        source: source.into(),
    }
}

/// Stores images in ECR, building and pushing through the local daemon.
///
/// Repositories are named `repo/application`. Pushing to an application with
/// no repository yet creates it.
#[derive(Debug, Clone)]
pub struct EcrImageCreator {
    client: Client,
    local: LocalImageCreator,
}

impl EcrImageCreator {
    /// Load AWS configuration for `region` and check that ECR answers.
    #[tracing::instrument(skip(local))]
    pub async fn connect(region: &str, local: LocalImageCreator) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        let client = Client::new(&config);

        client
            .describe_repositories()
            .max_results(1)
            .send()
            .await
            .map_err(ecr_error("describe repositories"))?;

        Ok(Self::new(client, local))
    }

    /// Use an already configured ECR client.
    pub fn new(client: Client, local: LocalImageCreator) -> Self {
        Self { client, local }
    }

    /// The local daemon creator used for builds and pushes.
    pub fn local(&self) -> &LocalImageCreator {
        &self.local
    }

    async fn repository_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let response = self
                .client
                .describe_repositories()
                .set_next_token(token.take())
                .send()
                .await
                .map_err(ecr_error("describe repositories"))?;

            names.extend(
                response
                    .repositories()
                    .iter()
                    .filter_map(|repository| repository.repository_name())
                    .map(str::to_owned),
            );

            token = response.next_token().map(str::to_owned);
            if token.is_none() {
                break;
            }
        }
        Ok(names)
    }

    async fn ensure_repository(&self, name: &str) -> Result<()> {
        let described = self
            .client
            .describe_repositories()
            .repository_names(name)
            .send()
            .await;

        match described {
            Ok(_) => Ok(()),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|error| error.is_repository_not_found_exception()) =>
            {
                tracing::info!(repository = %name, "creating repository");
                self.client
                    .create_repository()
                    .repository_name(name)
                    .send()
                    .await
                    .map_err(ecr_error("create repository"))?;
                Ok(())
            }
            Err(error) => Err(ecr_error("describe repositories")(error)),
        }
    }
}

/// Split an ECR repository name into `(repo, application)`.
///
/// Names without exactly two non-empty segments are not managed here.
pub(crate) fn split_repository(name: &str) -> Option<(&str, &str)> {
    let (repo, application) = name.split_once('/')?;
    if repo.is_empty() || application.is_empty() || application.contains('/') {
        return None;
    }
    Some((repo, application))
}

pub(crate) fn organizations_from(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| split_repository(name))
        .map(|(repo, _)| repo.to_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn applications_from(names: &[String], org: &str) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| split_repository(name))
        .filter(|(repo, _)| *repo == org)
        .map(|(_, application)| application.to_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Build a record for one image of `repository`.
///
/// Images with no tag or no digest are skipped.
pub(crate) fn image_record(
    repository: &str,
    digest: Option<&str>,
    tags: &[String],
    pushed_at: Option<DateTime<Utc>>,
    size: Option<i64>,
) -> Option<ManagedImage> {
    let Some(digest) = digest.filter(|digest| !digest.is_empty()) else {
        tracing::warn!(%repository, "skipping image without a digest");
        return None;
    };
    if tags.is_empty() {
        tracing::warn!(%repository, %digest, "skipping untagged image");
        return None;
    }

    let mut labels = std::collections::BTreeMap::new();
    if let Some((repo, application)) = split_repository(repository) {
        labels.insert(REPO_LABEL.to_owned(), repo.to_owned());
        labels.insert(APP_LABEL.to_owned(), application.to_owned());
        labels.insert(REVISION_LABEL.to_owned(), tags[0].clone());
    }

    Some(ManagedImage {
        id: digest.to_owned(),
        created: pushed_at,
        repo_tags: tags.iter().map(|tag| format!("{repository}:{tag}")).collect(),
        labels,
        size,
    })
}

fn detail_record(repository: &str, detail: &ImageDetail) -> Option<ManagedImage> {
    let pushed_at = detail
        .image_pushed_at()
        .and_then(|at| DateTime::from_timestamp(at.secs(), at.subsec_nanos()));
    image_record(
        repository,
        detail.image_digest(),
        detail.image_tags(),
        pushed_at,
        detail.image_size_in_bytes(),
    )
}

#[async_trait]
impl ImageCreator for EcrImageCreator {
    #[tracing::instrument(skip(self))]
    async fn organizations(&self) -> Result<Vec<String>> {
        let names = self.repository_names().await?;
        Ok(organizations_from(&names))
    }

    #[tracing::instrument(skip(self))]
    async fn applications(&self, repo: &str) -> Result<Vec<String>> {
        let names = self.repository_names().await?;
        Ok(applications_from(&names, repo))
    }

    #[tracing::instrument(skip(self))]
    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>> {
        let repository = format!("{repo}/{application}");
        let mut images = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let response = self
                .client
                .describe_images()
                .repository_name(&repository)
                .set_next_token(token.take())
                .send()
                .await
                .map_err(ecr_error("describe images"))?;

            images.extend(
                response
                    .image_details()
                    .iter()
                    .filter_map(|detail| detail_record(&repository, detail)),
            );

            token = response.next_token().map(str::to_owned);
            if token.is_none() {
                break;
            }
        }
        Ok(images)
    }

    #[tracing::instrument(skip(self), fields(image = %identity))]
    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>> {
        let repository = identity.image_name();
        let response = self
            .client
            .describe_images()
            .repository_name(&repository)
            .image_ids(ImageIdentifier::builder().image_tag(&identity.revision).build())
            .send()
            .await;

        match response {
            Ok(response) => Ok(response
                .image_details()
                .iter()
                .find_map(|detail| detail_record(&repository, detail))),
            Err(error)
                if error.as_service_error().is_some_and(|error| {
                    error.is_image_not_found_exception() || error.is_repository_not_found_exception()
                }) =>
            {
                Ok(None)
            }
            Err(error) => Err(ecr_error("describe images")(error)),
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
            let delete_error = |source: Error| Error::DeleteImage {
                id: image.id.clone(),
                application: repository.clone(),
                source: Box::new(source),
            };

            let response = self
                .client
                .batch_delete_image()
                .repository_name(&repository)
                .image_ids(ImageIdentifier::builder().image_digest(&image.id).build())
                .send()
                .await
                .map_err(|error| delete_error(ecr_error("batch delete image")(error)))?;

            if let Some(failure) = response.failures().first() {
                let reason = failure
                    .failure_reason()
                    .map(str::to_owned)
                    .or_else(|| failure.failure_code().map(|code| code.as_str().to_owned()))
                    .unwrap_or_else(|| "unknown failure".to_owned());
                return Err(delete_error(ecr_error("batch delete image")(reason)));
            }
            tracing::debug!(id = %image.id, "deleted image from ecr");
        }
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest) -> Result<Progress> {
        self.local.build_image(request).await
    }

    #[tracing::instrument(skip(self), fields(image = %identity))]
    async fn push_image(&self, identity: &ImageIdentity) -> Result<Progress> {
        self.ensure_repository(&identity.image_name()).await?;
        self.local.push_image(identity).await
    }

    fn remote_repo(&self) -> &str {
        self.local.remote_repo()
    }
}
