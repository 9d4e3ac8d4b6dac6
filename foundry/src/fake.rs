//! In-memory creator for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::creator::ImageCreator;
use crate::error::{Error, Result};
use crate::identity::{BuildRequest, ImageIdentity};
use crate::image::ManagedImage;
use crate::stream::Progress;

#[derive(Debug, Default)]
pub(crate) struct FakeCreator {
    local: Mutex<Vec<ManagedImage>>,
    remote: Mutex<Vec<ManagedImage>>,
    failing: HashSet<String>,
    deleted: Mutex<Vec<String>>,
    listings: AtomicUsize,
}

impl FakeCreator {
    pub(crate) fn with_local(images: Vec<ManagedImage>) -> Self {
        Self {
            local: Mutex::new(images),
            ..Default::default()
        }
    }

    pub(crate) fn with_images(images: Vec<ManagedImage>) -> Self {
        Self {
            remote: Mutex::new(images),
            ..Default::default()
        }
    }

    pub(crate) fn failing_delete(mut self, id: &str) -> Self {
        self.failing.insert(id.to_owned());
        self
    }

    pub(crate) fn add_image(&self, image: ManagedImage) {
        self.remote.lock().push(image);
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    pub(crate) fn local_listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageCreator for FakeCreator {
    async fn organizations(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn applications(&self, _repo: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn images(&self, repo: &str, application: &str) -> Result<Vec<ManagedImage>> {
        Ok(self
            .remote
            .lock()
            .iter()
            .filter(|image| image.repo() == Some(repo) && image.application() == Some(application))
            .cloned()
            .collect())
    }

    async fn image_revision(&self, identity: &ImageIdentity) -> Result<Option<ManagedImage>> {
        let images = self.images(&identity.repo, &identity.application).await?;
        Ok(images
            .into_iter()
            .find(|image| image.revision() == Some(identity.revision.as_str())))
    }

    async fn local_images(&self) -> Result<Vec<ManagedImage>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.local.lock().clone())
    }

    async fn delete_image_revision_local(&self, id: &str) -> Result<()> {
        if self.failing.contains(id) {
            return Err(Error::NotFound { id: id.to_owned() });
        }
        self.local.lock().retain(|image| image.id != id);
        self.deleted.lock().push(id.to_owned());
        Ok(())
    }

    async fn delete_application(
        &self,
        _identity: &ImageIdentity,
        images: &[ManagedImage],
    ) -> Result<()> {
        for image in images {
            self.deleted.lock().push(image.id.clone());
        }
        Ok(())
    }

    async fn build_image(&self, _request: &BuildRequest) -> Result<Progress> {
        Err(Error::Unsupported {
            operation: "build image",
            backend: "fake",
        })
    }

    async fn push_image(&self, _identity: &ImageIdentity) -> Result<Progress> {
        Err(Error::Unsupported {
            operation: "push image",
            backend: "fake",
        })
    }

    fn remote_repo(&self) -> &str {
        "registry.test"
    }
}
