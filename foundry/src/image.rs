use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use docker::ImageSummary;
use serde::{Deserialize, Serialize};

use crate::identity::ImageIdentity;
use crate::labels::{APP_LABEL, REPO_LABEL, REVISION_LABEL};

/// One image as reported by a backend.
///
/// For local images `id` is the daemon's image id, for registry-backed
/// images it is the manifest digest, which is what deletion needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedImage {
    /// Image id or manifest digest
    pub id: String,

    /// Build or push time, `None` when the backend reported none or an unusable one
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    /// `name:tag` references
    #[serde(default)]
    pub repo_tags: Vec<String>,

    /// Image labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Size in bytes, when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl ManagedImage {
    /// True when the image carries the repository management label.
    pub fn is_managed(&self) -> bool {
        self.labels.contains_key(REPO_LABEL)
    }

    /// Repository label value.
    pub fn repo(&self) -> Option<&str> {
        self.labels.get(REPO_LABEL).map(String::as_str)
    }

    /// Application label value.
    pub fn application(&self) -> Option<&str> {
        self.labels.get(APP_LABEL).map(String::as_str)
    }

    /// Revision label value.
    pub fn revision(&self) -> Option<&str> {
        self.labels.get(REVISION_LABEL).map(String::as_str)
    }

    /// The tag of the first reference: the text after its first `:`.
    pub fn first_tag(&self) -> Option<&str> {
        self.repo_tags
            .first()
            .and_then(|reference| reference.split_once(':'))
            .map(|(_, tag)| tag)
    }
}

/// The images in `images` that carry the repository label.
///
/// Unmanaged images are skipped with a warning and never handed to a delete call.
pub(crate) fn managed_only<'a>(
    images: &'a [ManagedImage],
    identity: &'a ImageIdentity,
) -> impl Iterator<Item = &'a ManagedImage> + 'a {
    images.iter().filter(move |image| {
        if !image.is_managed() {
            tracing::warn!(id = %image.id, application = %identity.image_name(), "refusing to delete unmanaged image");
        }
        image.is_managed()
    })
}

impl From<ImageSummary> for ManagedImage {
    fn from(summary: ImageSummary) -> Self {
        let created = DateTime::from_timestamp(summary.created, 0);
        if created.is_none() {
            tracing::warn!(id = %summary.id, created = summary.created, "image creation time out of range");
        }
        Self {
            id: summary.id,
            created,
            repo_tags: summary.repo_tags.unwrap_or_default(),
            labels: summary.labels.unwrap_or_default(),
            size: Some(summary.size),
        }
    }
}
