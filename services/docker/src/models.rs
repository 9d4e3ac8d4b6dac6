//! Engine API request and response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One entry of `GET /images/json`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    /// Image id, `sha256:...`
    pub id: String,

    /// Parent image id
    #[serde(default)]
    pub parent_id: String,

    /// `repository:tag` references, null for dangling images
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,

    /// Creation time in seconds since the epoch
    pub created: i64,

    /// Size in bytes
    #[serde(default)]
    pub size: i64,

    /// Image labels, null when the image has none
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// One entry of `DELETE /images/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum RemovedImage {
    /// A reference was removed
    Untagged(String),
    /// An image layer was deleted
    Deleted(String),
}

/// Label filters for image listings, sent as `filters={"label":[...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Vec<(String, String)>,
}

impl LabelFilter {
    /// Match every image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally require label `key` to equal `value`.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// True when no label is required.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub(crate) fn to_query(&self) -> Result<String, serde_json::Error> {
        let labels: Vec<String> = self
            .labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let mut filters = BTreeMap::new();
        filters.insert("label", labels);
        serde_json::to_string(&filters)
    }
}

/// Options for `POST /build`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Name and tag for the built image
    pub tag: String,

    /// Always remove intermediate containers
    pub force_rm: bool,

    /// Remove intermediate containers after a successful build
    pub rm: bool,

    /// Do not use the build cache
    pub no_cache: bool,

    /// Labels set on the built image
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BuildQuery<'a> {
    pub t: &'a str,
    pub forcerm: bool,
    pub rm: bool,
    pub nocache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagQuery<'a> {
    pub repo: &'a str,
    pub tag: &'a str,
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveQuery {
    pub force: bool,
    pub noprune: bool,
}

/// Error document returned by the daemon.
#[derive(Debug, Deserialize)]
pub(crate) struct DaemonMessage {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_filter_query() {
        let filter = LabelFilter::new()
            .label("dev.foundry.repo", "acme")
            .label("dev.foundry.app", "web");
        assert_eq!(
            filter.to_query().unwrap(),
            r#"{"label":["dev.foundry.repo=acme","dev.foundry.app=web"]}"#
        );
    }

    #[test]
    fn decode_image_list() {
        let images: Vec<ImageSummary> = serde_json::from_str(indoc::indoc! {r#"
            [
                {
                    "Id": "sha256:e216a057b1cb",
                    "ParentId": "",
                    "RepoTags": ["acme/web:1"],
                    "Created": 1474925151,
                    "Size": 103579269,
                    "Labels": {"dev.foundry.repo": "acme"}
                },
                {
                    "Id": "sha256:3e314f95dcac",
                    "RepoTags": null,
                    "Created": 1474925000,
                    "Labels": null
                }
            ]
        "#})
        .unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].repo_tags.as_deref(), Some(&["acme/web:1".to_owned()][..]));
        assert!(images[1].labels.is_none());
    }

    #[test]
    fn decode_removed() {
        let removed: Vec<RemovedImage> =
            serde_json::from_str(r#"[{"Untagged":"acme/web:1"},{"Deleted":"sha256:e216"}]"#)
                .unwrap();
        assert_eq!(removed[1], RemovedImage::Deleted("sha256:e216".into()));
    }
}
