//! Image identity: which repository, application and revision an image is.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::labels::{APP_LABEL, REPO_LABEL, REVISION_LABEL};

/// The repository / application / revision triple naming an image.
///
/// All tag strings are derived on demand and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageIdentity {
    /// Organization or repository, the first path segment of the image name
    pub repo: String,

    /// Application, the second path segment of the image name
    pub application: String,

    /// Revision, used as the image tag
    pub revision: String,

    /// Image the build starts from, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
}

impl ImageIdentity {
    /// Identify revision `revision` of `repo/application`.
    pub fn new(
        repo: impl Into<String>,
        application: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            application: application.into(),
            revision: revision.into(),
            base_image: None,
        }
    }

    /// Record the base image of the build.
    pub fn with_base_image(mut self, base_image: impl Into<String>) -> Self {
        self.base_image = Some(base_image.into());
        self
    }

    /// `repo/application`
    pub fn image_name(&self) -> String {
        format!("{}/{}", self.repo, self.application)
    }

    /// `repo/application:revision`. An empty revision leaves a trailing colon.
    pub fn tag_name(&self) -> String {
        format!("{}:{}", self.image_name(), self.revision)
    }

    /// `remote/repo/application`
    pub fn remote_tag_path(&self, remote: &str) -> String {
        format!("{}/{}", remote, self.image_name())
    }

    /// `remote/repo/application:revision`
    pub fn remote_tag_name(&self, remote: &str) -> String {
        format!("{}/{}", remote, self.tag_name())
    }

    /// Management labels for an image with this identity.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (REPO_LABEL.to_owned(), self.repo.clone()),
            (APP_LABEL.to_owned(), self.application.clone()),
            (REVISION_LABEL.to_owned(), self.revision.clone()),
        ])
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.repo, self.application, self.revision)
    }
}

/// A build context archive together with the identity of the image it builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Tar archive holding the Dockerfile and build context
    pub tar_file: Utf8PathBuf,

    /// Identity of the image to build
    pub identity: ImageIdentity,
}

impl BuildRequest {
    /// Build `identity` from the archive at `tar_file`.
    pub fn new(tar_file: impl Into<Utf8PathBuf>, identity: ImageIdentity) -> Self {
        Self {
            tar_file: tar_file.into(),
            identity,
        }
    }
}

/// A remote image reference was not `{registry}/{repo}/{application}:{revision}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid image reference {input:?}, expected {{registry}}/{{repo}}/{{application}}:{{revision}}")]
pub struct ParseRemoteImageError {
    input: String,
}

/// A fully qualified image reference in a remote registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteImage {
    /// Registry host, with port if any
    pub registry: String,

    /// Identity of the image in that registry
    pub identity: ImageIdentity,
}

impl RemoteImage {
    /// Parse `{registry}/{repo}/{application}:{revision}`.
    pub fn parse(input: &str) -> Result<Self, ParseRemoteImageError> {
        let invalid = || ParseRemoteImageError {
            input: input.to_owned(),
        };

        let segments: Vec<&str> = input.split('/').collect();
        let [registry, repo, tagged] = segments[..] else {
            return Err(invalid());
        };

        if tagged.matches(':').count() != 1 {
            return Err(invalid());
        }
        let (application, revision) = tagged.split_once(':').ok_or_else(invalid)?;

        Ok(Self {
            registry: registry.to_owned(),
            identity: ImageIdentity::new(repo, application, revision),
        })
    }
}

impl FromStr for RemoteImage {
    type Err = ParseRemoteImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity.remote_tag_name(&self.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        let identity = ImageIdentity::new("acme", "web", "3");
        assert_eq!(identity.image_name(), "acme/web");
        assert_eq!(identity.tag_name(), "acme/web:3");
        assert_eq!(
            identity.remote_tag_path("registry.example.com"),
            "registry.example.com/acme/web"
        );
        assert_eq!(
            identity.remote_tag_name("registry.example.com"),
            "registry.example.com/acme/web:3"
        );
    }

    #[test]
    fn empty_revision_keeps_colon() {
        let identity = ImageIdentity::new("acme", "web", "");
        assert_eq!(identity.tag_name(), "acme/web:");
    }

    #[test]
    fn labels_carry_identity() {
        let labels = ImageIdentity::new("acme", "web", "3").labels();
        assert_eq!(labels[REPO_LABEL], "acme");
        assert_eq!(labels[APP_LABEL], "web");
        assert_eq!(labels[REVISION_LABEL], "3");
    }

    #[test]
    fn remote_image_round_trip() {
        let identity = ImageIdentity::new("acme", "web", "12");
        let remote = identity.remote_tag_name("localhost:5000");

        let parsed: RemoteImage = remote.parse().unwrap();
        assert_eq!(parsed.registry, "localhost:5000");
        assert_eq!(parsed.identity, identity);
        assert_eq!(parsed.to_string(), remote);
    }

    #[test]
    fn remote_image_rejects_bad_shapes() {
        for input in [
            "acme/web:1",
            "registry/acme/team/web:1",
            "registry/acme/web",
            "registry/acme/web:1:2",
        ] {
            assert!(RemoteImage::parse(input).is_err(), "{input} should not parse");
        }
    }
}
