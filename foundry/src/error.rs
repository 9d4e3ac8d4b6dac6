use camino::Utf8PathBuf;
use credentials::CredentialError;
use docker::DaemonError;
use registry::RegistryError;

use crate::config::ConfigError;

/// Errors raised by image creators, the reaper and revision allocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration was missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The image daemon failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// The registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The build context archive could not be read.
    #[error("read build context {path}")]
    BuildContext {
        /// Archive path
        path: Utf8PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Registry credentials could not be loaded.
    #[error("load credentials for {server}")]
    Credentials {
        /// Registry the credentials were looked up for
        server: String,
        /// Underlying credential error
        #[source]
        source: CredentialError,
    },

    /// Registry credentials could not be encoded for the daemon.
    #[error("encode registry credentials")]
    EncodeCredentials(#[source] serde_json::Error),

    /// The image does not exist.
    #[error("image {id} not found")]
    NotFound {
        /// Image id or reference
        id: String,
    },

    /// The backend does not implement the operation.
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        /// Operation requested
        operation: &'static str,
        /// Backend name
        backend: &'static str,
    },

    /// Deleting one image of an application failed.
    #[error("delete image {id} of {application}")]
    DeleteImage {
        /// Image id or digest
        id: String,
        /// `repo/application`
        application: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Metadata for one tag could not be fetched while listing images.
    #[error("inspect {repository}:{tag}")]
    Inventory {
        /// Repository name
        repository: String,
        /// Tag being inspected
        tag: String,
        /// Underlying registry error
        #[source]
        source: RegistryError,
    },

    /// A tag-based operation was requested for an image with no tags.
    #[error("image {id} has no tags")]
    MissingTag {
        /// Image id or digest
        id: String,
    },

    /// An ECR API call failed.
    #[cfg(feature = "ecr")]
    #[error("ecr {operation}")]
    Ecr {
        /// Operation that failed
        operation: &'static str,
        /// Underlying SDK error
        #[source]
        source: api_client::BoxError,
    },
}

impl Error {
    /// True when the error means the requested image does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Daemon(error) => error.is_not_found(),
            Error::Registry(error) => error.is_not_found(),
            _ => false,
        }
    }
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
