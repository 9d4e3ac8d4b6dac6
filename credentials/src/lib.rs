//! Credentials for talking to image registries.
//!
//! [`Secret`] hides sensitive values from logs. [`RegistryAuth`] is the payload
//! the image daemon expects in its `X-Registry-Auth` header, and
//! [`CredentialSource`] finds one for a given registry server.

mod docker_config;
mod registry_auth;
mod secret;

pub use self::docker_config::DockerConfigCredentials;
pub use self::registry_auth::{CredentialSource, RegistryAuth, StaticCredentials};
pub use self::secret::Secret;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors while loading registry credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The credential file could not be read.
    #[error("Reading credentials from {path}")]
    Io {
        /// File that was being read
        path: Utf8PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The credential file is not valid JSON.
    #[error("Parsing credentials from {path}")]
    Parse {
        /// File that was being parsed
        path: Utf8PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// An encoded `auth` entry is not base64 `user:password`.
    #[error("Malformed auth entry for {server}")]
    MalformedAuth {
        /// The server key of the entry
        server: String,
    },
}
