//! Error types for the registry client

use http::StatusCode;

use crate::RegistryFlavor;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by registry calls.
///
/// Every variant carries the operation that failed, for example
/// `list tags for acme/app`, so errors can be logged without extra context.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry answered with a status other than the one expected.
    #[error("{operation}: registry returned {status}: {body}")]
    Status {
        /// Operation that failed
        operation: String,
        /// Status returned by the registry
        status: StatusCode,
        /// Response body, usually a registry error document
        body: String,
    },

    /// The request could not be sent, or the connection failed.
    #[error("{operation}: request failed")]
    Request {
        /// Operation that failed
        operation: String,
        /// Underlying client error
        #[source]
        source: api_client::Error,
    },

    /// The response body could not be read or decoded.
    #[error("{operation}: invalid response body")]
    Body {
        /// Operation that failed
        operation: String,
        /// Underlying decode error
        #[source]
        source: api_client::BoxError,
    },

    /// A successful manifest response did not include its digest.
    #[error("{operation}: response has no Docker-Content-Digest header")]
    MissingDigest {
        /// Operation that failed
        operation: String,
    },

    /// The registry flavor does not support this operation.
    #[error("{operation} is not supported by {flavor} registries")]
    Unsupported {
        /// Operation that was attempted
        operation: String,
        /// Registry flavor
        flavor: RegistryFlavor,
    },

    /// The cloud project could not be discovered.
    #[error("looking up project id from {url}")]
    ProjectLookup {
        /// Metadata endpoint
        url: String,
        /// Underlying client error
        #[source]
        source: api_client::Error,
    },
}

impl RegistryError {
    /// The HTTP status, if the registry answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RegistryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the registry reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}
