use http::StatusCode;

/// Errors talking to the image daemon.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The daemon address is not usable.
    #[error("invalid daemon address {host:?}: {reason}")]
    InvalidHost {
        /// The configured address
        host: String,
        /// Why it was rejected
        reason: String,
    },

    /// The daemon answered with an unexpected status.
    #[error("{operation}: daemon returned {status}: {message}")]
    Status {
        /// Operation that failed
        operation: String,
        /// Status returned by the daemon
        status: StatusCode,
        /// Daemon error message
        message: String,
    },

    /// The request could not be built or sent.
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
}

impl DaemonError {
    /// The HTTP status, if the daemon answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DaemonError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the daemon reported the image as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}
