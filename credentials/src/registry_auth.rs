use base64::prelude::{Engine as _, BASE64_URL_SAFE};
use serde::{Deserialize, Serialize};

use crate::{CredentialError, Secret};

/// Credentials for one registry server, in the shape the image daemon accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    /// Account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Account password or access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,

    /// Account email, only used by very old registries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Registry server these credentials belong to
    #[serde(
        default,
        rename = "serveraddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_address: Option<String>,
}

impl RegistryAuth {
    /// An empty payload, sent when no credentials are known.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// True when no field is set.
    pub fn is_anonymous(&self) -> bool {
        self == &Self::default()
    }

    /// Encode as URL-safe base64 JSON for the `X-Registry-Auth` header.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64_URL_SAFE.encode(json))
    }
}

/// Looks up registry credentials by server name.
///
/// Implementations are consulted on every push, so rotated credentials are
/// picked up without restarting.
pub trait CredentialSource: std::fmt::Debug + Send + Sync {
    /// Credentials for `server`, or [`RegistryAuth::anonymous`] if none are known.
    fn registry_auth(&self, server: &str) -> Result<RegistryAuth, CredentialError>;
}

/// Always returns the same credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(RegistryAuth);

impl StaticCredentials {
    /// Serve `auth` for every server.
    pub fn new(auth: RegistryAuth) -> Self {
        Self(auth)
    }
}

impl CredentialSource for StaticCredentials {
    fn registry_auth(&self, _server: &str) -> Result<RegistryAuth, CredentialError> {
        Ok(self.0.clone())
    }
}
