use std::collections::BTreeMap;
use std::io;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::{CredentialError, CredentialSource, RegistryAuth, Secret};

const CONFIG_FILE_NAME: &str = "config.json";

/// Reads credentials from a docker client `config.json`.
///
/// The file is read on every lookup. The first `auths` entry (in key order)
/// whose host contains the requested server wins. A missing file or a missing
/// entry produces anonymous credentials.
#[derive(Debug, Clone)]
pub struct DockerConfigCredentials {
    path: Option<Utf8PathBuf>,
}

impl DockerConfigCredentials {
    /// Use the file at `path`.
    pub fn at<P: Into<Utf8PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Use `$DOCKER_CONFIG/config.json`, falling back to `$HOME/.docker/config.json`.
    pub fn from_env() -> Self {
        let dir = std::env::var("DOCKER_CONFIG")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(Utf8PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|home| Utf8PathBuf::from(home).join(".docker"))
            });

        Self {
            path: dir.map(|dir| dir.join(CONFIG_FILE_NAME)),
        }
    }

    /// The file consulted for credentials, if one could be determined.
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<Secret>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, rename = "serveraddress")]
    server_address: Option<String>,
}

impl AuthEntry {
    fn into_registry_auth(self, host: &str) -> Result<RegistryAuth, CredentialError> {
        let mut auth = RegistryAuth {
            username: self.username,
            password: self.password,
            email: self.email,
            server_address: self.server_address.or_else(|| Some(host.to_owned())),
        };

        if let Some(encoded) = self.auth.filter(|encoded| !encoded.is_empty()) {
            let malformed = || CredentialError::MalformedAuth {
                server: host.to_owned(),
            };
            let decoded = BASE64_STANDARD.decode(encoded).map_err(|_| malformed())?;
            let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
            let (username, password) = decoded.split_once(':').ok_or_else(malformed)?;
            auth.username = Some(username.to_owned());
            auth.password = Some(Secret::from(password.to_owned()));
        }

        Ok(auth)
    }
}

impl CredentialSource for DockerConfigCredentials {
    fn registry_auth(&self, server: &str) -> Result<RegistryAuth, CredentialError> {
        let Some(path) = self.path.as_deref() else {
            tracing::warn!("no docker config location, using anonymous registry auth");
            return Ok(RegistryAuth::anonymous());
        };

        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(%path, "docker config not found, using anonymous registry auth");
                return Ok(RegistryAuth::anonymous());
            }
            Err(source) => {
                return Err(CredentialError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let config: ConfigFile =
            serde_json::from_slice(&contents).map_err(|source| CredentialError::Parse {
                path: path.to_owned(),
                source,
            })?;

        match config
            .auths
            .into_iter()
            .find(|(host, _)| host.contains(server))
        {
            Some((host, entry)) => entry.into_registry_auth(&host),
            None => {
                tracing::warn!(%server, "no credentials for registry, using anonymous registry auth");
                Ok(RegistryAuth::anonymous())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn config_file(contents: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn decodes_matching_auth_entry() {
        // "deployer:hunter2"
        let (_dir, path) = config_file(indoc::indoc! {r#"
            {
                "auths": {
                    "https://index.docker.io/v1/": { "auth": "b3RoZXI6b3RoZXI=" },
                    "registry.example.com": { "auth": "ZGVwbG95ZXI6aHVudGVyMg==" }
                }
            }
        "#});

        let auth = DockerConfigCredentials::at(path)
            .registry_auth("registry.example.com")
            .unwrap();
        assert_eq!(auth.username.as_deref(), Some("deployer"));
        assert_eq!(auth.password.as_ref().map(Secret::revealed), Some("hunter2"));
        assert_eq!(
            auth.server_address.as_deref(),
            Some("registry.example.com")
        );
    }

    #[test]
    fn unknown_server_is_anonymous() {
        let (_dir, path) = config_file(r#"{"auths": {"quay.io": {"auth": "YTpi"}}}"#);
        let auth = DockerConfigCredentials::at(path)
            .registry_auth("registry.example.com")
            .unwrap();
        assert!(auth.is_anonymous());
    }

    #[test]
    fn missing_file_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.json")).unwrap();
        let auth = DockerConfigCredentials::at(path)
            .registry_auth("registry.example.com")
            .unwrap();
        assert!(auth.is_anonymous());
    }

    #[test]
    fn malformed_auth_is_an_error() {
        let (_dir, path) = config_file(r#"{"auths": {"registry.example.com": {"auth": "bm9jb2xvbg=="}}}"#);
        let error = DockerConfigCredentials::at(path)
            .registry_auth("registry.example.com")
            .unwrap_err();
        assert!(matches!(error, CredentialError::MalformedAuth { .. }));
    }
}
