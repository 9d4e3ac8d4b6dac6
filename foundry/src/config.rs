//! Backend selection and connection settings.
//!
//! [`FoundryConfig`] can be deserialized from a configuration file or read from
//! the process environment with [`FoundryConfig::from_env`].

use std::fmt;
use std::str::FromStr;

use api_client::Secret;
use http::Uri;
use registry::{SchemeAuth, GCE_METADATA_URL, GCR_DEFAULT_SERVER};
use serde::Deserialize;
use thiserror::Error;

/// Lines of build or push output held before the decoder waits for the reader.
pub const DEFAULT_BUFFER_LINES: usize = 100;

/// Configuration problems, reported at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent or empty.
    #[error("{name} must be set: {hint}")]
    Missing {
        /// Setting name
        name: &'static str,
        /// What the setting should contain
        hint: &'static str,
    },

    /// A setting has an unusable value.
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The provider needs a cargo feature this build does not have.
    #[error("provider {provider} is not available in this build")]
    FeatureDisabled {
        /// Requested provider
        provider: Provider,
    },
}

/// Where images are stored after they are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Only the local daemon
    Docker,
    /// A self-hosted Registry V2 server
    Private,
    /// Google Container Registry
    Gcr,
    /// AWS Elastic Container Registry
    Ecr,
}

impl Provider {
    /// The name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Docker => "docker",
            Provider::Private => "private",
            Provider::Gcr => "gcr",
            Provider::Ecr => "ecr",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Provider::Docker),
            "private" => Ok(Provider::Private),
            "gcr" => Ok(Provider::Gcr),
            "ecr" => Ok(Provider::Ecr),
            _ => Err(ConfigError::Invalid {
                name: "DOCKER_PROVIDER",
                value: s.to_owned(),
                reason: "expected one of docker, private, gcr, ecr".into(),
            }),
        }
    }
}

fn default_buffer_lines() -> usize {
    DEFAULT_BUFFER_LINES
}

/// Settings for [`Creator::from_config`](crate::Creator::from_config).
#[derive(Debug, Clone, Deserialize)]
pub struct FoundryConfig {
    /// Which backend stores images
    pub provider: Provider,

    /// Registry host images are tagged and pushed under
    pub registry_url: String,

    /// Registry V2 API server, required for private registries
    #[serde(default)]
    pub registry_api_server: Option<String>,

    /// AWS region of the ECR registry
    #[serde(default)]
    pub ecr_region: Option<String>,

    /// Daemon address, `tcp://host:port`
    pub docker_host: String,

    /// Daemon API version, e.g. `1.41`
    #[serde(default)]
    pub docker_api_version: Option<String>,

    /// Progress lines buffered per build or push
    #[serde(default = "default_buffer_lines")]
    pub buffer_lines: usize,

    /// Authorization scheme for registry API calls
    #[serde(default)]
    pub registry_auth_scheme: Option<String>,

    /// Authorization token for registry API calls
    #[serde(default)]
    pub registry_auth_token: Option<Secret>,

    /// Instance metadata endpoint used to discover the GCR project
    #[serde(default)]
    pub metadata_url: Option<String>,
}

impl FoundryConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which returns the value of a variable.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let provider = var("DOCKER_PROVIDER")
            .ok_or(ConfigError::Missing {
                name: "DOCKER_PROVIDER",
                hint: "one of docker, private, gcr, ecr",
            })?
            .parse()?;

        let buffer_lines = match var("BUFFER_LINES") {
            Some(value) => value.trim().parse().map_err(|error| ConfigError::Invalid {
                name: "BUFFER_LINES",
                value: value.clone(),
                reason: format!("{error}"),
            })?,
            None => DEFAULT_BUFFER_LINES,
        };

        let config = Self {
            provider,
            registry_url: var("DOCKER_REGISTRY_URL").unwrap_or_default(),
            registry_api_server: var("REGISTRY_API_SERVER"),
            ecr_region: var("ECR_REGION"),
            docker_host: var("DOCKER_HOST").unwrap_or_default(),
            docker_api_version: var("DOCKER_API_VERSION"),
            buffer_lines,
            registry_auth_scheme: var("REGISTRY_AUTH_SCHEME"),
            registry_auth_token: var("REGISTRY_AUTH_TOKEN").map(Secret::from),
            metadata_url: var("GCE_METADATA_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting the provider needs is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "DOCKER_REGISTRY_URL",
                hint: "registry host images are pushed to",
            });
        }

        if self.docker_host.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "DOCKER_HOST",
                hint: "daemon address such as tcp://127.0.0.1:2375",
            });
        }

        if self.buffer_lines == 0 {
            return Err(ConfigError::Invalid {
                name: "BUFFER_LINES",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.scheme_auth().header_value().is_err() {
            return Err(ConfigError::Invalid {
                name: "REGISTRY_AUTH_TOKEN",
                value: "****".into(),
                reason: "scheme and token must form a valid Authorization header".into(),
            });
        }

        match self.provider {
            Provider::Docker | Provider::Gcr => {}
            Provider::Private => {
                if self.registry_api_server.is_none() {
                    return Err(ConfigError::Missing {
                        name: "REGISTRY_API_SERVER",
                        hint: "registry API address such as https://registry.example.com",
                    });
                }
            }
            Provider::Ecr => {
                if cfg!(not(feature = "ecr")) {
                    return Err(ConfigError::FeatureDisabled {
                        provider: self.provider,
                    });
                }
                if self.ecr_region.is_none() {
                    return Err(ConfigError::Missing {
                        name: "ECR_REGION",
                        hint: "AWS region such as us-east-1",
                    });
                }
            }
        }

        Ok(())
    }

    /// The registry API server, defaulting to `gcr.io` for GCR.
    pub fn registry_api_uri(&self) -> Result<Uri, ConfigError> {
        let server = match (&self.registry_api_server, self.provider) {
            (Some(server), _) => server.as_str(),
            (None, Provider::Gcr) => GCR_DEFAULT_SERVER,
            (None, _) => {
                return Err(ConfigError::Missing {
                    name: "REGISTRY_API_SERVER",
                    hint: "registry API address such as https://registry.example.com",
                })
            }
        };
        parse_uri("REGISTRY_API_SERVER", server)
    }

    /// The instance metadata endpoint.
    pub fn metadata_uri(&self) -> Result<Uri, ConfigError> {
        parse_uri(
            "GCE_METADATA_URL",
            self.metadata_url.as_deref().unwrap_or(GCE_METADATA_URL),
        )
    }

    /// Authorization for registry API calls.
    pub fn scheme_auth(&self) -> SchemeAuth {
        SchemeAuth::new(
            self.registry_auth_scheme.clone(),
            self.registry_auth_token.clone(),
        )
    }
}

fn parse_uri(name: &'static str, value: &str) -> Result<Uri, ConfigError> {
    let uri: Uri = value.parse().map_err(|error: http::uri::InvalidUri| ConfigError::Invalid {
        name,
        value: value.to_owned(),
        reason: error.to_string(),
    })?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_owned(),
            reason: "expected an absolute http:// or https:// address".into(),
        });
    }
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const BASE: [(&str, &str); 2] = [
        ("DOCKER_REGISTRY_URL", "registry.example.com"),
        ("DOCKER_HOST", "tcp://127.0.0.1:2375"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        BASE.iter().chain(extra).copied().collect()
    }

    #[test]
    fn docker_provider_defaults() {
        let config = FoundryConfig::from_lookup(lookup(&with(&[("DOCKER_PROVIDER", "docker")])))
            .unwrap();
        assert_eq!(config.provider, Provider::Docker);
        assert_eq!(config.buffer_lines, DEFAULT_BUFFER_LINES);
        assert!(!config.scheme_auth().is_configured());
    }

    #[test]
    fn provider_is_required() {
        let error = FoundryConfig::from_lookup(lookup(&BASE)).unwrap_err();
        assert!(matches!(error, ConfigError::Missing { name: "DOCKER_PROVIDER", .. }));

        let error =
            FoundryConfig::from_lookup(lookup(&with(&[("DOCKER_PROVIDER", "quay")]))).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { name: "DOCKER_PROVIDER", .. }));
    }

    #[test]
    fn private_requires_api_server() {
        let error = FoundryConfig::from_lookup(lookup(&with(&[("DOCKER_PROVIDER", "private")])))
            .unwrap_err();
        assert!(matches!(error, ConfigError::Missing { name: "REGISTRY_API_SERVER", .. }));

        let config = FoundryConfig::from_lookup(lookup(&with(&[
            ("DOCKER_PROVIDER", "private"),
            ("REGISTRY_API_SERVER", "https://registry.example.com"),
            ("REGISTRY_AUTH_SCHEME", "Bearer"),
            ("REGISTRY_AUTH_TOKEN", "hunter2"),
        ])))
        .unwrap();
        assert_eq!(
            config.registry_api_uri().unwrap(),
            "https://registry.example.com/"
        );
        assert!(config.scheme_auth().is_configured());
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn unusable_registry_token_is_a_config_error() {
        let error = FoundryConfig::from_lookup(lookup(&with(&[
            ("DOCKER_PROVIDER", "gcr"),
            ("REGISTRY_AUTH_SCHEME", "Bearer"),
            ("REGISTRY_AUTH_TOKEN", "tok\u{7f}en"),
        ])))
        .unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { name: "REGISTRY_AUTH_TOKEN", .. }));
        assert!(!error.to_string().contains("tok\u{7f}en"));
    }

    #[test]
    fn gcr_defaults_server() {
        let config =
            FoundryConfig::from_lookup(lookup(&with(&[("DOCKER_PROVIDER", "GCR")]))).unwrap();
        assert_eq!(config.provider, Provider::Gcr);
        assert_eq!(config.registry_api_uri().unwrap(), "https://gcr.io/");
        assert_eq!(config.metadata_uri().unwrap(), GCE_METADATA_URL);
    }

    #[cfg(feature = "ecr")]
    #[test]
    fn ecr_requires_region() {
        let error = FoundryConfig::from_lookup(lookup(&with(&[("DOCKER_PROVIDER", "ecr")])))
            .unwrap_err();
        assert!(matches!(error, ConfigError::Missing { name: "ECR_REGION", .. }));
    }

    #[test]
    fn buffer_lines_must_be_positive() {
        for value in ["0", "-3", "lots"] {
            let error = FoundryConfig::from_lookup(lookup(&with(&[
                ("DOCKER_PROVIDER", "docker"),
                ("BUFFER_LINES", value),
            ])))
            .unwrap_err();
            assert!(matches!(error, ConfigError::Invalid { name: "BUFFER_LINES", .. }));
        }
    }

    #[test]
    fn deserializes_from_json() {
        let config: FoundryConfig = serde_json::from_str(indoc::indoc! {r#"
            {
                "provider": "private",
                "registry_url": "registry.example.com",
                "registry_api_server": "https://registry.example.com",
                "docker_host": "tcp://127.0.0.1:2375"
            }
        "#})
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.buffer_lines, DEFAULT_BUFFER_LINES);
    }
}
