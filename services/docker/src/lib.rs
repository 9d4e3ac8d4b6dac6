//! Minimal client for the Docker Engine API over TCP.
//!
//! Covers the image calls needed to build, tag, push, list and remove images.
//! Build and push return the raw response body as a [`ByteStream`] of
//! newline-delimited JSON progress events.

use api_client::uri::IntoUri as _;
use api_client::{ApiClient, RequestBuilder, Response};
use http::{StatusCode, Uri};

mod error;
pub mod models;

pub use api_client::ByteStream;

pub use self::error::DaemonError;
pub use self::models::{BuildOptions, ImageSummary, LabelFilter, RemovedImage};
use self::models::{BuildQuery, DaemonMessage, RemoveQuery, TagQuery};

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Client for a single image daemon.
#[derive(Debug, Clone)]
pub struct DockerClient {
    api: ApiClient<()>,
}

impl DockerClient {
    /// Connect to a daemon given a `DOCKER_HOST` style address.
    ///
    /// `tcp://` addresses are reached over plain HTTP, `http://` and `https://`
    /// are used as given. `api_version` (e.g. `1.41`) prefixes every path.
    pub fn from_host(host: &str, api_version: Option<&str>) -> Result<Self, DaemonError> {
        let base = daemon_base(host, api_version)?;
        tracing::debug!(%base, "using image daemon");
        Ok(Self::from_client(ApiClient::new(base, ())))
    }

    /// Use an already configured API client.
    pub fn from_client(api: ApiClient<()>) -> Self {
        Self { api }
    }

    /// The base URI of the daemon API.
    pub fn base(&self) -> Uri {
        self.api.base()
    }

    async fn call(
        &self,
        operation: &str,
        request: RequestBuilder<()>,
        expected: StatusCode,
    ) -> Result<Response, DaemonError> {
        let response = request
            .send()
            .await
            .map_err(|source| DaemonError::Request {
                operation: operation.to_owned(),
                source,
            })?;

        match response.expect_status(expected).await {
            Ok(response) => Ok(response),
            Err(error) => {
                let message = serde_json::from_str::<DaemonMessage>(&error.message)
                    .map(|document| document.message)
                    .unwrap_or(error.message);
                Err(DaemonError::Status {
                    operation: operation.to_owned(),
                    status: error.status,
                    message: message.trim().to_owned(),
                })
            }
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(
        operation: &str,
        response: Response,
    ) -> Result<T, DaemonError> {
        response.json().await.map_err(|source| DaemonError::Body {
            operation: operation.to_owned(),
            source,
        })
    }

    /// Check that the daemon is reachable.
    #[tracing::instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), DaemonError> {
        self.call("ping daemon", self.api.get("_ping"), StatusCode::OK)
            .await?;
        Ok(())
    }

    /// List top level images matching `filter`.
    #[tracing::instrument(skip(self))]
    pub async fn list_images(&self, filter: &LabelFilter) -> Result<Vec<ImageSummary>, DaemonError> {
        let operation = "list images";
        let mut request = self.api.get("images/json");
        if !filter.is_empty() {
            let filters = filter.to_query().map_err(|error| DaemonError::Body {
                operation: operation.to_owned(),
                source: error.into(),
            })?;
            request = request.query(&[("filters", filters)]);
        }

        let response = self.call(operation, request, StatusCode::OK).await?;
        Self::json(operation, response).await
    }

    /// Build an image from a tar archive holding the build context.
    ///
    /// The archive is streamed to the daemon as it is read.
    #[tracing::instrument(skip(self, context))]
    pub async fn build_image(
        &self,
        context: ByteStream,
        options: &BuildOptions,
    ) -> Result<ByteStream, DaemonError> {
        let operation = format!("build image {}", options.tag);
        let labels = if options.labels.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&options.labels).map_err(|error| DaemonError::Body {
                    operation: operation.clone(),
                    source: error.into(),
                })?,
            )
        };

        let request = self
            .api
            .post("build")
            .query(&BuildQuery {
                t: &options.tag,
                forcerm: options.force_rm,
                rm: options.rm,
                nocache: options.no_cache,
                labels,
            })
            .header(http::header::CONTENT_TYPE, "application/x-tar")
            .body_stream(context);

        let response = self.call(&operation, request, StatusCode::OK).await?;
        Ok(response.into_data_stream())
    }

    /// Add the reference `repo:tag` to image `name`.
    #[tracing::instrument(skip(self))]
    pub async fn tag_image(
        &self,
        name: &str,
        repo: &str,
        tag: &str,
        force: bool,
    ) -> Result<(), DaemonError> {
        let operation = format!("tag {name} as {repo}:{tag}");
        let request = self
            .api
            .post(&format!("images/{name}/tag"))
            .query(&TagQuery { repo, tag, force });
        self.call(&operation, request, StatusCode::CREATED).await?;
        Ok(())
    }

    /// Push `name:tag` to its registry.
    ///
    /// `registry_auth` is the encoded `X-Registry-Auth` payload.
    #[tracing::instrument(skip(self, registry_auth))]
    pub async fn push_image(
        &self,
        name: &str,
        tag: &str,
        registry_auth: &str,
    ) -> Result<ByteStream, DaemonError> {
        let operation = format!("push {name}:{tag}");
        let request = self
            .api
            .post(&format!("images/{name}/push"))
            .query(&[("tag", tag)])
            .header(REGISTRY_AUTH_HEADER, registry_auth);

        let response = self.call(&operation, request, StatusCode::OK).await?;
        Ok(response.into_data_stream())
    }

    /// Remove image `name`, returning what the daemon untagged and deleted.
    #[tracing::instrument(skip(self))]
    pub async fn remove_image(
        &self,
        name: &str,
        force: bool,
        noprune: bool,
    ) -> Result<Vec<RemovedImage>, DaemonError> {
        let operation = format!("remove image {name}");
        let request = self
            .api
            .delete(&format!("images/{name}"))
            .query(&RemoveQuery { force, noprune });
        let response = self.call(&operation, request, StatusCode::OK).await?;
        Self::json(&operation, response).await
    }
}

fn daemon_base(host: &str, api_version: Option<&str>) -> Result<Uri, DaemonError> {
    let invalid = |reason: &str| DaemonError::InvalidHost {
        host: host.to_owned(),
        reason: reason.to_owned(),
    };

    let mut url: url::Url = host.parse().map_err(|error: url::ParseError| invalid(&error.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        "tcp" => {
            let rewritten = format!("http{}", &url.as_str()["tcp".len()..]);
            url = rewritten
                .parse()
                .map_err(|error: url::ParseError| invalid(&error.to_string()))?;
        }
        "unix" | "npipe" => return Err(invalid("only TCP daemon addresses are supported")),
        _ => return Err(invalid("address must start with tcp://, http:// or https://")),
    }

    if url.host_str().is_none() {
        return Err(invalid("address has no host"));
    }

    if let Some(version) = api_version.filter(|version| !version.is_empty()) {
        let version = version.trim_start_matches('v');
        url.set_path(&format!("v{version}/"));
    }

    url.into_uri().map_err(|error| invalid(&error.to_string()))
}
