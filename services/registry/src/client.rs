//! Calls shared by every Registry V2 flavor.

use api_client::{ApiClient, RequestBuilder, Response};
use camino::Utf8PathBuf;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{RegistryError, RegistryResult};
use crate::models::{
    BlobDescriptor, BlobDigests, Manifest, TagList, CONTENT_DIGEST_HEADER,
    MANIFEST_V2_MEDIA_TYPE,
};
use crate::SchemeAuth;

/// Registry V2 calls, optionally scoped under a path prefix such as a cloud project.
#[derive(Debug, Clone)]
pub(crate) struct V2Client {
    api: ApiClient<SchemeAuth>,
    prefix: Option<String>,
}

impl V2Client {
    pub(crate) fn new(api: ApiClient<SchemeAuth>, prefix: Option<String>) -> Self {
        Self { api, prefix }
    }

    pub(crate) fn api(&self) -> &ApiClient<SchemeAuth> {
        &self.api
    }

    /// `v2/[prefix/]<name>/<rest>`
    pub(crate) fn endpoint(&self, name: &str, rest: &str) -> String {
        let mut path = Utf8PathBuf::from("v2");
        if let Some(prefix) = self.prefix.as_deref().filter(|p| !p.is_empty()) {
            path.push(prefix);
        }
        if !name.is_empty() {
            path.push(name);
        }
        path.push(rest);
        path.into_string()
    }

    pub(crate) async fn call(
        &self,
        operation: &str,
        request: RequestBuilder<SchemeAuth>,
        expected: StatusCode,
    ) -> RegistryResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|source| RegistryError::Request {
                operation: operation.to_owned(),
                source,
            })?;

        response
            .expect_status(expected)
            .await
            .map_err(|error| RegistryError::Status {
                operation: operation.to_owned(),
                status: error.status,
                body: error.message,
            })
    }

    pub(crate) async fn json<T: DeserializeOwned>(
        operation: &str,
        response: Response,
    ) -> RegistryResult<T> {
        response
            .json()
            .await
            .map_err(|source| RegistryError::Body {
                operation: operation.to_owned(),
                source,
            })
    }

    fn content_digest(operation: &str, response: &Response) -> RegistryResult<String> {
        response
            .header_str(CONTENT_DIGEST_HEADER)
            .filter(|digest| !digest.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| RegistryError::MissingDigest {
                operation: operation.to_owned(),
            })
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn list_image_tags(&self, name: &str) -> RegistryResult<Vec<String>> {
        let operation = format!("list tags for {name}");
        let request = self.api.get(&self.endpoint(name, "tags/list"));
        let response = self.call(&operation, request, StatusCode::OK).await?;
        let tags: TagList = Self::json(&operation, response).await?;
        Ok(tags.tags.unwrap_or_default())
    }

    fn manifest_request(
        &self,
        method: http::Method,
        name: &str,
        reference: &str,
    ) -> RequestBuilder<SchemeAuth> {
        let endpoint = self.endpoint(name, &format!("manifests/{reference}"));
        let request = if method == http::Method::HEAD {
            self.api.head(&endpoint)
        } else {
            self.api.get(&endpoint)
        };
        request.header(http::header::ACCEPT, MANIFEST_V2_MEDIA_TYPE)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn image_manifest(
        &self,
        name: &str,
        tag: &str,
    ) -> RegistryResult<Manifest> {
        let operation = format!("get manifest for {name}:{tag}");
        let request = self.manifest_request(http::Method::GET, name, tag);
        let response = self.call(&operation, request, StatusCode::OK).await?;
        Self::json(&operation, response).await
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn image_manifest_digest(
        &self,
        name: &str,
        tag: &str,
    ) -> RegistryResult<String> {
        let operation = format!("get manifest digest for {name}:{tag}");
        let request = self.manifest_request(http::Method::HEAD, name, tag);
        let response = self.call(&operation, request, StatusCode::OK).await?;
        Self::content_digest(&operation, &response)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn image_blob_digest(
        &self,
        name: &str,
        tag: &str,
    ) -> RegistryResult<BlobDigests> {
        let operation = format!("get blob digest for {name}:{tag}");
        let request = self.manifest_request(http::Method::GET, name, tag);
        let response = self.call(&operation, request, StatusCode::OK).await?;
        let manifest_digest = Self::content_digest(&operation, &response)?;
        let manifest: Manifest = Self::json(&operation, response).await?;

        tracing::trace!(
            config = %manifest.config.digest,
            manifest = %manifest_digest,
            "resolved digests"
        );
        Ok(BlobDigests {
            config: manifest.config.digest,
            manifest: manifest_digest,
        })
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn image_blob(
        &self,
        name: &str,
        reference: &str,
    ) -> RegistryResult<BlobDescriptor> {
        let operation = format!("get blob {reference} from {name}");
        let request = self.api.get(&self.endpoint(name, &format!("blobs/{reference}")));
        let response = self.call(&operation, request, StatusCode::OK).await?;
        Self::json(&operation, response).await
    }

    #[tracing::instrument(skip(self))]
    pub(crate) async fn delete_manifest(
        &self,
        name: &str,
        reference: &str,
    ) -> RegistryResult<()> {
        let operation = format!("delete manifest {reference} from {name}");
        let request = self
            .api
            .delete(&self.endpoint(name, &format!("manifests/{reference}")));
        self.call(&operation, request, StatusCode::ACCEPTED).await?;
        tracing::debug!(%name, %reference, "deleted manifest");
        Ok(())
    }
}
