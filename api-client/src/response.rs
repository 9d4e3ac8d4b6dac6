//! HTTP responses which remember the request that produced them.

use futures::stream::BoxStream;
use futures::StreamExt as _;
use http_body_util::BodyExt as _;
use hyperdriver::Body;

use crate::error::HttpResponseError;
use crate::BoxError;

/// A response body as a stream of chunks.
pub type ByteStream = BoxStream<'static, Result<bytes::Bytes, BoxError>>;

/// A response paired with the head of the request that produced it.
#[derive(Debug)]
pub struct Response {
    request: http::request::Parts,
    head: http::response::Parts,
    body: Body,
}

impl Response {
    /// Pair `response` with the head of the request it answers.
    pub fn new(request: http::request::Parts, response: http::Response<Body>) -> Self {
        let (head, body) = response.into_parts();
        Self {
            request,
            head,
            body,
        }
    }

    /// Response status.
    pub fn status(&self) -> http::StatusCode {
        self.head.status
    }

    /// Response headers.
    pub fn headers(&self) -> &http::HeaderMap {
        &self.head.headers
    }

    /// URI the request was sent to.
    pub fn uri(&self) -> &http::Uri {
        &self.request.uri
    }

    /// A header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.head
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Split into the request head, the response head and the body.
    pub fn into_parts(self) -> (http::request::Parts, http::response::Parts, Body) {
        (self.request, self.head, self.body)
    }

    /// Collect the whole body.
    pub async fn bytes(self) -> Result<bytes::Bytes, BoxError> {
        let collected = self.body.collect().await.map_err(Into::<BoxError>::into)?;
        Ok(collected.to_bytes())
    }

    /// Collect the body as UTF-8 text.
    pub async fn text(self) -> Result<String, BoxError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Collect the body and decode it as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, BoxError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Stream the body chunk by chunk instead of collecting it.
    pub fn into_data_stream(self) -> ByteStream {
        self.body
            .into_data_stream()
            .map(|chunk| chunk.map_err(Into::into))
            .boxed()
    }

    /// Collect the body into an [`HttpResponseError`].
    pub async fn into_error(self) -> HttpResponseError {
        HttpResponseError::from_response(self).await
    }

    /// Require exactly `expected` as the response status.
    ///
    /// Any other status, success or not, is collected into an `HttpResponseError`.
    pub async fn expect_status(
        self,
        expected: http::StatusCode,
    ) -> Result<Self, HttpResponseError> {
        if self.status() == expected {
            Ok(self)
        } else {
            Err(self.into_error().await)
        }
    }
}
