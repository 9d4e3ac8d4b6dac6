//! Building and sending requests.

use futures::StreamExt as _;
use http::{header::HeaderValue, HeaderName, Uri};
use serde::Serialize;

use crate::error::Error;
use crate::{response::Response, ApiClient, Authentication, BoxError};

/// Extension methods for `http::Request`.
pub trait RequestExt {
    /// A copy of the request head, without the body.
    fn parts(&self) -> http::request::Parts;
}

impl<B> RequestExt for http::Request<B> {
    fn parts(&self) -> http::request::Parts {
        let (mut parts, ()) = http::Request::new(()).into_parts();
        parts.method = self.method().clone();
        parts.uri = self.uri().clone();
        parts.version = self.version();
        parts.headers = self.headers().clone();
        parts
    }
}

/// A request under construction, sent with [`RequestBuilder::send`].
///
/// Errors from invalid headers or query parameters are deferred until the
/// request is sent.
#[derive(Debug)]
pub struct RequestBuilder<A> {
    req: http::request::Builder,
    uri: Uri,
    client: ApiClient<A>,
    body: Option<hyperdriver::Body>,
    error: Option<Error>,
}

impl<A> RequestBuilder<A> {
    /// Start a new request for `client`.
    pub fn new(client: ApiClient<A>, uri: Uri, method: http::Method) -> Self {
        Self {
            req: http::Request::builder().method(method),
            uri,
            client,
            body: None,
            error: None,
        }
    }

    /// Add a header to the request.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.req = self.req.header(key, value);
        self
    }

    /// Add several headers to the request.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        for (key, value) in headers {
            self.req = self.req.header(key, value);
        }

        self
    }

    /// Append url-encoded query parameters to the request URI.
    pub fn query<Q: Serialize + ?Sized>(mut self, query: &Q) -> Self {
        if self.error.is_some() {
            return self;
        }

        let encoded = match serde_urlencoded::to_string(query) {
            Ok(encoded) => encoded,
            Err(error) => {
                self.error = Some(Error::Query(error));
                return self;
            }
        };

        if encoded.is_empty() {
            return self;
        }

        let mut parts = self.uri.clone().into_parts();
        let path_and_query = match parts.path_and_query.as_ref() {
            Some(pq) => match pq.query() {
                Some(existing) => format!("{}?{}&{}", pq.path(), existing, encoded),
                None => format!("{}?{}", pq.path(), encoded),
            },
            None => format!("/?{}", encoded),
        };

        match http::uri::PathAndQuery::from_maybe_shared(path_and_query) {
            Ok(pq) => {
                parts.path_and_query = Some(pq);
                match Uri::from_parts(parts) {
                    Ok(uri) => self.uri = uri,
                    Err(error) => self.error = Some(Error::Build(error.into())),
                }
            }
            Err(error) => self.error = Some(Error::Build(error.into())),
        }

        self
    }

    /// Set the request body.
    pub fn body<B: Into<hyperdriver::Body>>(self, body: B) -> Self {
        Self {
            body: Some(body.into()),
            ..self
        }
    }

    /// Send the body as a stream of chunks instead of buffering it.
    pub fn body_stream<S, E>(self, chunks: S) -> Self
    where
        S: futures::Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let frames = chunks.map(|chunk| chunk.map(http_body::Frame::data).map_err(Into::<BoxError>::into));
        self.body(hyperdriver::Body::new(http_body_util::StreamBody::new(frames)))
    }

    /// Serialize `value` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.req = self
                    .req
                    .header(http::header::CONTENT_TYPE, "application/json");
                self.body = Some(hyperdriver::Body::from(bytes::Bytes::from(body)));
            }
            Err(error) => self.error = Some(Error::Json(error)),
        }
        self
    }

    /// Send the request.
    ///
    /// Any status is returned as a response, use [`Response::expect_status`] to
    /// turn unexpected statuses into errors.
    pub async fn send(self) -> Result<Response, Error>
    where
        A: Authentication,
    {
        if let Some(error) = self.error {
            return Err(error);
        }

        let req = self
            .req
            .uri(self.uri)
            .body(self.body.unwrap_or_else(hyperdriver::Body::empty))
            .map_err(Error::Build)?;

        self.client.execute(req).await.map_err(Error::Request)
    }
}
