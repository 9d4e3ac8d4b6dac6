//! A small HTTP API client built on hyperdriver and tower.
//!
//! [`ApiClient`] joins endpoints onto a base URI, attaches a swappable
//! [`Authentication`] to every request, and hands back a [`Response`]
//! which can be collected or streamed.
#![allow(clippy::arc_with_non_send_sync)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use arc_swap::Guard;
use http::Method;
use http::Uri;
use hyperdriver::service::SharedService;
use tower::ServiceExt;

pub use credentials::Secret;

mod authentication;
pub mod error;
pub mod request;
pub mod response;
pub mod uri;

pub use self::authentication::{AuthLayer, AuthService, Authentication};
pub use self::error::{Error, HttpResponseError};
pub use self::request::RequestBuilder;
pub use self::request::RequestExt;
pub use self::response::{ByteStream, Response};
use self::uri::UriExtension as _;

/// Boxed error used for response bodies and streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A client for accessing APIs over HTTP / HTTPS
///
/// Useful inner object to wrap for individual API clients.
#[derive(Debug, Clone)]
pub struct ApiClient<A> {
    base: Arc<ArcSwap<Uri>>,
    inner: hyperdriver::client::SharedClientService<hyperdriver::Body>,
    authentication: Arc<ArcSwap<A>>,
}

impl<A> ApiClient<A>
where
    A: Authentication + Send + Sync + 'static,
{
    /// Create a new API Client from a base URL and an authentication method
    pub fn new(base: Uri, authentication: A) -> Self {
        let authentication = Arc::new(ArcSwap::new(Arc::new(authentication)));
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .layer(AuthLayer::new(authentication.clone()))
            .build_service();

        ApiClient {
            base: Arc::new(ArcSwap::new(Arc::new(base))),
            inner,
            authentication,
        }
    }

    /// Create a new API Client which sends requests through `inner`.
    ///
    /// Authentication is still applied before the request reaches the inner service,
    /// which makes this the constructor to use with [`mock::MockService`].
    pub fn new_with_inner_service<S>(base: Uri, authentication: A, inner: S) -> Self
    where
        S: tower::Service<
                hyperdriver::body::Request,
                Response = hyperdriver::body::Response,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let authentication = Arc::new(ArcSwap::new(Arc::new(authentication)));

        let service = tower::ServiceBuilder::new()
            .layer(SharedService::layer())
            .layer(AuthLayer::new(authentication.clone()))
            .service(inner);

        ApiClient {
            base: Arc::new(ArcSwap::new(Arc::new(base))),
            inner: service,
            authentication,
        }
    }

    /// Replace the base URI used for new requests.
    pub fn set_base(&self, base: Uri) {
        self.base.store(Arc::new(base));
    }

    /// Replace the authentication used for new requests.
    pub fn refresh_auth(&self, authentication: A) {
        self.authentication.store(Arc::new(authentication));
    }

    /// The authentication currently in use.
    pub fn auth(&self) -> Guard<Arc<A>> {
        self.authentication.as_ref().load()
    }
}

impl<A> ApiClient<A>
where
    A: Authentication,
{
    /// The base URI requests are joined onto.
    pub fn base(&self) -> Uri {
        (*self.base.load_full()).clone()
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder<A> {
        let url = self.base().join(endpoint);
        RequestBuilder::new(self.clone(), url, method)
    }

    /// Start a GET request to `endpoint`.
    pub fn get(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::GET, endpoint)
    }

    /// Start a HEAD request to `endpoint`.
    pub fn head(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::HEAD, endpoint)
    }

    /// Start a PUT request to `endpoint`.
    pub fn put(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::PUT, endpoint)
    }

    /// Start a POST request to `endpoint`.
    pub fn post(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::POST, endpoint)
    }

    /// Start a DELETE request to `endpoint`.
    pub fn delete(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::DELETE, endpoint)
    }

    /// Send a fully built request.
    pub async fn execute(
        &self,
        req: hyperdriver::body::Request,
    ) -> Result<Response, hyperdriver::client::Error> {
        let parts = req.parts();
        tracing::trace!(method = %parts.method, uri = %parts.uri, "sending request");

        let response = self.inner.clone().oneshot(req).await?;
        Ok(Response::new(parts, response))
    }
}

pub mod mock {
    //! A canned-response tower service for tests.

    use std::collections::HashMap;
    use std::sync::Arc;

    use bytes::Bytes;
    use http::{response, Method};
    use parking_lot::Mutex;

    /// A response returned by [`MockService`].
    #[derive(Debug, Clone)]
    pub struct MockResponse {
        status: http::StatusCode,
        headers: http::HeaderMap,
        body: Bytes,
    }

    impl MockResponse {
        /// Create a new canned response.
        pub fn new<B: Into<Bytes>>(
            status: http::StatusCode,
            headers: http::HeaderMap,
            body: B,
        ) -> Self {
            Self {
                status,
                headers,
                body: body.into(),
            }
        }
    }

    /// A request seen by [`MockService`].
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        /// Request method
        pub method: Method,
        /// Full request URI
        pub uri: http::Uri,
        /// Request headers, after authentication was applied.
        pub headers: http::HeaderMap,
    }

    /// Serves canned responses keyed by method and path, recording every request.
    ///
    /// Responses registered with [`MockService::add`] match any method. Paths with
    /// no configured response get an empty `404 Not Found`.
    #[derive(Debug, Default, Clone)]
    pub struct MockService {
        responses: HashMap<(Option<Method>, String), MockResponse>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockService {
        /// Create an empty mock service.
        pub fn new() -> Self {
            Self::default()
        }

        /// Respond to any method on `path`.
        pub fn add<B: Into<Bytes>>(
            &mut self,
            path: &str,
            status: http::StatusCode,
            headers: http::HeaderMap,
            body: B,
        ) {
            let response = MockResponse::new(status, headers, body);
            self.responses.insert((None, path.to_owned()), response);
        }

        /// Respond to `method` on `path`.
        pub fn add_method<B: Into<Bytes>>(
            &mut self,
            method: Method,
            path: &str,
            status: http::StatusCode,
            headers: http::HeaderMap,
            body: B,
        ) {
            let response = MockResponse::new(status, headers, body);
            self.responses
                .insert((Some(method), path.to_owned()), response);
        }

        /// Every request received so far, in order.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().clone()
        }

        fn find(&self, method: &Method, path: &str) -> Option<&MockResponse> {
            self.responses
                .get(&(Some(method.clone()), path.to_owned()))
                .or_else(|| self.responses.get(&(None, path.to_owned())))
        }
    }

    impl tower::Service<hyperdriver::body::Request> for MockService {
        type Response = hyperdriver::body::Response;
        type Error = hyperdriver::client::Error;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: hyperdriver::body::Request) -> Self::Future {
            self.requests.lock().push(RecordedRequest {
                method: req.method().clone(),
                uri: req.uri().clone(),
                headers: req.headers().clone(),
            });

            let mut builder = response::Builder::new().version(http::Version::HTTP_11);
            let body = match self.find(req.method(), req.uri().path()) {
                Some(response) => {
                    builder = builder.status(response.status);
                    for (key, value) in response.headers.iter() {
                        builder = builder.header(key, value);
                    }
                    response.body.clone()
                }
                None => {
                    builder = builder.status(http::StatusCode::NOT_FOUND);
                    Bytes::new()
                }
            };

            let response = builder.body(hyperdriver::Body::from(body)).unwrap_or_else(|_| {
                let mut fallback = http::Response::new(hyperdriver::Body::from(Bytes::new()));
                *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            });

            std::future::ready(Ok(response))
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[derive(Debug, Clone)]
    struct Token(Secret);

    impl Authentication for Token {
        fn authenticate<B>(&self, mut req: http::Request<B>) -> http::Request<B> {
            req.headers_mut()
                .insert(http::header::AUTHORIZATION, self.0.bearer().unwrap());
            req
        }
    }

    #[test]
    fn extensions_produce_send_futures() {
        let client = ApiClient::new(
            "http://registry.test/v2/".parse().unwrap(),
            Token(Secret::from("secret garden")),
        );
        let builder = client.get("frobulator");

        fn assert_send<T: Send>(_t: T) {}

        let fut = builder.send();
        assert_send(fut);
    }

    #[tokio::test]
    async fn mock_client_works() {
        let mut mock = crate::mock::MockService::new();
        mock.add(
            "/v2/",
            http::StatusCode::OK,
            http::HeaderMap::new(),
            b"frobulator".to_vec(),
        );

        let client = ApiClient::new_with_inner_service(
            "http://registry.test/v2/".parse().unwrap(),
            Token(Secret::from("secret garden")),
            mock.clone(),
        );

        let response = client.get("").send().await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "frobulator");

        let seen = mock.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].headers.get(http::header::AUTHORIZATION).unwrap(),
            "Bearer secret garden"
        );
    }

    #[tokio::test]
    async fn mock_client_keys_on_method() {
        let mut mock = crate::mock::MockService::new();
        mock.add_method(
            Method::DELETE,
            "/v2/app/manifests/sha256:abc",
            http::StatusCode::ACCEPTED,
            http::HeaderMap::new(),
            Vec::new(),
        );

        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            (),
            mock,
        );

        let deleted = client
            .delete("v2/app/manifests/sha256:abc")
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), http::StatusCode::ACCEPTED);

        let fetched = client
            .get("v2/app/manifests/sha256:abc")
            .send()
            .await
            .unwrap();
        assert_eq!(fetched.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn query_parameters_are_encoded() {
        let mock = crate::mock::MockService::new();
        let client = ApiClient::new_with_inner_service(
            "http://daemon.test/".parse().unwrap(),
            (),
            mock.clone(),
        );

        let _ = client
            .post("images/app/tag")
            .query(&[("repo", "registry.test/acme/app"), ("tag", "3")])
            .send()
            .await
            .unwrap();

        let seen = mock.requests();
        assert_eq!(
            seen[0].uri.query(),
            Some("repo=registry.test%2Facme%2Fapp&tag=3")
        );
    }

    #[tokio::test]
    async fn streamed_body_arrives_whole() {
        use futures::StreamExt as _;
        use http_body_util::BodyExt as _;

        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let inner = tower::service_fn({
            let received = received.clone();
            move |req: hyperdriver::body::Request| {
                let received = received.clone();
                async move {
                    let body = req.into_body().collect().await.unwrap().to_bytes();
                    received.lock().extend_from_slice(&body);
                    Ok::<_, hyperdriver::client::Error>(http::Response::new(
                        hyperdriver::Body::empty(),
                    ))
                }
            }
        });
        let client = ApiClient::new_with_inner_service(
            "http://daemon.test/".parse().unwrap(),
            (),
            inner,
        );

        let chunks = futures::stream::iter(["context", ".", "tar"])
            .map(|chunk| Ok::<_, std::io::Error>(bytes::Bytes::from_static(chunk.as_bytes())));
        client.post("build").body_stream(chunks).send().await.unwrap();

        assert_eq!(received.lock().as_slice(), b"context.tar");
    }
}
